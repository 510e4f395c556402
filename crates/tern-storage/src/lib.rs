//! Storage engine for TernDB.
//!
//! This crate provides:
//! - Disk manager for page-level I/O over named files
//! - Page cache with scoped pin guards over the buffer pool
//! - Heap files for base-relation record storage with sequential scans
//! - Record identifiers
//! - A disk-backed B+ tree index over an integer record attribute

mod btree;
mod cache;
mod disk;
mod heap;
mod record;

pub use btree::{
    node_type, BTreeIndex, IndexMeta, InternalNode, LeafNode, NodeType, Operator,
    INTERNAL_CAPACITY, LEAF_CAPACITY,
};
pub use cache::{PageCache, PinnedPage};
pub use disk::{DiskManager, DiskManagerConfig};
pub use heap::{FileScan, HeapFile, HeapPage, SlotId};
pub use record::RecordId;

//! Disk-backed B+ tree index.
//!
//! The index maps one integer attribute of a base relation to record IDs
//! and lives in its own paged file driven through the buffer pool:
//!
//! ```text
//! page 1: header (relation name, attr offset, attr type, root page)
//! page 2: initial root (empty leaf)
//! page 3+: leaf and internal nodes, allocated as the tree grows
//! ```
//!
//! Node layout (one node per 8 KB page, type tag in the first byte):
//!
//! ```text
//! leaf                               internal
//! +------------------+ 0            +------------------+ 0
//! | tag=1, reserved  |              | tag=2, reserved  |
//! | num_occupied: u16|              | num_occupied: u16|
//! | right_sib: u32   |              | level: u16, pad  |
//! +------------------+ 8            +------------------+ 8
//! | key: i32         |              | child_0: u32     |
//! | rid: u32 + u16   |              +------------------+ 12
//! | ...              |              | key_0: i32       |
//! +------------------+              | child_1: u32     |
//!                                   | ...              |
//!                                   +------------------+
//! ```
//!
//! Leaves hold up to 818 sorted (key, rid) entries and chain through
//! right-sibling pointers; internal nodes hold up to 1022 separator keys.
//! An internal node's `level` is 1 when its children are leaves and grows
//! by one per level above that, so "the root is a leaf" is derived from
//! the node tag rather than tracked separately.
//!
//! Inserts split full nodes with a collect-sort-split pass: a leaf split
//! copies the upper half of the combined entries into a fresh right
//! sibling and reports the right leaf's first key upward; an internal
//! split promotes (removes) the middle key. When propagation escapes the
//! root, a new root is allocated and the header page is rewritten.
//!
//! Scans are cursors over the leaf chain bounded below by `GT`/`GTE` and
//! above by `LT`/`LTE`; the cursor holds no pin between calls.

mod constants;
mod index;
mod node;
mod scan;

pub use constants::{INTERNAL_CAPACITY, LEAF_CAPACITY};
pub use index::BTreeIndex;
pub use node::{node_type, IndexMeta, InternalNode, LeafNode, NodeType};
pub use scan::Operator;

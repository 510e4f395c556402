//! Disk-backed B+ tree index over one integer attribute of a relation.

use super::constants::{INTERNAL_CAPACITY, LEAF_CAPACITY};
use super::node::{node_type, IndexMeta, InternalNode, LeafNode, NodeType};
use super::scan::{satisfies_high, satisfies_low, Operator, ScanState};
use crate::cache::PageCache;
use crate::heap::HeapFile;
use crate::record::RecordId;
use std::sync::Arc;
use tern_common::page::{FileId, PageId};
use tern_common::types::AttrType;
use tern_common::{Result, TernError};

/// B+ tree index mapping an integer record attribute to record IDs.
///
/// The index lives in its own paged file named
/// `"{relation}.{attr_byte_offset}"`: page 1 holds the header
/// ([`IndexMeta`]), page 2 the initial root, and further pages are leaf
/// and internal nodes allocated as the tree grows. Keys are unique and
/// the tree supports insertion and bounded range scans; there is no
/// deletion.
pub struct BTreeIndex {
    /// Page cache for all index I/O.
    cache: Arc<PageCache>,
    /// The index file.
    file: FileId,
    /// Index file name, `"{relation}.{attr_byte_offset}"`.
    index_name: String,
    /// Header page, always page 1.
    header_page: PageId,
    /// Current root, mirrored in the header.
    root_page: PageId,
    /// Byte offset of the indexed attribute within a record.
    attr_byte_offset: usize,
    /// Type of the indexed attribute.
    attr_type: AttrType,
    /// Live scan cursor, if any.
    scan: Option<ScanState>,
}

impl BTreeIndex {
    /// Opens the index for a relation, creating and bulk-loading it if the
    /// index file does not exist yet.
    ///
    /// An existing file's header must name the same relation, attribute
    /// offset, and attribute type; a mismatch fails with `BadIndexInfo`.
    pub fn open(
        cache: Arc<PageCache>,
        relation: &HeapFile,
        attr_byte_offset: usize,
        attr_type: AttrType,
    ) -> Result<Self> {
        let index_name = format!("{}.{}", relation.name(), attr_byte_offset);

        if cache.disk().exists(&index_name) {
            let file = cache.disk().open(&index_name)?;
            let meta = {
                let guard = cache.fetch(file, PageId::FIRST)?;
                let data = guard.data();
                IndexMeta::read_from(&data[..])?
            };

            if meta.relation_name != relation.name()
                || meta.attr_byte_offset as usize != attr_byte_offset
                || meta.attr_type != attr_type
            {
                return Err(TernError::BadIndexInfo(format!(
                    "index {} was built for ({}, {}, {})",
                    index_name, meta.relation_name, meta.attr_byte_offset, meta.attr_type
                )));
            }

            return Ok(Self {
                cache,
                file,
                index_name,
                header_page: PageId::FIRST,
                root_page: meta.root_page,
                attr_byte_offset,
                attr_type,
                scan: None,
            });
        }

        // Fresh index: header on page 1, an empty root leaf on page 2.
        let file = cache.disk().create(&index_name)?;

        let root_page = {
            let (header_page, header) = cache.alloc(file)?;
            if header_page != PageId::FIRST {
                return Err(TernError::Internal(format!(
                    "index header landed on {}",
                    header_page
                )));
            }
            let (root_page, root) = cache.alloc(file)?;
            LeafNode::init(&mut root.data_mut()[..]);

            IndexMeta {
                relation_name: relation.name().to_string(),
                attr_byte_offset: attr_byte_offset as u32,
                attr_type,
                root_page,
            }
            .write_to(&mut header.data_mut()[..]);
            root_page
        };

        let mut index = Self {
            cache,
            file,
            index_name,
            header_page: PageId::FIRST,
            root_page,
            attr_byte_offset,
            attr_type,
            scan: None,
        };
        index.bulk_load(relation)?;
        Ok(index)
    }

    /// Inserts one entry per relation record, keyed by the attribute at
    /// the configured byte offset.
    fn bulk_load(&mut self, relation: &HeapFile) -> Result<()> {
        let offset = self.attr_byte_offset;
        for item in relation.scan()? {
            let (rid, record) = item?;
            if record.len() < offset + 4 {
                return Err(TernError::Internal(format!(
                    "record {} too short for attribute offset {}",
                    rid, offset
                )));
            }
            let key = i32::from_le_bytes([
                record[offset],
                record[offset + 1],
                record[offset + 2],
                record[offset + 3],
            ]);
            self.insert(key, rid)?;
        }
        Ok(())
    }

    /// Returns the index file name.
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Returns the current root page.
    pub fn root_page(&self) -> PageId {
        self.root_page
    }

    /// Returns the attribute byte offset this index was built over.
    pub fn attr_byte_offset(&self) -> usize {
        self.attr_byte_offset
    }

    /// Returns the indexed attribute type.
    pub fn attr_type(&self) -> AttrType {
        self.attr_type
    }

    /// Flushes the index file's dirty pages to disk.
    pub fn flush(&self) -> Result<()> {
        self.cache.flush_file(self.file)
    }

    // -------------------------------------------------------------------
    // Search
    // -------------------------------------------------------------------

    /// Walks from the root to the leaf that must contain `key`, recording
    /// the internal pages visited in root-to-parent order.
    ///
    /// Each page is unpinned as soon as the descent leaves it; when the
    /// root itself is a leaf, the visited stack stays empty.
    fn find_leaf(&self, key: i32) -> Result<(PageId, Vec<PageId>)> {
        let mut visited = Vec::new();
        let mut current = self.root_page;

        loop {
            let next = {
                let guard = self.cache.fetch(self.file, current)?;
                let data = guard.data();
                match node_type(&data[..])? {
                    NodeType::Leaf => None,
                    NodeType::Internal => {
                        let slot = InternalNode::search_child(&data[..], key);
                        Some(InternalNode::child_at(&data[..], slot))
                    }
                }
            };

            match next {
                None => return Ok((current, visited)),
                Some(child) => {
                    if !child.is_valid() {
                        return Err(TernError::Corrupted(format!(
                            "invalid child link in {}",
                            current
                        )));
                    }
                    visited.push(current);
                    current = child;
                }
            }
        }
    }

    // -------------------------------------------------------------------
    // Insertion
    // -------------------------------------------------------------------

    /// Inserts a (key, rid) entry.
    ///
    /// Keys are unique; inserting a key that is already present fails
    /// with `DuplicateKey` and leaves the tree unchanged.
    pub fn insert(&mut self, key: i32, rid: RecordId) -> Result<()> {
        let (leaf, mut visited) = self.find_leaf(key)?;

        {
            let guard = self.cache.fetch(self.file, leaf)?;
            let occupied = LeafNode::num_occupied(&guard.data()[..]);
            if occupied < LEAF_CAPACITY {
                return LeafNode::insert(&mut guard.data_mut()[..], key, rid);
            }
        }

        self.split_leaf(leaf, key, rid, &mut visited)
    }

    /// Splits a full leaf while inserting the new entry, then propagates
    /// the separator upward.
    fn split_leaf(
        &mut self,
        leaf: PageId,
        key: i32,
        rid: RecordId,
        visited: &mut Vec<PageId>,
    ) -> Result<()> {
        let separator;
        let new_leaf;
        {
            let left = self.cache.fetch(self.file, leaf)?;
            let (mut entries, old_sibling) = {
                let data = left.data();
                (LeafNode::entries(&data[..]), LeafNode::right_sibling(&data[..]))
            };
            let pos = match entries.binary_search_by_key(&key, |(k, _)| *k) {
                Ok(_) => return Err(TernError::DuplicateKey),
                Err(pos) => pos,
            };
            entries.insert(pos, (key, rid));

            let (right_id, right) = self.cache.alloc(self.file)?;
            new_leaf = right_id;

            // ceil((capacity + 1) / 2) entries stay in the left leaf.
            let keep_left = (LEAF_CAPACITY + 2) / 2;
            let right_entries = entries.split_off(keep_left);
            separator = right_entries[0].0;

            {
                let mut rdata = right.data_mut();
                LeafNode::init(&mut rdata[..]);
                LeafNode::write_entries(&mut rdata[..], &right_entries);
                LeafNode::set_right_sibling(&mut rdata[..], old_sibling);
            }
            {
                let mut ldata = left.data_mut();
                LeafNode::write_entries(&mut ldata[..], &entries);
                LeafNode::set_right_sibling(&mut ldata[..], right_id);
            }
        }

        self.propagate(separator, leaf, new_leaf, 1, visited)
    }

    /// Routes a separator produced by a split into the parent, or makes a
    /// new root when the propagation escapes the old one.
    ///
    /// `new_root_level` is the level a new root would carry: 1 when the
    /// split siblings are leaves, one above the siblings' level otherwise.
    fn propagate(
        &mut self,
        key: i32,
        left: PageId,
        right: PageId,
        new_root_level: u16,
        visited: &mut Vec<PageId>,
    ) -> Result<()> {
        match visited.pop() {
            Some(parent) => self.insert_into_internal(parent, key, right, visited),
            None => self.create_new_root(key, left, right, new_root_level),
        }
    }

    /// Inserts a (separator, right child) pair into an internal node,
    /// splitting it when full.
    fn insert_into_internal(
        &mut self,
        node: PageId,
        key: i32,
        right_child: PageId,
        visited: &mut Vec<PageId>,
    ) -> Result<()> {
        {
            let guard = self.cache.fetch(self.file, node)?;
            let occupied = InternalNode::num_occupied(&guard.data()[..]);
            if occupied < INTERNAL_CAPACITY {
                return InternalNode::insert(&mut guard.data_mut()[..], key, right_child);
            }
        }

        self.split_internal(node, key, right_child, visited)
    }

    /// Splits a full internal node while inserting the new pair.
    ///
    /// The middle key of the combined sequence is promoted: removed from
    /// both halves and carried upward as the new separator.
    fn split_internal(
        &mut self,
        node: PageId,
        key: i32,
        right_child: PageId,
        visited: &mut Vec<PageId>,
    ) -> Result<()> {
        let promoted;
        let new_node;
        let level;
        {
            let left = self.cache.fetch(self.file, node)?;
            let (mut keys, mut children, node_level) = {
                let data = left.data();
                (
                    InternalNode::keys(&data[..]),
                    InternalNode::children(&data[..]),
                    InternalNode::level(&data[..]),
                )
            };
            level = node_level;

            let slot = match keys.binary_search(&key) {
                Ok(_) => return Err(TernError::DuplicateKey),
                Err(slot) => slot,
            };
            keys.insert(slot, key);
            children.insert(slot + 1, right_child);

            let (right_id, right) = self.cache.alloc(self.file)?;
            new_node = right_id;

            // The key at the midpoint is promoted, not copied.
            let mid = (INTERNAL_CAPACITY + 2) / 2;
            promoted = keys[mid];
            let right_keys = keys.split_off(mid + 1);
            keys.truncate(mid);
            let right_children = children.split_off(mid + 1);

            {
                let mut rdata = right.data_mut();
                InternalNode::init(&mut rdata[..], level);
                InternalNode::write_node(&mut rdata[..], &right_keys, &right_children);
            }
            {
                let mut ldata = left.data_mut();
                InternalNode::write_node(&mut ldata[..], &keys, &children);
            }
        }

        self.propagate(promoted, node, new_node, level + 1, visited)
    }

    /// Allocates a new root holding one separator and two children, and
    /// persists the root change to the header page.
    fn create_new_root(
        &mut self,
        key: i32,
        left: PageId,
        right: PageId,
        level: u16,
    ) -> Result<()> {
        let root_id = {
            let (root_id, root) = self.cache.alloc(self.file)?;
            let mut data = root.data_mut();
            InternalNode::init(&mut data[..], level);
            InternalNode::write_node(&mut data[..], &[key], &[left, right]);
            root_id
        };

        self.root_page = root_id;

        let header = self.cache.fetch(self.file, self.header_page)?;
        let mut data = header.data_mut();
        let mut meta = IndexMeta::read_from(&data[..])?;
        meta.root_page = root_id;
        meta.write_to(&mut data[..]);
        Ok(())
    }

    // -------------------------------------------------------------------
    // Scanning
    // -------------------------------------------------------------------

    /// Positions a scan cursor at the first entry within the bounds.
    ///
    /// `low_op` must be `GT` or `GTE` and `high_op` must be `LT` or `LTE`
    /// (`BadOpcodes` otherwise, before any page is touched), and
    /// `low <= high` must hold (`BadScanrange`). A scan already in
    /// progress is ended silently. When the leaf that would contain the
    /// low bound has no entry satisfying both bounds, the scan fails with
    /// `NoSuchKeyFound` and the index returns to the idle state.
    pub fn start_scan(
        &mut self,
        low: i32,
        low_op: Operator,
        high: i32,
        high_op: Operator,
    ) -> Result<()> {
        if !low_op.is_low_op() || !high_op.is_high_op() {
            return Err(TernError::BadOpcodes);
        }
        if low > high {
            return Err(TernError::BadScanrange { low, high });
        }

        self.scan = None;

        let (leaf, _) = self.find_leaf(low)?;
        let slot = {
            let guard = self.cache.fetch(self.file, leaf)?;
            let data = guard.data();
            let occupied = LeafNode::num_occupied(&data[..]);

            // The low bound's target leaf is the only candidate; the scan
            // does not cross into a sibling to find its first entry.
            let slot = (0..occupied)
                .find(|&slot| satisfies_low(LeafNode::key_at(&data[..], slot), low, low_op))
                .ok_or(TernError::NoSuchKeyFound)?;

            if !satisfies_high(LeafNode::key_at(&data[..], slot), high, high_op) {
                return Err(TernError::NoSuchKeyFound);
            }
            slot
        };

        self.scan = Some(ScanState {
            current_page: leaf,
            next_entry: Some(slot),
            low,
            high,
            low_op,
            high_op,
        });
        Ok(())
    }

    /// Emits the record ID under the cursor and advances it.
    ///
    /// Fails with `ScanNotInitialized` outside a scan and with
    /// `IndexScanCompleted` once the cursor has moved past the last
    /// matching entry. The current leaf is pinned only for the duration
    /// of the call.
    pub fn scan_next(&mut self) -> Result<RecordId> {
        let (current_page, next_entry, high, high_op) = match &self.scan {
            Some(scan) => (scan.current_page, scan.next_entry, scan.high, scan.high_op),
            None => return Err(TernError::ScanNotInitialized),
        };

        let guard = self.cache.fetch(self.file, current_page)?;
        let slot = match next_entry {
            Some(slot) => slot,
            None => return Err(TernError::IndexScanCompleted),
        };

        let mut new_page = current_page;
        let mut new_entry = None;
        let rid;
        {
            let data = guard.data();
            rid = LeafNode::rid_at(&data[..], slot);
            let occupied = LeafNode::num_occupied(&data[..]);

            if slot + 1 < occupied {
                if satisfies_high(LeafNode::key_at(&data[..], slot + 1), high, high_op) {
                    new_entry = Some(slot + 1);
                }
            } else {
                let sibling = LeafNode::right_sibling(&data[..]);
                if sibling.is_valid() {
                    drop(data);
                    drop(guard);
                    let next_guard = self.cache.fetch(self.file, sibling)?;
                    let next_data = next_guard.data();
                    if LeafNode::num_occupied(&next_data[..]) > 0
                        && satisfies_high(LeafNode::key_at(&next_data[..], 0), high, high_op)
                    {
                        new_page = sibling;
                        new_entry = Some(0);
                    }
                }
            }
        }

        if let Some(scan) = self.scan.as_mut() {
            scan.current_page = new_page;
            scan.next_entry = new_entry;
        }
        Ok(rid)
    }

    /// Ends the current scan.
    ///
    /// Fails with `ScanNotInitialized` if no scan is in progress. There
    /// are no pages to release: the cursor never stays pinned between
    /// calls.
    pub fn end_scan(&mut self) -> Result<()> {
        if self.scan.take().is_none() {
            return Err(TernError::ScanNotInitialized);
        }
        Ok(())
    }
}

impl Drop for BTreeIndex {
    fn drop(&mut self) {
        self.scan = None;
        let _ = self.cache.flush_file(self.file);
        let _ = self.cache.disk().close_file(self.file);
    }
}

//! B+ tree page codec: leaf nodes, internal nodes, and the index header.
//!
//! Nodes are tagged variants over raw page bytes, discriminated by the
//! type byte at offset 0. All access is explicit little-endian codec on a
//! pinned page buffer; nothing here touches the buffer manager.

use super::constants::{
    INTERNAL_CAPACITY, LEAF_CAPACITY, LEAF_ENTRY_SIZE, META_RELATION_LEN, NODE_HEADER_SIZE,
};
use crate::record::RecordId;
use tern_common::page::PageId;
use tern_common::types::AttrType;
use tern_common::{Result, TernError};

/// Kind of a B+ tree node, stored as the first byte of every node page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeType {
    /// Leaf node holding (key, record id) entries.
    Leaf = 1,
    /// Internal node holding separator keys and child pointers.
    Internal = 2,
}

/// Reads the node type tag of a page.
pub fn node_type(data: &[u8]) -> Result<NodeType> {
    match data[0] {
        1 => Ok(NodeType::Leaf),
        2 => Ok(NodeType::Internal),
        tag => Err(TernError::Corrupted(format!("unknown node tag {}", tag))),
    }
}

fn read_num_occupied(data: &[u8]) -> usize {
    u16::from_le_bytes([data[2], data[3]]) as usize
}

fn write_num_occupied(data: &mut [u8], n: usize) {
    data[2..4].copy_from_slice(&(n as u16).to_le_bytes());
}

/// Accessors for the leaf node layout.
///
/// Entries are (key i32, rid) pairs of [`LEAF_ENTRY_SIZE`] bytes each,
/// stored sorted by key starting right after the header. The last header
/// word is the right sibling page id (`PageId::INVALID` for the rightmost
/// leaf).
pub struct LeafNode;

impl LeafNode {
    #[inline(always)]
    fn entry_offset(slot: usize) -> usize {
        NODE_HEADER_SIZE + slot * LEAF_ENTRY_SIZE
    }

    /// Initializes an empty leaf.
    pub fn init(data: &mut [u8]) {
        data[0] = NodeType::Leaf as u8;
        data[1] = 0;
        write_num_occupied(data, 0);
        data[4..8].copy_from_slice(&PageId::INVALID.0.to_le_bytes());
    }

    /// Returns the number of valid entries.
    pub fn num_occupied(data: &[u8]) -> usize {
        read_num_occupied(data)
    }

    /// Returns the right sibling page id.
    pub fn right_sibling(data: &[u8]) -> PageId {
        PageId(u32::from_le_bytes([data[4], data[5], data[6], data[7]]))
    }

    /// Sets the right sibling page id.
    pub fn set_right_sibling(data: &mut [u8], page: PageId) {
        data[4..8].copy_from_slice(&page.0.to_le_bytes());
    }

    /// Returns the key in a slot.
    pub fn key_at(data: &[u8], slot: usize) -> i32 {
        let off = Self::entry_offset(slot);
        i32::from_le_bytes([data[off], data[off + 1], data[off + 2], data[off + 3]])
    }

    /// Returns the record id in a slot.
    pub fn rid_at(data: &[u8], slot: usize) -> RecordId {
        let off = Self::entry_offset(slot) + 4;
        RecordId::read_from(&data[off..off + RecordId::ENCODED_SIZE])
    }

    /// Returns the first slot whose key is >= the probe, or num_occupied.
    pub fn search_slot(data: &[u8], key: i32) -> usize {
        let n = Self::num_occupied(data);
        let mut slot = 0;
        while slot < n && Self::key_at(data, slot) < key {
            slot += 1;
        }
        slot
    }

    /// Inserts an entry in key order.
    ///
    /// Fails with `NodeFull` at capacity and `DuplicateKey` on an equal
    /// key; the page is unmodified in both cases.
    pub fn insert(data: &mut [u8], key: i32, rid: RecordId) -> Result<()> {
        let n = Self::num_occupied(data);
        if n >= LEAF_CAPACITY {
            return Err(TernError::NodeFull);
        }

        let slot = Self::search_slot(data, key);
        if slot < n && Self::key_at(data, slot) == key {
            return Err(TernError::DuplicateKey);
        }

        // Shift entries >= key right by one.
        let start = Self::entry_offset(slot);
        let end = Self::entry_offset(n);
        data.copy_within(start..end, start + LEAF_ENTRY_SIZE);

        data[start..start + 4].copy_from_slice(&key.to_le_bytes());
        rid.write_to(&mut data[start + 4..start + 4 + RecordId::ENCODED_SIZE]);
        write_num_occupied(data, n + 1);
        Ok(())
    }

    /// Collects all entries in slot order.
    pub fn entries(data: &[u8]) -> Vec<(i32, RecordId)> {
        let n = Self::num_occupied(data);
        (0..n)
            .map(|slot| (Self::key_at(data, slot), Self::rid_at(data, slot)))
            .collect()
    }

    /// Replaces the entry area with the given entries.
    ///
    /// The type tag and sibling pointer are left untouched.
    pub fn write_entries(data: &mut [u8], entries: &[(i32, RecordId)]) {
        debug_assert!(entries.len() <= LEAF_CAPACITY);
        for (slot, (key, rid)) in entries.iter().enumerate() {
            let off = Self::entry_offset(slot);
            data[off..off + 4].copy_from_slice(&key.to_le_bytes());
            rid.write_to(&mut data[off + 4..off + 4 + RecordId::ENCODED_SIZE]);
        }
        write_num_occupied(data, entries.len());
    }
}

/// Accessors for the internal node layout.
///
/// The leftmost child pointer sits right after the header, followed by
/// (key i32, child u32) pairs; a node with n keys references n + 1
/// children. `level` is 1 when the children are leaves and grows by one
/// per level above that.
pub struct InternalNode;

impl InternalNode {
    const CHILD0_OFFSET: usize = NODE_HEADER_SIZE;
    const PAIRS_OFFSET: usize = NODE_HEADER_SIZE + 4;

    #[inline(always)]
    fn pair_offset(slot: usize) -> usize {
        Self::PAIRS_OFFSET + slot * 8
    }

    /// Initializes an empty internal node at the given level above leaves.
    pub fn init(data: &mut [u8], level: u16) {
        data[0] = NodeType::Internal as u8;
        data[1] = 0;
        write_num_occupied(data, 0);
        data[4..6].copy_from_slice(&level.to_le_bytes());
        data[6] = 0;
        data[7] = 0;
    }

    /// Returns the number of separator keys.
    pub fn num_occupied(data: &[u8]) -> usize {
        read_num_occupied(data)
    }

    /// Returns the level above leaves (1 = children are leaves).
    pub fn level(data: &[u8]) -> u16 {
        u16::from_le_bytes([data[4], data[5]])
    }

    /// Returns the key in a slot.
    pub fn key_at(data: &[u8], slot: usize) -> i32 {
        let off = Self::pair_offset(slot);
        i32::from_le_bytes([data[off], data[off + 1], data[off + 2], data[off + 3]])
    }

    /// Returns a child pointer. Valid indices are 0..=num_occupied.
    pub fn child_at(data: &[u8], index: usize) -> PageId {
        let off = if index == 0 {
            Self::CHILD0_OFFSET
        } else {
            Self::pair_offset(index - 1) + 4
        };
        PageId(u32::from_le_bytes([
            data[off],
            data[off + 1],
            data[off + 2],
            data[off + 3],
        ]))
    }

    /// Returns the child index to descend into for a probe key.
    ///
    /// This is the first slot whose key is strictly greater than the
    /// probe: a key equal to a separator belongs to the right subtree.
    pub fn search_child(data: &[u8], key: i32) -> usize {
        let n = Self::num_occupied(data);
        let mut slot = 0;
        while slot < n && Self::key_at(data, slot) <= key {
            slot += 1;
        }
        slot
    }

    /// Inserts a separator key with its right child.
    ///
    /// The child lands at `slot + 1` where `slot` is the key's position.
    /// Fails with `NodeFull` at capacity, leaving the page unmodified.
    pub fn insert(data: &mut [u8], key: i32, right_child: PageId) -> Result<()> {
        let n = Self::num_occupied(data);
        if n >= INTERNAL_CAPACITY {
            return Err(TernError::NodeFull);
        }

        let slot = Self::search_child(data, key);

        // Shift pairs at and after the slot right by one.
        let start = Self::pair_offset(slot);
        let end = Self::pair_offset(n);
        data.copy_within(start..end, start + 8);

        data[start..start + 4].copy_from_slice(&key.to_le_bytes());
        data[start + 4..start + 8].copy_from_slice(&right_child.0.to_le_bytes());
        write_num_occupied(data, n + 1);
        Ok(())
    }

    /// Collects all separator keys.
    pub fn keys(data: &[u8]) -> Vec<i32> {
        let n = Self::num_occupied(data);
        (0..n).map(|slot| Self::key_at(data, slot)).collect()
    }

    /// Collects all child pointers (one more than the key count).
    pub fn children(data: &[u8]) -> Vec<PageId> {
        let n = Self::num_occupied(data);
        (0..=n).map(|index| Self::child_at(data, index)).collect()
    }

    /// Replaces the node's keys and children.
    ///
    /// `children` must hold exactly one more entry than `keys`. The type
    /// tag and level are left untouched.
    pub fn write_node(data: &mut [u8], keys: &[i32], children: &[PageId]) {
        debug_assert_eq!(children.len(), keys.len() + 1);
        debug_assert!(keys.len() <= INTERNAL_CAPACITY);

        data[Self::CHILD0_OFFSET..Self::CHILD0_OFFSET + 4]
            .copy_from_slice(&children[0].0.to_le_bytes());
        for (slot, key) in keys.iter().enumerate() {
            let off = Self::pair_offset(slot);
            data[off..off + 4].copy_from_slice(&key.to_le_bytes());
            data[off + 4..off + 8].copy_from_slice(&children[slot + 1].0.to_le_bytes());
        }
        write_num_occupied(data, keys.len());
    }
}

/// The index header record stored on page 1 of every index file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMeta {
    /// Name of the indexed relation.
    pub relation_name: String,
    /// Byte offset of the indexed attribute within a relation record.
    pub attr_byte_offset: u32,
    /// Type of the indexed attribute.
    pub attr_type: AttrType,
    /// Current root page of the tree.
    pub root_page: PageId,
}

impl IndexMeta {
    /// Encoded size: name field + offset + type tag + padding + root.
    pub const ENCODED_SIZE: usize = META_RELATION_LEN + 4 + 1 + 3 + 4;

    /// Writes the header record at the start of a page buffer.
    pub fn write_to(&self, data: &mut [u8]) {
        let mut name = [0u8; META_RELATION_LEN];
        let bytes = self.relation_name.as_bytes();
        let len = bytes.len().min(META_RELATION_LEN);
        name[..len].copy_from_slice(&bytes[..len]);

        data[..META_RELATION_LEN].copy_from_slice(&name);
        data[32..36].copy_from_slice(&self.attr_byte_offset.to_le_bytes());
        data[36] = self.attr_type.as_tag();
        data[37..40].fill(0);
        data[40..44].copy_from_slice(&self.root_page.0.to_le_bytes());
    }

    /// Reads the header record from the start of a page buffer.
    pub fn read_from(data: &[u8]) -> Result<Self> {
        let name_field = &data[..META_RELATION_LEN];
        let name_len = name_field
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(META_RELATION_LEN);
        let relation_name = String::from_utf8_lossy(&name_field[..name_len]).into_owned();

        let attr_byte_offset = u32::from_le_bytes([data[32], data[33], data[34], data[35]]);
        let attr_type = AttrType::from_tag(data[36])
            .ok_or_else(|| TernError::Corrupted(format!("unknown attr type tag {}", data[36])))?;
        let root_page = PageId(u32::from_le_bytes([data[40], data[41], data[42], data[43]]));

        Ok(Self {
            relation_name,
            attr_byte_offset,
            attr_type,
            root_page,
        })
    }
}

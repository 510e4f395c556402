//! Record identifiers for the base relation.

use tern_common::page::PageId;

/// Unique identifier for a record within a heap file.
///
/// Combines the page holding the record with its slot number on that page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    /// Page containing this record.
    pub page: PageId,
    /// Slot number within the page.
    pub slot: u16,
}

impl RecordId {
    /// On-disk encoding width: page u32 + slot u16.
    pub const ENCODED_SIZE: usize = 6;

    /// Invalid record ID.
    pub const INVALID: RecordId = RecordId {
        page: PageId::INVALID,
        slot: u16::MAX,
    };

    /// Creates a new record ID.
    pub fn new(page: PageId, slot: u16) -> Self {
        Self { page, slot }
    }

    /// Returns true if this is a valid record ID.
    pub fn is_valid(&self) -> bool {
        self.page.is_valid()
    }

    /// Encodes into a 6-byte little-endian representation.
    pub fn write_to(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.page.0.to_le_bytes());
        buf[4..6].copy_from_slice(&self.slot.to_le_bytes());
    }

    /// Decodes from the 6-byte representation produced by [`write_to`].
    ///
    /// [`write_to`]: RecordId::write_to
    pub fn read_from(buf: &[u8]) -> Self {
        Self {
            page: PageId(u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])),
            slot: u16::from_le_bytes([buf[4], buf[5]]),
        }
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.page, self.slot)
    }
}

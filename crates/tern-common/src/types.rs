//! Attribute type tags for indexed record fields.

use serde::{Deserialize, Serialize};

/// Type of the record attribute an index is built over.
///
/// The tag is persisted in the index header page and checked when an
/// existing index file is reopened. Only `Int` keys are implemented by the
/// B+ tree core; the other tags exist so a header mismatch can be detected
/// rather than silently misread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AttrType {
    /// 32-bit signed integer key.
    Int = 0,
    /// 64-bit floating point key.
    Double = 1,
    /// Fixed-length string key.
    String = 2,
}

impl AttrType {
    /// Stable on-disk tag byte.
    pub fn as_tag(&self) -> u8 {
        *self as u8
    }

    /// Decodes an on-disk tag byte.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(AttrType::Int),
            1 => Some(AttrType::Double),
            2 => Some(AttrType::String),
            _ => None,
        }
    }

    /// Key width in bytes for fixed-size attribute types.
    pub fn key_size(&self) -> Option<usize> {
        match self {
            AttrType::Int => Some(4),
            AttrType::Double => Some(8),
            AttrType::String => None,
        }
    }
}

impl std::fmt::Display for AttrType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AttrType::Int => "INT",
            AttrType::Double => "DOUBLE",
            AttrType::String => "STRING",
        };
        write!(f, "{}", name)
    }
}

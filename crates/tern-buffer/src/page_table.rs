//! Lock-free page table mapping (file, page) keys to frame IDs.

use crate::frame::FrameId;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use tern_common::page::{pack_page_key, unpack_page_key, FileId, PageId};

/// Sentinel value for empty value slots.
const EMPTY_FRAME: u32 = u32::MAX;

/// Sentinel value for empty key slots.
const EMPTY_KEY: u64 = u64::MAX;

/// Sentinel value for deleted key slots (tombstone).
const TOMBSTONE_KEY: u64 = u64::MAX - 1;

/// Open-addressing hash table from packed page key to frame ID.
///
/// Linear probing with tombstones; all slots are atomics so lookups are
/// lock-free. Sized at twice the frame count for a ~50% load factor.
pub struct PageTable {
    /// Hash table keys (packed (file, page) as u64).
    keys: Box<[AtomicU64]>,
    /// Hash table values (frame id).
    values: Box<[AtomicU32]>,
    /// Bitmask for table indexing (size - 1).
    mask: usize,
}

impl PageTable {
    /// Creates a new page table with capacity for the given number of frames.
    pub fn new(capacity: usize) -> Self {
        let size = (capacity * 2).next_power_of_two().max(1024);

        let keys: Box<[AtomicU64]> = (0..size).map(|_| AtomicU64::new(EMPTY_KEY)).collect();
        let values: Box<[AtomicU32]> = (0..size).map(|_| AtomicU32::new(EMPTY_FRAME)).collect();

        Self {
            keys,
            values,
            mask: size - 1,
        }
    }

    /// Computes the starting probe index for a key.
    #[inline(always)]
    fn hash_index(&self, key: u64) -> usize {
        // FxHash-style multiply for distribution
        let hash = key.wrapping_mul(0x517cc1b727220a95);
        (hash as usize) & self.mask
    }

    /// Looks up a page and returns its frame ID if resident.
    #[inline(always)]
    pub fn get(&self, file: FileId, page: PageId) -> Option<FrameId> {
        let key = pack_page_key(file, page);
        let mut idx = self.hash_index(key);

        for _ in 0..self.keys.len() {
            let stored = self.keys[idx].load(Ordering::Acquire);
            if stored == EMPTY_KEY {
                return None;
            }
            if stored == key {
                return Some(FrameId(self.values[idx].load(Ordering::Acquire)));
            }
            // Skip tombstones and continue probing
            idx = (idx + 1) & self.mask;
        }
        None
    }

    /// Inserts or updates a mapping. Returns false only if the table is full.
    pub fn insert(&self, file: FileId, page: PageId, frame_id: FrameId) -> bool {
        let key = pack_page_key(file, page);
        let mut idx = self.hash_index(key);

        for _ in 0..self.keys.len() {
            let stored = self.keys[idx].load(Ordering::Acquire);
            if stored == EMPTY_KEY || stored == TOMBSTONE_KEY {
                self.values[idx].store(frame_id.0, Ordering::Release);
                self.keys[idx].store(key, Ordering::Release);
                return true;
            }
            if stored == key {
                self.values[idx].store(frame_id.0, Ordering::Release);
                return true;
            }
            idx = (idx + 1) & self.mask;
        }
        false
    }

    /// Removes a mapping, returning the frame ID if it was present.
    pub fn remove(&self, file: FileId, page: PageId) -> Option<FrameId> {
        let key = pack_page_key(file, page);
        let mut idx = self.hash_index(key);

        for _ in 0..self.keys.len() {
            let stored = self.keys[idx].load(Ordering::Acquire);
            if stored == EMPTY_KEY {
                return None;
            }
            if stored == key {
                let frame_id = self.values[idx].load(Ordering::Acquire);
                self.keys[idx].store(TOMBSTONE_KEY, Ordering::Release);
                return Some(FrameId(frame_id));
            }
            idx = (idx + 1) & self.mask;
        }
        None
    }

    /// Returns true if the page is resident.
    pub fn contains(&self, file: FileId, page: PageId) -> bool {
        self.get(file, page).is_some()
    }

    /// Returns the number of resident pages.
    pub fn len(&self) -> usize {
        self.keys
            .iter()
            .filter(|slot| {
                let key = slot.load(Ordering::Relaxed);
                key != EMPTY_KEY && key != TOMBSTONE_KEY
            })
            .count()
    }

    /// Returns true if no pages are resident.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over all entries, calling the provided function for each.
    /// Returns early if the function returns false.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(FileId, PageId, FrameId) -> bool,
    {
        for (idx, key_slot) in self.keys.iter().enumerate() {
            let key = key_slot.load(Ordering::Relaxed);
            if key != EMPTY_KEY && key != TOMBSTONE_KEY {
                let frame_id = FrameId(self.values[idx].load(Ordering::Relaxed));
                let (file, page) = unpack_page_key(key);
                if !f(file, page, frame_id) {
                    return;
                }
            }
        }
    }
}

//! Heap file manager: append-only record storage scanned at bulk load.

use crate::cache::PageCache;
use crate::heap::page::HeapPage;
use crate::record::RecordId;
use bytes::Bytes;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tern_common::page::{FileId, PageId};
use tern_common::{Result, TernError};

/// A named heap file of variable-length records.
///
/// Records are appended to the last page, allocating a new page when it
/// fills. All page I/O goes through the page cache.
pub struct HeapFile {
    /// Page cache used for all I/O.
    cache: Arc<PageCache>,
    /// Open file handle.
    file: FileId,
    /// File name within the data directory.
    name: String,
    /// Last page with room for appends (0 = no pages yet).
    last_page: AtomicU32,
}

impl HeapFile {
    /// Creates a new, empty heap file.
    pub fn create(cache: Arc<PageCache>, name: &str) -> Result<Self> {
        let file = cache.disk().create(name)?;
        Ok(Self {
            cache,
            file,
            name: name.to_string(),
            last_page: AtomicU32::new(0),
        })
    }

    /// Opens an existing heap file.
    pub fn open(cache: Arc<PageCache>, name: &str) -> Result<Self> {
        let file = cache.disk().open(name)?;
        let num_pages = cache.disk().num_pages(file)?;
        Ok(Self {
            cache,
            file,
            name: name.to_string(),
            last_page: AtomicU32::new(num_pages),
        })
    }

    /// Returns the relation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the file handle.
    pub fn file_id(&self) -> FileId {
        self.file
    }

    /// Returns the number of pages in the file.
    pub fn num_pages(&self) -> Result<u32> {
        self.cache.disk().num_pages(self.file)
    }

    /// Appends a record, returning its record ID.
    pub fn append(&self, record: &[u8]) -> Result<RecordId> {
        let last = self.last_page.load(Ordering::Acquire);
        if last != 0 {
            let page = PageId(last);
            let guard = self.cache.fetch(self.file, page)?;
            let mut data = guard.data_mut();
            if let Some(slot) = HeapPage::insert(&mut data[..], record) {
                return Ok(RecordId::new(page, slot));
            }
        }

        // Last page full or file empty: start a fresh page.
        let (page, guard) = self.cache.alloc(self.file)?;
        {
            let mut data = guard.data_mut();
            HeapPage::init(&mut data[..]);
            match HeapPage::insert(&mut data[..], record) {
                Some(slot) => {
                    self.last_page.store(page.0, Ordering::Release);
                    Ok(RecordId::new(page, slot))
                }
                None => Err(TernError::PageFull),
            }
        }
    }

    /// Flushes the file's dirty pages to disk.
    pub fn flush(&self) -> Result<()> {
        self.cache.flush_file(self.file)
    }

    /// Returns an iterator over all records in page and slot order.
    pub fn scan(&self) -> Result<FileScan<'_>> {
        let num_pages = self.num_pages()?;
        Ok(FileScan {
            heap: self,
            num_pages,
            current_page: 1,
            next_slot: 0,
        })
    }
}

/// Sequential scan over a heap file.
///
/// Yields `(RecordId, Bytes)` pairs in page-then-slot order; iteration
/// ends when the last page is exhausted.
pub struct FileScan<'a> {
    heap: &'a HeapFile,
    num_pages: u32,
    current_page: u32,
    next_slot: u16,
}

impl Iterator for FileScan<'_> {
    type Item = Result<(RecordId, Bytes)>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.current_page <= self.num_pages {
            let page = PageId(self.current_page);
            let guard = match self.heap.cache.fetch(self.heap.file, page) {
                Ok(guard) => guard,
                Err(e) => {
                    self.current_page = self.num_pages + 1;
                    return Some(Err(e));
                }
            };
            let data = guard.data();

            if self.next_slot < HeapPage::num_slots(&data[..]) {
                let slot = self.next_slot;
                self.next_slot += 1;
                let record = match HeapPage::get(&data[..], slot) {
                    Some(bytes) => Bytes::copy_from_slice(bytes),
                    None => {
                        self.current_page = self.num_pages + 1;
                        return Some(Err(TernError::Internal(
                            "heap slot vanished mid-scan".to_string(),
                        )));
                    }
                };
                return Some(Ok((RecordId::new(page, slot), record)));
            }

            self.current_page += 1;
            self.next_slot = 0;
        }
        None
    }
}

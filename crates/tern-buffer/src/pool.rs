//! Buffer pool manager.

use crate::frame::{BufferFrame, FrameId};
use crate::page_table::PageTable;
use crate::replacer::{ClockReplacer, Replacer};
use parking_lot::Mutex;
use sysinfo::System;
use tern_common::page::{FileId, PageId, PAGE_SIZE};
use tern_common::{Result, TernError};

/// A dirty page that was evicted from the buffer pool.
///
/// The caller must write this to disk to prevent data loss.
#[derive(Debug)]
pub struct EvictedPage {
    pub file: FileId,
    pub page: PageId,
    pub data: Box<[u8; PAGE_SIZE]>,
}

/// Configuration for the buffer pool.
#[derive(Debug, Clone)]
pub struct BufferPoolConfig {
    /// Number of frames in the pool.
    pub num_frames: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self { num_frames: 1024 }
    }
}

/// Buffer pool manager.
///
/// Manages a fixed-size pool of page frames with:
/// - (file, page) to frame mapping (lock-free page table)
/// - free frame list for new pages
/// - clock replacement for eviction
/// - pin counting for access tracking
pub struct BufferPool {
    /// Configuration.
    config: BufferPoolConfig,
    /// Array of buffer frames.
    frames: Vec<BufferFrame>,
    /// Page to frame mapping.
    page_table: PageTable,
    /// List of free frame IDs.
    free_list: Mutex<Vec<FrameId>>,
    /// Page replacement policy.
    replacer: ClockReplacer,
}

impl BufferPool {
    /// Creates a new buffer pool.
    pub fn new(config: BufferPoolConfig) -> Self {
        let num_frames = config.num_frames;

        let frames: Vec<_> = (0..num_frames)
            .map(|i| BufferFrame::new(FrameId(i as u32)))
            .collect();

        // All frames start in the free list
        let free_list: Vec<_> = (0..num_frames).map(|i| FrameId(i as u32)).collect();

        Self {
            config,
            frames,
            page_table: PageTable::new(num_frames),
            free_list: Mutex::new(free_list),
            replacer: ClockReplacer::new(num_frames),
        }
    }

    /// Creates a buffer pool sized to 25% of available system RAM.
    ///
    /// Minimum 1,000 frames so caching stays useful on low-memory systems.
    pub fn auto_sized() -> Self {
        let mut sys = System::new_all();
        sys.refresh_memory();

        let available_bytes = sys.available_memory() as usize;
        let target_bytes = available_bytes / 4;
        let num_frames = (target_bytes / PAGE_SIZE).max(1_000);

        Self::new(BufferPoolConfig { num_frames })
    }

    /// Returns the number of frames in the pool.
    pub fn num_frames(&self) -> usize {
        self.config.num_frames
    }

    /// Returns the number of free frames.
    pub fn free_count(&self) -> usize {
        self.free_list.lock().len()
    }

    /// Returns the number of pages currently resident.
    pub fn page_count(&self) -> usize {
        self.page_table.len()
    }

    /// Checks if a page is resident in the pool.
    pub fn contains(&self, file: FileId, page: PageId) -> bool {
        self.page_table.contains(file, page)
    }

    /// Fetches a resident page, pinning it. Returns None on a miss.
    #[inline(always)]
    pub fn fetch_page(&self, file: FileId, page: PageId) -> Option<&BufferFrame> {
        let frame_id = self.page_table.get(file, page)?;
        let frame = &self.frames[frame_id.0 as usize];
        frame.pin();
        self.replacer.record_access(frame_id);
        Some(frame)
    }

    /// Allocates a frame for a new page: free list first, then eviction.
    ///
    /// Returns the frame ID and any evicted dirty page that must be flushed.
    fn allocate_frame(&self) -> Result<(FrameId, Option<EvictedPage>)> {
        {
            let mut free_list = self.free_list.lock();
            if let Some(frame_id) = free_list.pop() {
                return Ok((frame_id, None));
            }
        }

        let victim_id = self.replacer.evict(&|fid| {
            let frame = &self.frames[fid.0 as usize];
            frame.pin_count() == 0 && !frame.is_empty()
        });

        if let Some(victim_id) = victim_id {
            let frame = &self.frames[victim_id.0 as usize];

            // Capture victim contents if dirty; caller writes them back.
            let evicted = match (frame.is_dirty(), frame.page()) {
                (true, Some((file, page))) => {
                    let data_guard = frame.read_data();
                    let mut data = Box::new([0u8; PAGE_SIZE]);
                    data.copy_from_slice(&**data_guard);
                    drop(data_guard);
                    Some(EvictedPage { file, page, data })
                }
                _ => None,
            };

            if let Some((file, page)) = frame.page() {
                self.page_table.remove(file, page);
            }

            return Ok((victim_id, evicted));
        }

        Err(TernError::BufferPoolFull)
    }

    /// Installs a new (zeroed) page in the pool, pinned.
    ///
    /// If the page is already resident, the existing frame is pinned and
    /// returned instead. The second element is any evicted dirty page the
    /// caller must write to disk.
    #[inline]
    pub fn new_page(
        &self,
        file: FileId,
        page: PageId,
    ) -> Result<(&BufferFrame, Option<EvictedPage>)> {
        if let Some(frame_id) = self.page_table.get(file, page) {
            let frame = &self.frames[frame_id.0 as usize];
            frame.pin();
            self.replacer.record_access(frame_id);
            return Ok((frame, None));
        }

        let (frame_id, evicted) = self.allocate_frame()?;

        let frame = &self.frames[frame_id.0 as usize];
        frame.reset();
        frame.set_page(Some((file, page)));
        frame.pin();
        self.replacer.record_access(frame_id);

        self.page_table.insert(file, page, frame_id);

        Ok((frame, evicted))
    }

    /// Loads page data into the pool (used when reading from disk), pinned.
    #[inline]
    pub fn load_page(
        &self,
        file: FileId,
        page: PageId,
        data: &[u8],
    ) -> Result<(&BufferFrame, Option<EvictedPage>)> {
        let (frame, evicted) = self.new_page(file, page)?;
        frame.copy_from(data);
        Ok((frame, evicted))
    }

    /// Unpins a page, optionally marking it dirty.
    ///
    /// Returns false if the page is not resident.
    #[inline]
    pub fn unpin_page(&self, file: FileId, page: PageId, is_dirty: bool) -> bool {
        if let Some(frame_id) = self.page_table.get(file, page) {
            let frame = &self.frames[frame_id.0 as usize];

            if is_dirty {
                frame.set_dirty(true);
            }

            frame.unpin();
            return true;
        }
        false
    }

    /// Flushes one page through the callback if it is dirty.
    ///
    /// Returns true if the page was flushed.
    pub fn flush_page<F>(&self, file: FileId, page: PageId, mut flush_fn: F) -> Result<bool>
    where
        F: FnMut(FileId, PageId, &[u8]) -> Result<()>,
    {
        if let Some(frame_id) = self.page_table.get(file, page) {
            let frame = &self.frames[frame_id.0 as usize];

            if frame.is_dirty() {
                let data = frame.read_data();
                flush_fn(file, page, &**data)?;
                frame.set_dirty(false);
                return Ok(true);
            }
            return Ok(false);
        }
        Ok(false)
    }

    /// Flushes all dirty pages belonging to one file.
    ///
    /// Returns the number of pages flushed.
    pub fn flush_file<F>(&self, file: FileId, mut flush_fn: F) -> Result<usize>
    where
        F: FnMut(FileId, PageId, &[u8]) -> Result<()>,
    {
        self.flush_matching(|f, _| f == file, &mut flush_fn)
    }

    /// Flushes all dirty pages.
    ///
    /// Returns the number of pages flushed.
    pub fn flush_all<F>(&self, mut flush_fn: F) -> Result<usize>
    where
        F: FnMut(FileId, PageId, &[u8]) -> Result<()>,
    {
        self.flush_matching(|_, _| true, &mut flush_fn)
    }

    fn flush_matching(
        &self,
        matches: impl Fn(FileId, PageId) -> bool,
        flush_fn: &mut dyn FnMut(FileId, PageId, &[u8]) -> Result<()>,
    ) -> Result<usize> {
        // Collect targets first to avoid holding guards during flush
        let mut targets = Vec::new();
        self.page_table.for_each(|file, page, frame_id| {
            if matches(file, page) {
                targets.push((file, page, frame_id));
            }
            true
        });

        let mut flushed = 0;
        for (file, page, frame_id) in targets {
            let frame = &self.frames[frame_id.0 as usize];
            if frame.is_dirty() {
                let data = frame.read_data();
                flush_fn(file, page, &**data)?;
                frame.set_dirty(false);
                flushed += 1;
            }
        }
        Ok(flushed)
    }

    /// Drops a page from the pool.
    ///
    /// Returns false if the page is pinned or not resident.
    pub fn delete_page(&self, file: FileId, page: PageId) -> bool {
        if let Some(frame_id) = self.page_table.remove(file, page) {
            let frame = &self.frames[frame_id.0 as usize];

            // Cannot drop a pinned page; restore the mapping.
            if frame.is_pinned() {
                self.page_table.insert(file, page, frame_id);
                return false;
            }

            self.replacer.remove(frame_id);
            frame.reset();
            self.free_list.lock().push(frame_id);

            return true;
        }
        false
    }

    /// Returns statistics about the buffer pool.
    pub fn stats(&self) -> BufferPoolStats {
        let mut pinned_count = 0;
        let mut dirty_count = 0;

        self.page_table.for_each(|_, _, frame_id| {
            let frame = &self.frames[frame_id.0 as usize];
            if frame.is_pinned() {
                pinned_count += 1;
            }
            if frame.is_dirty() {
                dirty_count += 1;
            }
            true
        });

        BufferPoolStats {
            total_frames: self.config.num_frames,
            free_frames: self.free_count(),
            used_frames: self.page_table.len(),
            pinned_frames: pinned_count,
            dirty_frames: dirty_count,
        }
    }
}

/// Statistics about the buffer pool.
#[derive(Debug, Clone)]
pub struct BufferPoolStats {
    /// Total number of frames.
    pub total_frames: usize,
    /// Number of free frames.
    pub free_frames: usize,
    /// Number of frames holding pages.
    pub used_frames: usize,
    /// Number of pinned frames.
    pub pinned_frames: usize,
    /// Number of dirty frames.
    pub dirty_frames: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_pool(num_frames: usize) -> BufferPool {
        BufferPool::new(BufferPoolConfig { num_frames })
    }

    const F: FileId = FileId(0);

    #[test]
    fn test_pool_new() {
        let pool = create_test_pool(10);

        assert_eq!(pool.num_frames(), 10);
        assert_eq!(pool.free_count(), 10);
        assert_eq!(pool.page_count(), 0);
    }

    #[test]
    fn test_new_page() {
        let pool = create_test_pool(10);

        let (frame, evicted) = pool.new_page(F, PageId(1)).unwrap();

        assert!(evicted.is_none());
        assert_eq!(frame.page(), Some((F, PageId(1))));
        assert!(frame.is_pinned());
        assert_eq!(pool.free_count(), 9);
        assert_eq!(pool.page_count(), 1);
        assert!(pool.contains(F, PageId(1)));
    }

    #[test]
    fn test_fetch_existing() {
        let pool = create_test_pool(10);

        pool.new_page(F, PageId(1)).unwrap();
        pool.unpin_page(F, PageId(1), false);

        let frame = pool.fetch_page(F, PageId(1)).unwrap();
        assert_eq!(frame.page(), Some((F, PageId(1))));
        assert!(frame.is_pinned());
    }

    #[test]
    fn test_fetch_nonexistent() {
        let pool = create_test_pool(10);
        assert!(pool.fetch_page(F, PageId(1)).is_none());
    }

    #[test]
    fn test_unpin() {
        let pool = create_test_pool(10);

        let (frame, _) = pool.new_page(F, PageId(1)).unwrap();
        assert!(frame.is_pinned());

        pool.unpin_page(F, PageId(1), false);
        assert!(!frame.is_pinned());
    }

    #[test]
    fn test_dirty_tracking() {
        let pool = create_test_pool(10);

        pool.new_page(F, PageId(1)).unwrap();
        pool.unpin_page(F, PageId(1), true);

        let frame = pool.fetch_page(F, PageId(1)).unwrap();
        assert!(frame.is_dirty());
    }

    #[test]
    fn test_eviction_clean() {
        let pool = create_test_pool(3);

        for i in 1..=3 {
            pool.new_page(F, PageId(i)).unwrap();
            pool.unpin_page(F, PageId(i), false);
        }

        assert_eq!(pool.free_count(), 0);
        assert_eq!(pool.page_count(), 3);

        let (_, evicted) = pool.new_page(F, PageId(99)).unwrap();

        assert!(evicted.is_none()); // victim was clean
        assert_eq!(pool.page_count(), 3);
        assert!(pool.contains(F, PageId(99)));
    }

    #[test]
    fn test_eviction_dirty() {
        let pool = create_test_pool(1);

        let (frame, _) = pool.new_page(F, PageId(1)).unwrap();
        frame.write_data()[0] = 0xAB;
        pool.unpin_page(F, PageId(1), true);

        let (_, evicted) = pool.new_page(F, PageId(2)).unwrap();

        let evicted = evicted.expect("dirty page should be returned on eviction");
        assert_eq!(evicted.file, F);
        assert_eq!(evicted.page, PageId(1));
        assert_eq!(evicted.data[0], 0xAB);
    }

    #[test]
    fn test_pool_full_all_pinned() {
        let pool = create_test_pool(2);

        pool.new_page(F, PageId(1)).unwrap();
        pool.new_page(F, PageId(2)).unwrap();

        let result = pool.new_page(F, PageId(3));
        assert!(matches!(result, Err(TernError::BufferPoolFull)));
    }

    #[test]
    fn test_load_page() {
        let pool = create_test_pool(10);
        let data = [0xABu8; PAGE_SIZE];

        let (frame, _) = pool.load_page(F, PageId(1), &data).unwrap();

        let frame_data = frame.read_data();
        assert_eq!(frame_data[0], 0xAB);
        assert_eq!(frame_data[PAGE_SIZE - 1], 0xAB);
    }

    #[test]
    fn test_new_page_zeroed_after_reuse() {
        let pool = create_test_pool(1);

        let (frame, _) = pool.new_page(F, PageId(1)).unwrap();
        frame.write_data()[0] = 0xFF;
        pool.unpin_page(F, PageId(1), false);

        let (frame, _) = pool.new_page(F, PageId(2)).unwrap();
        assert_eq!(frame.read_data()[0], 0);
    }

    #[test]
    fn test_flush_page() {
        let pool = create_test_pool(10);

        pool.new_page(F, PageId(1)).unwrap();
        pool.unpin_page(F, PageId(1), true);

        let mut flushed_pages = vec![];
        let result = pool.flush_page(F, PageId(1), |_, page, _| {
            flushed_pages.push(page);
            Ok(())
        });

        assert!(result.unwrap());
        assert_eq!(flushed_pages, vec![PageId(1)]);

        let frame = pool.fetch_page(F, PageId(1)).unwrap();
        assert!(!frame.is_dirty());
    }

    #[test]
    fn test_flush_file_only_targets_file() {
        let pool = create_test_pool(10);
        let other = FileId(9);

        for i in 1..=3 {
            pool.new_page(F, PageId(i)).unwrap();
            pool.unpin_page(F, PageId(i), true);
        }
        pool.new_page(other, PageId(1)).unwrap();
        pool.unpin_page(other, PageId(1), true);

        let mut flushed = vec![];
        let count = pool
            .flush_file(F, |file, page, _| {
                flushed.push((file, page));
                Ok(())
            })
            .unwrap();

        assert_eq!(count, 3);
        assert!(flushed.iter().all(|(file, _)| *file == F));

        // The other file's page is still dirty.
        let frame = pool.fetch_page(other, PageId(1)).unwrap();
        assert!(frame.is_dirty());
    }

    #[test]
    fn test_flush_all() {
        let pool = create_test_pool(10);

        for i in 1..=5 {
            pool.new_page(F, PageId(i)).unwrap();
            pool.unpin_page(F, PageId(i), true);
        }

        let mut flushed_count = 0;
        let result = pool.flush_all(|_, _, _| {
            flushed_count += 1;
            Ok(())
        });

        assert_eq!(result.unwrap(), 5);
        assert_eq!(flushed_count, 5);
    }

    #[test]
    fn test_delete_page() {
        let pool = create_test_pool(10);

        pool.new_page(F, PageId(1)).unwrap();
        pool.unpin_page(F, PageId(1), false);

        assert!(pool.contains(F, PageId(1)));
        assert!(pool.delete_page(F, PageId(1)));
        assert!(!pool.contains(F, PageId(1)));
        assert_eq!(pool.free_count(), 10);
    }

    #[test]
    fn test_delete_pinned_page() {
        let pool = create_test_pool(10);

        pool.new_page(F, PageId(1)).unwrap();
        // still pinned

        assert!(!pool.delete_page(F, PageId(1)));
        assert!(pool.contains(F, PageId(1)));
    }

    #[test]
    fn test_duplicate_new_page() {
        let pool = create_test_pool(10);

        pool.new_page(F, PageId(1)).unwrap();
        pool.unpin_page(F, PageId(1), false);

        let (frame, evicted) = pool.new_page(F, PageId(1)).unwrap();

        assert!(evicted.is_none());
        assert_eq!(frame.page(), Some((F, PageId(1))));
        assert_eq!(pool.page_count(), 1);
    }

    #[test]
    fn test_stats() {
        let pool = create_test_pool(10);

        for i in 1..=4 {
            pool.new_page(F, PageId(i)).unwrap();
            if i % 2 == 0 {
                pool.unpin_page(F, PageId(i), true); // dirty, unpinned
            }
            // odd pages remain pinned
        }

        let stats = pool.stats();
        assert_eq!(stats.total_frames, 10);
        assert_eq!(stats.free_frames, 6);
        assert_eq!(stats.used_frames, 4);
        assert_eq!(stats.pinned_frames, 2);
        assert_eq!(stats.dirty_frames, 2);
    }
}

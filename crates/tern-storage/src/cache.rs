//! Page cache: pinned-page access over the buffer pool and disk manager.
//!
//! Every page access goes through a [`PinnedPage`] guard. The guard pins
//! the page on creation and unpins it on drop with the dirty flag it
//! accumulated, so no exit path (error propagation included) can leak a
//! pin or lose a modification.

use crate::disk::{DiskManager, DiskManagerConfig};
use std::cell::Cell;
use std::sync::Arc;
use tern_buffer::{BufferFrame, BufferPool, BufferPoolConfig, EvictedPage};
use tern_common::config::StorageConfig;
use tern_common::page::{FileId, PageId, PAGE_SIZE};
use tern_common::{Result, TernError};

/// Buffer-managed page access for the storage layer.
///
/// On a pool miss the page is read from disk and installed; dirty pages
/// evicted to make room are written back before the access completes.
pub struct PageCache {
    disk: Arc<DiskManager>,
    pool: Arc<BufferPool>,
}

impl PageCache {
    /// Creates a page cache over a disk manager and buffer pool.
    pub fn new(disk: Arc<DiskManager>, pool: Arc<BufferPool>) -> Self {
        Self { disk, pool }
    }

    /// Creates a page cache from a storage configuration.
    pub fn with_config(config: &StorageConfig) -> Result<Self> {
        let disk = Arc::new(DiskManager::new(DiskManagerConfig {
            data_dir: config.data_dir.clone(),
            fsync_enabled: config.fsync_enabled,
        })?);
        let pool = Arc::new(BufferPool::new(BufferPoolConfig {
            num_frames: config.buffer_pool_frames,
        }));
        Ok(Self { disk, pool })
    }

    /// Returns the underlying disk manager.
    pub fn disk(&self) -> &DiskManager {
        &self.disk
    }

    /// Returns the underlying buffer pool.
    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    fn write_back(&self, evicted: Option<EvictedPage>) -> Result<()> {
        if let Some(evicted) = evicted {
            self.disk
                .write_page(evicted.file, evicted.page, &evicted.data)?;
        }
        Ok(())
    }

    /// Fetches a page, pinning it for the lifetime of the returned guard.
    pub fn fetch(&self, file: FileId, page: PageId) -> Result<PinnedPage<'_>> {
        if let Some(frame) = self.pool.fetch_page(file, page) {
            return Ok(PinnedPage::new(&self.pool, frame, file, page));
        }

        let data = self.disk.read_page(file, page)?;
        let (frame, evicted) = self.pool.load_page(file, page, &data)?;
        // The new frame is already pinned; release it if the write-back of
        // the eviction victim fails.
        if let Err(e) = self.write_back(evicted) {
            self.pool.unpin_page(file, page, false);
            return Err(e);
        }
        Ok(PinnedPage::new(&self.pool, frame, file, page))
    }

    /// Allocates a fresh page at the end of the file and returns it pinned.
    ///
    /// The page is zeroed and the guard starts dirty: a newly allocated
    /// page is always about to be initialized.
    pub fn alloc(&self, file: FileId) -> Result<(PageId, PinnedPage<'_>)> {
        let page = self.disk.allocate_page(file)?;
        let (frame, evicted) = self.pool.new_page(file, page)?;
        if let Err(e) = self.write_back(evicted) {
            self.pool.unpin_page(file, page, false);
            return Err(e);
        }
        let guard = PinnedPage::new(&self.pool, frame, file, page);
        guard.mark_dirty();
        Ok((page, guard))
    }

    /// Flushes all of a file's dirty pages to disk and fsyncs it.
    pub fn flush_file(&self, file: FileId) -> Result<()> {
        self.pool.flush_file(file, |f, p, data| {
            let data: &[u8; PAGE_SIZE] = data
                .try_into()
                .map_err(|_| TernError::Internal("short page buffer".to_string()))?;
            self.disk.write_page(f, p, data)
        })?;
        self.disk.flush_file(file)
    }
}

/// RAII guard for a pinned page.
///
/// Reads go through [`data`](PinnedPage::data); writes through
/// [`data_mut`](PinnedPage::data_mut), which also marks the guard dirty.
/// Dropping the guard unpins the page with the accumulated dirty flag.
pub struct PinnedPage<'a> {
    pool: &'a BufferPool,
    frame: &'a BufferFrame,
    file: FileId,
    page: PageId,
    dirty: Cell<bool>,
}

impl<'a> PinnedPage<'a> {
    fn new(pool: &'a BufferPool, frame: &'a BufferFrame, file: FileId, page: PageId) -> Self {
        Self {
            pool,
            frame,
            file,
            page,
            dirty: Cell::new(false),
        }
    }

    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.page
    }

    /// Returns the file the page belongs to.
    pub fn file_id(&self) -> FileId {
        self.file
    }

    /// Returns read access to the page data.
    pub fn data(&self) -> parking_lot::RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.frame.read_data()
    }

    /// Returns write access to the page data and marks the guard dirty.
    pub fn data_mut(&self) -> parking_lot::RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.dirty.set(true);
        self.frame.write_data()
    }

    /// Marks the page dirty without taking the write lock.
    pub fn mark_dirty(&self) {
        self.dirty.set(true);
    }

    /// Returns true if this guard will unpin dirty.
    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }
}

impl Drop for PinnedPage<'_> {
    fn drop(&mut self) {
        self.pool.unpin_page(self.file, self.page, self.dirty.get());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::DiskManagerConfig;
    use tern_buffer::BufferPoolConfig;
    use tempfile::tempdir;

    fn create_test_cache(frames: usize) -> (PageCache, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let disk = Arc::new(
            DiskManager::new(DiskManagerConfig {
                data_dir: dir.path().to_path_buf(),
                fsync_enabled: false,
            })
            .unwrap(),
        );
        let pool = Arc::new(BufferPool::new(BufferPoolConfig { num_frames: frames }));
        (PageCache::new(disk, pool), dir)
    }

    #[test]
    fn test_with_config() {
        let dir = tempdir().unwrap();
        let cache = PageCache::with_config(&StorageConfig {
            data_dir: dir.path().to_path_buf(),
            buffer_pool_frames: 16,
            fsync_enabled: false,
        })
        .unwrap();

        assert_eq!(cache.pool().num_frames(), 16);
        let file = cache.disk().create("f").unwrap();
        let (page, _guard) = cache.alloc(file).unwrap();
        assert_eq!(page, PageId(1));
    }

    #[test]
    fn test_alloc_pinned_and_dirty() {
        let (cache, _dir) = create_test_cache(8);
        let file = cache.disk().create("f").unwrap();

        let (page, guard) = cache.alloc(file).unwrap();
        assert_eq!(page, PageId(1));
        assert!(guard.is_dirty());

        let stats = cache.pool().stats();
        assert_eq!(stats.pinned_frames, 1);

        drop(guard);
        let stats = cache.pool().stats();
        assert_eq!(stats.pinned_frames, 0);
        assert_eq!(stats.dirty_frames, 1);
    }

    #[test]
    fn test_fetch_unpins_clean_on_drop() {
        let (cache, _dir) = create_test_cache(8);
        let file = cache.disk().create("f").unwrap();
        let (page, guard) = cache.alloc(file).unwrap();
        drop(guard);
        cache.flush_file(file).unwrap();

        {
            let guard = cache.fetch(file, page).unwrap();
            assert!(!guard.is_dirty());
            assert_eq!(guard.page_id(), page);
        }
        assert_eq!(cache.pool().stats().pinned_frames, 0);
        assert_eq!(cache.pool().stats().dirty_frames, 0);
    }

    #[test]
    fn test_write_survives_eviction() {
        // Single-frame pool: every access evicts the previous page.
        let (cache, _dir) = create_test_cache(1);
        let file = cache.disk().create("f").unwrap();

        let (p1, guard) = cache.alloc(file).unwrap();
        guard.data_mut()[0] = 0xAA;
        drop(guard);

        let (p2, guard) = cache.alloc(file).unwrap();
        guard.data_mut()[0] = 0xBB;
        drop(guard);

        // Fetching p1 evicts dirty p2; p1's earlier write came back from disk.
        let guard = cache.fetch(file, p1).unwrap();
        assert_eq!(guard.data()[0], 0xAA);
        drop(guard);

        let guard = cache.fetch(file, p2).unwrap();
        assert_eq!(guard.data()[0], 0xBB);
    }

    #[test]
    fn test_data_mut_marks_dirty() {
        let (cache, _dir) = create_test_cache(8);
        let file = cache.disk().create("f").unwrap();
        let (page, guard) = cache.alloc(file).unwrap();
        drop(guard);
        cache.flush_file(file).unwrap();

        let guard = cache.fetch(file, page).unwrap();
        assert!(!guard.is_dirty());
        guard.data_mut()[10] = 7;
        assert!(guard.is_dirty());
        drop(guard);

        assert_eq!(cache.pool().stats().dirty_frames, 1);
    }

    #[test]
    fn test_flush_file_persists() {
        let (cache, _dir) = create_test_cache(8);
        let file = cache.disk().create("f").unwrap();

        let (page, guard) = cache.alloc(file).unwrap();
        guard.data_mut()[0] = 0x42;
        drop(guard);

        cache.flush_file(file).unwrap();
        assert_eq!(cache.pool().stats().dirty_frames, 0);
        assert_eq!(cache.disk().read_page(file, page).unwrap()[0], 0x42);
    }

    #[test]
    fn test_nested_pins() {
        let (cache, _dir) = create_test_cache(8);
        let file = cache.disk().create("f").unwrap();
        let (page, guard) = cache.alloc(file).unwrap();

        let second = cache.fetch(file, page).unwrap();
        assert_eq!(cache.pool().stats().pinned_frames, 1); // same frame, pin count 2
        drop(second);
        drop(guard);
        assert_eq!(cache.pool().stats().pinned_frames, 0);
    }
}

//! Disk manager for page-level I/O over named files.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tern_common::page::{FileId, PageId, PAGE_SIZE};
use tern_common::{Result, TernError};

/// Configuration for the disk manager.
#[derive(Debug, Clone)]
pub struct DiskManagerConfig {
    /// Base directory for data files.
    pub data_dir: PathBuf,
    /// Enable fsync after writes.
    pub fsync_enabled: bool,
}

impl Default for DiskManagerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            fsync_enabled: true,
        }
    }
}

/// Handle for an open data file.
struct FileHandle {
    /// The file handle.
    file: File,
    /// File name within the data directory.
    name: String,
    /// Number of pages in the file.
    num_pages: u32,
}

/// Manages reading and writing pages in named files.
///
/// Files are created and opened by name and addressed afterwards through
/// the returned [`FileId`]. Pages are numbered from 1; page number 0 is
/// the invalid sentinel and is never stored, so page N lives at byte
/// offset `(N - 1) * PAGE_SIZE`.
pub struct DiskManager {
    /// Configuration.
    config: DiskManagerConfig,
    /// Open file handles keyed by file id.
    files: Mutex<DiskManagerInner>,
}

struct DiskManagerInner {
    handles: HashMap<u32, FileHandle>,
    by_name: HashMap<String, u32>,
    next_file_id: u32,
}

impl DiskManager {
    /// Creates a new disk manager, creating the data directory if needed.
    pub fn new(config: DiskManagerConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        Ok(Self {
            config,
            files: Mutex::new(DiskManagerInner {
                handles: HashMap::new(),
                by_name: HashMap::new(),
                next_file_id: 0,
            }),
        })
    }

    /// Returns the data directory path.
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.config.data_dir.join(name)
    }

    /// Returns true if a file with this name exists on disk.
    pub fn exists(&self, name: &str) -> bool {
        self.file_path(name).exists()
    }

    /// Creates a new file. Fails if it already exists.
    pub fn create(&self, name: &str) -> Result<FileId> {
        if self.exists(name) {
            return Err(TernError::FileExists(name.to_string()));
        }
        self.register(name, true)
    }

    /// Opens an existing file. Fails if it does not exist.
    ///
    /// Opening a file that is already open returns the existing handle.
    pub fn open(&self, name: &str) -> Result<FileId> {
        if !self.exists(name) {
            return Err(TernError::FileNotFound(name.to_string()));
        }
        self.register(name, false)
    }

    fn register(&self, name: &str, create: bool) -> Result<FileId> {
        let mut inner = self.files.lock();

        if let Some(&id) = inner.by_name.get(name) {
            return Ok(FileId(id));
        }

        let path = self.file_path(name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(create)
            .open(&path)?;

        let file_size = file.metadata()?.len();
        let num_pages = (file_size / PAGE_SIZE as u64) as u32;

        let id = inner.next_file_id;
        inner.next_file_id += 1;
        inner.handles.insert(
            id,
            FileHandle {
                file,
                name: name.to_string(),
                num_pages,
            },
        );
        inner.by_name.insert(name.to_string(), id);

        Ok(FileId(id))
    }

    /// Removes a file from disk, closing it first if open.
    pub fn remove(&self, name: &str) -> Result<()> {
        {
            let mut inner = self.files.lock();
            if let Some(id) = inner.by_name.remove(name) {
                if let Some(handle) = inner.handles.remove(&id) {
                    handle.file.sync_all()?;
                }
            }
        }
        let path = self.file_path(name);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Reads a page from disk.
    pub fn read_page(&self, file: FileId, page: PageId) -> Result<[u8; PAGE_SIZE]> {
        let mut inner = self.files.lock();
        let handle = inner
            .handles
            .get_mut(&file.0)
            .ok_or(TernError::UnknownFile(file.0))?;

        if !page.is_valid() || page.0 > handle.num_pages {
            return Err(TernError::PageNotFound {
                file: file.0,
                page: page.0,
            });
        }

        let offset = (page.0 as u64 - 1) * (PAGE_SIZE as u64);
        handle.file.seek(SeekFrom::Start(offset))?;

        let mut buffer = [0u8; PAGE_SIZE];
        handle.file.read_exact(&mut buffer)?;

        Ok(buffer)
    }

    /// Writes a page to disk.
    pub fn write_page(&self, file: FileId, page: PageId, data: &[u8; PAGE_SIZE]) -> Result<()> {
        let mut inner = self.files.lock();
        let handle = inner
            .handles
            .get_mut(&file.0)
            .ok_or(TernError::UnknownFile(file.0))?;

        if !page.is_valid() {
            return Err(TernError::PageNotFound {
                file: file.0,
                page: page.0,
            });
        }

        let offset = (page.0 as u64 - 1) * (PAGE_SIZE as u64);
        handle.file.seek(SeekFrom::Start(offset))?;
        handle.file.write_all(data)?;

        if self.config.fsync_enabled {
            handle.file.sync_all()?;
        }

        if page.0 > handle.num_pages {
            handle.num_pages = page.0;
        }

        Ok(())
    }

    /// Allocates a new page at the end of the file.
    ///
    /// The page is zero-filled on disk. The first allocation of a fresh
    /// file returns `PageId(1)`.
    pub fn allocate_page(&self, file: FileId) -> Result<PageId> {
        let mut inner = self.files.lock();
        let handle = inner
            .handles
            .get_mut(&file.0)
            .ok_or(TernError::UnknownFile(file.0))?;

        let page = PageId(handle.num_pages + 1);

        let offset = (page.0 as u64 - 1) * (PAGE_SIZE as u64);
        handle.file.seek(SeekFrom::Start(offset))?;
        handle.file.write_all(&[0u8; PAGE_SIZE])?;

        if self.config.fsync_enabled {
            handle.file.sync_all()?;
        }

        handle.num_pages = page.0;

        Ok(page)
    }

    /// Returns the number of pages in a file.
    pub fn num_pages(&self, file: FileId) -> Result<u32> {
        let inner = self.files.lock();
        let handle = inner
            .handles
            .get(&file.0)
            .ok_or(TernError::UnknownFile(file.0))?;
        Ok(handle.num_pages)
    }

    /// Flushes a file's pending writes to disk.
    pub fn flush_file(&self, file: FileId) -> Result<()> {
        let inner = self.files.lock();
        let handle = inner
            .handles
            .get(&file.0)
            .ok_or(TernError::UnknownFile(file.0))?;
        handle.file.sync_all()?;
        Ok(())
    }

    /// Closes a file handle, syncing it first.
    pub fn close_file(&self, file: FileId) -> Result<()> {
        let mut inner = self.files.lock();
        if let Some(handle) = inner.handles.remove(&file.0) {
            inner.by_name.remove(&handle.name);
            handle.file.sync_all()?;
        }
        Ok(())
    }

    /// Closes all open files.
    pub fn close_all(&self) -> Result<()> {
        let mut inner = self.files.lock();
        inner.by_name.clear();
        for (_, handle) in inner.handles.drain() {
            handle.file.sync_all()?;
        }
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let _ = self.close_all();
    }
}

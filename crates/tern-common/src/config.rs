//! Configuration structures for TernDB.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Storage configuration for the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for data and index files.
    pub data_dir: PathBuf,
    /// Buffer pool size in number of frames.
    pub buffer_pool_frames: usize,
    /// Enable fsync after page writes.
    pub fsync_enabled: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            buffer_pool_frames: 1024, // 8 MB with 8 KB pages
            fsync_enabled: true,
        }
    }
}

impl StorageConfig {
    /// Returns the total buffer pool size in bytes.
    pub fn buffer_pool_size_bytes(&self) -> usize {
        self.buffer_pool_frames * crate::page::PAGE_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StorageConfig::default();
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.buffer_pool_frames, 1024);
        assert!(config.fsync_enabled);
    }

    #[test]
    fn test_buffer_pool_size_bytes() {
        let config = StorageConfig::default();
        assert_eq!(config.buffer_pool_size_bytes(), 1024 * 8192);
        assert_eq!(config.buffer_pool_size_bytes(), 8_388_608); // 8 MB
    }

    #[test]
    fn test_custom() {
        let config = StorageConfig {
            data_dir: PathBuf::from("/var/lib/terndb"),
            buffer_pool_frames: 4096,
            fsync_enabled: false,
        };
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/terndb"));
        assert_eq!(config.buffer_pool_frames, 4096);
        assert!(!config.fsync_enabled);
    }

    #[test]
    fn test_clone() {
        let config1 = StorageConfig::default();
        let config2 = config1.clone();
        assert_eq!(config1.data_dir, config2.data_dir);
        assert_eq!(config1.buffer_pool_frames, config2.buffer_pool_frames);
    }

    #[test]
    fn test_serde_roundtrip() {
        let original = StorageConfig::default();
        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: StorageConfig = serde_json::from_str(&serialized).unwrap();

        assert_eq!(original.data_dir, deserialized.data_dir);
        assert_eq!(original.buffer_pool_frames, deserialized.buffer_pool_frames);
        assert_eq!(original.fsync_enabled, deserialized.fsync_enabled);
    }
}

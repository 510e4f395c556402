//! Error types for TernDB.

use thiserror::Error;

/// Result type alias using TernError.
pub type Result<T> = std::result::Result<T, TernError>;

/// Errors that can occur in TernDB operations.
#[derive(Debug, Error)]
pub enum TernError {
    // I/O and file errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("File already exists: {0}")]
    FileExists(String),

    #[error("Unknown file handle: {0}")]
    UnknownFile(u32),

    // Page and buffer errors
    #[error("Page not found: {file}:{page}")]
    PageNotFound { file: u32, page: u32 },

    #[error("Buffer pool full, unable to allocate frame")]
    BufferPoolFull,

    #[error("Heap page full, unable to append record")]
    PageFull,

    // B+ tree node errors
    #[error("B+ tree node full")]
    NodeFull,

    #[error("Duplicate key")]
    DuplicateKey,

    #[error("B+ tree corrupted: {0}")]
    Corrupted(String),

    // Index errors
    #[error("Index header does not match requested relation, offset, or type: {0}")]
    BadIndexInfo(String),

    #[error("Scan operator not in the accepted set")]
    BadOpcodes,

    #[error("Bad scan range: low {low} > high {high}")]
    BadScanrange { low: i32, high: i32 },

    #[error("No key found in the given scan range")]
    NoSuchKeyFound,

    #[error("Scan not initialized")]
    ScanNotInitialized,

    #[error("Index scan completed")]
    IndexScanCompleted,

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn test_io_error_conversion() {
        let io_err = IoError::new(ErrorKind::NotFound, "file not found");
        let tern_err: TernError = io_err.into();
        assert!(matches!(tern_err, TernError::Io(_)));
        assert!(tern_err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_file_errors_display() {
        let err = TernError::FileNotFound("rel.8".to_string());
        assert_eq!(err.to_string(), "File not found: rel.8");

        let err = TernError::FileExists("rel.8".to_string());
        assert_eq!(err.to_string(), "File already exists: rel.8");

        let err = TernError::UnknownFile(9);
        assert_eq!(err.to_string(), "Unknown file handle: 9");
    }

    #[test]
    fn test_page_not_found_display() {
        let err = TernError::PageNotFound { file: 2, page: 42 };
        assert_eq!(err.to_string(), "Page not found: 2:42");
    }

    #[test]
    fn test_buffer_pool_full_display() {
        let err = TernError::BufferPoolFull;
        assert_eq!(err.to_string(), "Buffer pool full, unable to allocate frame");
    }

    #[test]
    fn test_scan_errors_display() {
        let err = TernError::BadOpcodes;
        assert_eq!(err.to_string(), "Scan operator not in the accepted set");

        let err = TernError::BadScanrange { low: 10, high: 3 };
        assert_eq!(err.to_string(), "Bad scan range: low 10 > high 3");

        let err = TernError::NoSuchKeyFound;
        assert_eq!(err.to_string(), "No key found in the given scan range");

        let err = TernError::ScanNotInitialized;
        assert_eq!(err.to_string(), "Scan not initialized");

        let err = TernError::IndexScanCompleted;
        assert_eq!(err.to_string(), "Index scan completed");
    }

    #[test]
    fn test_bad_index_info_display() {
        let err = TernError::BadIndexInfo("relation name mismatch".to_string());
        assert!(err.to_string().contains("relation name mismatch"));
    }

    #[test]
    fn test_node_errors_display() {
        assert_eq!(TernError::NodeFull.to_string(), "B+ tree node full");
        assert_eq!(TernError::DuplicateKey.to_string(), "Duplicate key");

        let err = TernError::Corrupted("leaf chain broken".to_string());
        assert_eq!(err.to_string(), "B+ tree corrupted: leaf chain broken");
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(TernError::Internal("test".to_string()))
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TernError>();
    }
}

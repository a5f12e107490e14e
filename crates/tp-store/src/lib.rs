// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Per-movie path schema and mime→extension rules.
pub mod context;
/// Local-filesystem backend.
pub mod local;
/// Movie-scoped advisory locks.
pub mod lock;
/// In-memory backend for tests.
pub mod memory;

pub use context::StorageContext;
pub use local::LocalBlobStore;
pub use lock::{FileLockManager, LockError, LockManager, MemoryLockManager, MovieLockGuard};
pub use memory::MemoryBlobStore;

use thiserror::Error;

/// Errors from blob store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested logical path does not exist.
    #[error("blob not found: {path}")]
    NotFound {
        /// Logical path that was requested.
        path: String,
    },

    /// The requested byte range falls outside the blob.
    #[error("range {start}..={end} out of bounds for {path} ({len} bytes)")]
    RangeOutOfBounds {
        /// Logical path.
        path: String,
        /// Inclusive range start.
        start: u64,
        /// Inclusive range end.
        end: u64,
        /// Blob length.
        len: u64,
    },

    /// Underlying I/O failure.
    #[error("storage i/o failed for {path}")]
    Io {
        /// Logical path.
        path: String,
        /// OS-level cause.
        #[source]
        source: std::io::Error,
    },
}

/// Capability set of a blob backend.
///
/// Paths are logical, `/`-separated, and relative to the backend's root.
/// `write_bytes` is atomic for a given path: readers observe either the
/// old content or the new, never a torn write.
pub trait BlobStore: Send + Sync {
    /// `true` when a blob exists at the logical path.
    fn file_exists(&self, path: &str) -> Result<bool, StoreError>;

    /// Read a whole blob.
    fn read_to_bytes(&self, path: &str) -> Result<Vec<u8>, StoreError>;

    /// Read the inclusive byte range `start..=end`.
    fn read_range(&self, path: &str, start: u64, end: u64) -> Result<Vec<u8>, StoreError>;

    /// Write a blob, replacing any previous content atomically.
    fn write_bytes(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError>;

    /// Enumerate logical paths under a prefix, sorted.
    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

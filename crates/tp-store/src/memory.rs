// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory blob backend.

use crate::{BlobStore, StoreError};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// A mutex-protected map of logical path → bytes. Test backend.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.lock().expect("blob map lock poisoned").len()
    }

    /// `true` when no blobs are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlobStore for MemoryBlobStore {
    fn file_exists(&self, path: &str) -> Result<bool, StoreError> {
        Ok(self
            .blobs
            .lock()
            .expect("blob map lock poisoned")
            .contains_key(path))
    }

    fn read_to_bytes(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        self.blobs
            .lock()
            .expect("blob map lock poisoned")
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                path: path.to_string(),
            })
    }

    fn read_range(&self, path: &str, start: u64, end: u64) -> Result<Vec<u8>, StoreError> {
        let bytes = self.read_to_bytes(path)?;
        let len = bytes.len() as u64;
        if start > end || end >= len {
            return Err(StoreError::RangeOutOfBounds {
                path: path.to_string(),
                start,
                end,
                len,
            });
        }
        Ok(bytes[start as usize..=end as usize].to_vec())
    }

    fn write_bytes(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.blobs
            .lock()
            .expect("blob map lock poisoned")
            .insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .blobs
            .lock()
            .expect("blob map lock poisoned")
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

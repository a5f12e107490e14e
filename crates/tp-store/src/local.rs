// SPDX-License-Identifier: MIT OR Apache-2.0
//! Local-filesystem blob backend.

use crate::{BlobStore, StoreError};
use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::trace;

/// A blob store rooted at a directory on the local filesystem.
///
/// Logical paths map 1:1 onto relative filesystem paths beneath the root.
/// Writes stage into a sibling temp file and rename into place, so a
/// concurrent reader never observes a torn blob.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    /// Create a store rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The filesystem root of this store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn fs_path(&self, logical: &str) -> PathBuf {
        let mut p = self.root.clone();
        for segment in logical.split('/').filter(|s| !s.is_empty()) {
            p.push(segment);
        }
        p
    }

    fn io_err(path: &str, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: path.to_string(),
            source,
        }
    }
}

impl BlobStore for LocalBlobStore {
    fn file_exists(&self, path: &str) -> Result<bool, StoreError> {
        Ok(self.fs_path(path).is_file())
    }

    fn read_to_bytes(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        match fs::read(self.fs_path(path)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound {
                path: path.to_string(),
            }),
            Err(e) => Err(Self::io_err(path, e)),
        }
    }

    fn read_range(&self, path: &str, start: u64, end: u64) -> Result<Vec<u8>, StoreError> {
        let fs_path = self.fs_path(path);
        let mut file = match fs::File::open(&fs_path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    path: path.to_string(),
                });
            }
            Err(e) => return Err(Self::io_err(path, e)),
        };
        let len = file
            .metadata()
            .map_err(|e| Self::io_err(path, e))?
            .len();
        if start > end || end >= len {
            return Err(StoreError::RangeOutOfBounds {
                path: path.to_string(),
                start,
                end,
                len,
            });
        }
        file.seek(SeekFrom::Start(start))
            .map_err(|e| Self::io_err(path, e))?;
        let mut buf = vec![0u8; (end - start + 1) as usize];
        file.read_exact(&mut buf)
            .map_err(|e| Self::io_err(path, e))?;
        Ok(buf)
    }

    fn write_bytes(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let fs_path = self.fs_path(path);
        if let Some(parent) = fs_path.parent() {
            fs::create_dir_all(parent).map_err(|e| Self::io_err(path, e))?;
        }
        // Stage-then-rename keeps the target atomic for readers.
        let tmp = fs_path.with_extension("tmp-write");
        fs::write(&tmp, bytes).map_err(|e| Self::io_err(path, e))?;
        fs::rename(&tmp, &fs_path).map_err(|e| Self::io_err(path, e))?;
        trace!(target: "tp.store", path, size = bytes.len(), "blob written");
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut out = Vec::new();
        let mut stack = vec![self.root.clone()];
        while let Some(dir) = stack.pop() {
            let entries = match fs::read_dir(&dir) {
                Ok(e) => e,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(Self::io_err(prefix, e)),
            };
            for entry in entries {
                let entry = entry.map_err(|e| Self::io_err(prefix, e))?;
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else if let Ok(rel) = path.strip_prefix(&self.root) {
                    let logical = rel
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    if logical.starts_with(prefix) {
                        out.push(logical);
                    }
                }
            }
        }
        out.sort();
        Ok(out)
    }
}

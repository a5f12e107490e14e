// SPDX-License-Identifier: MIT OR Apache-2.0
//! Movie-scoped advisory locks.
//!
//! One planner/runner per movie at a time. The planner acquires the lock
//! for the duration of plan generation; a second acquirer fails
//! immediately rather than blocking. Guards release on drop, on every
//! exit path.

use fs2::FileExt;
use std::collections::HashSet;
use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::debug;

/// Errors from lock acquisition.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another caller already holds the movie's lock.
    #[error("movie {movie} is locked by another planner")]
    AlreadyLocked {
        /// The contended movie id.
        movie: String,
    },

    /// The lock file could not be created or locked.
    #[error("lock file error for movie {movie}")]
    Io {
        /// The movie id.
        movie: String,
        /// OS-level cause.
        #[source]
        source: std::io::Error,
    },
}

/// A held movie lock. Dropping it releases the lock.
pub struct MovieLockGuard {
    movie: String,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl MovieLockGuard {
    /// The movie this guard protects.
    #[must_use]
    pub fn movie(&self) -> &str {
        &self.movie
    }
}

impl Drop for MovieLockGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
            debug!(target: "tp.store", movie = %self.movie, "movie lock released");
        }
    }
}

impl std::fmt::Debug for MovieLockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MovieLockGuard")
            .field("movie", &self.movie)
            .finish()
    }
}

/// Grants exclusive, non-blocking per-movie locks.
pub trait LockManager: Send + Sync {
    /// Try to acquire the movie's lock. Fails fast when contended.
    fn acquire(&self, movie: &str) -> Result<MovieLockGuard, LockError>;
}

/// Advisory file locks under a storage root (`<movie>/.lock`).
#[derive(Debug, Clone)]
pub struct FileLockManager {
    root: PathBuf,
}

impl FileLockManager {
    /// Create a manager rooted at the storage directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl LockManager for FileLockManager {
    fn acquire(&self, movie: &str) -> Result<MovieLockGuard, LockError> {
        let dir = self.root.join(movie);
        fs::create_dir_all(&dir).map_err(|e| LockError::Io {
            movie: movie.to_string(),
            source: e,
        })?;
        let lock_path = dir.join(".lock");
        let file = File::create(&lock_path).map_err(|e| LockError::Io {
            movie: movie.to_string(),
            source: e,
        })?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!(target: "tp.store", movie, path = %lock_path.display(), "movie lock acquired");
                Ok(MovieLockGuard {
                    movie: movie.to_string(),
                    // The lock is tied to the file handle; dropping the
                    // handle releases it even if unlock fails.
                    release: Some(Box::new(move || {
                        let _ = fs2::FileExt::unlock(&file);
                    })),
                })
            }
            Err(_) => Err(LockError::AlreadyLocked {
                movie: movie.to_string(),
            }),
        }
    }
}

/// Process-local lock manager for the in-memory backend.
#[derive(Debug, Clone, Default)]
pub struct MemoryLockManager {
    held: Arc<Mutex<HashSet<String>>>,
}

impl MemoryLockManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LockManager for MemoryLockManager {
    fn acquire(&self, movie: &str) -> Result<MovieLockGuard, LockError> {
        let mut held = self.held.lock().expect("lock set poisoned");
        if !held.insert(movie.to_string()) {
            return Err(LockError::AlreadyLocked {
                movie: movie.to_string(),
            });
        }
        drop(held);
        let set = Arc::clone(&self.held);
        let key = movie.to_string();
        Ok(MovieLockGuard {
            movie: movie.to_string(),
            release: Some(Box::new(move || {
                set.lock().expect("lock set poisoned").remove(&key);
            })),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_lock_excludes_second_acquirer() {
        let mgr = MemoryLockManager::new();
        let guard = mgr.acquire("m").unwrap();
        assert!(matches!(
            mgr.acquire("m"),
            Err(LockError::AlreadyLocked { .. })
        ));
        drop(guard);
        assert!(mgr.acquire("m").is_ok());
    }

    #[test]
    fn memory_lock_is_per_movie() {
        let mgr = MemoryLockManager::new();
        let _a = mgr.acquire("a").unwrap();
        assert!(mgr.acquire("b").is_ok());
    }

    #[test]
    fn file_lock_excludes_within_process() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = FileLockManager::new(tmp.path());
        let guard = mgr.acquire("m").unwrap();
        // A second handle in the same process still contends on the
        // advisory lock held above.
        let second = FileLockManager::new(tmp.path());
        assert!(matches!(
            second.acquire("m"),
            Err(LockError::AlreadyLocked { .. })
        ));
        drop(guard);
        assert!(second.acquire("m").is_ok());
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! File-backed event log.
//!
//! One JSONL file per stream per movie, laid out by [`StorageContext`].
//! Appenders take an exclusive advisory lock on the log file, write the
//! whole line with a single `write_all`, and fsync before releasing, so
//! concurrent appenders never interleave bytes or drop events.

use crate::{EventLog, EventLogError, EventStream, HasRevision};
use fs2::FileExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tp_core::{ArtifactEvent, InputEvent, Revision};
use tp_store::StorageContext;
use tracing::trace;

/// Event log over JSONL files beneath a storage root.
#[derive(Debug, Clone)]
pub struct FileEventLog {
    root: PathBuf,
}

impl FileEventLog {
    /// Create a log rooted at the storage directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn log_path(&self, logical: &str) -> PathBuf {
        let mut p = self.root.clone();
        for segment in logical.split('/') {
            p.push(segment);
        }
        p
    }

    fn append_line<T: Serialize>(&self, logical: &str, event: &T) -> Result<(), EventLogError> {
        let path = self.log_path(logical);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_err(&path, e))?;
        }
        let mut line = serde_json::to_string(event).map_err(EventLogError::Serialize)?;
        line.push('\n');

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| io_err(&path, e))?;
        file.lock_exclusive().map_err(|e| io_err(&path, e))?;
        let result = write_locked(&file, line.as_bytes());
        let _ = fs2::FileExt::unlock(&file);
        result.map_err(|e| io_err(&path, e))?;
        trace!(target: "tp.events", path = %path.display(), "event appended");
        Ok(())
    }

    fn stream<T>(
        &self,
        logical: &str,
        after: Option<Revision>,
    ) -> Result<EventStream<T>, EventLogError>
    where
        T: DeserializeOwned + HasRevision + Send + 'static,
    {
        let path = self.log_path(logical);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Box::new(std::iter::empty()));
            }
            Err(e) => return Err(io_err(&path, e)),
        };
        Ok(Box::new(LineEvents {
            reader: BufReader::new(file),
            path: path.display().to_string(),
            line: 0,
            after,
            done: false,
            _marker: std::marker::PhantomData,
        }))
    }
}

fn write_locked(mut file: &File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes)?;
    file.flush()?;
    // Durable before the append returns.
    file.sync_data()
}

fn io_err(path: &Path, source: std::io::Error) -> EventLogError {
    EventLogError::Io {
        path: path.display().to_string(),
        source,
    }
}

impl EventLog for FileEventLog {
    fn append_input(&self, movie: &str, event: &InputEvent) -> Result<(), EventLogError> {
        self.append_line(&StorageContext::new(movie).inputs_log(), event)
    }

    fn append_artefact(&self, movie: &str, event: &ArtifactEvent) -> Result<(), EventLogError> {
        self.append_line(&StorageContext::new(movie).artefacts_log(), event)
    }

    fn stream_inputs(
        &self,
        movie: &str,
        after: Option<Revision>,
    ) -> Result<EventStream<InputEvent>, EventLogError> {
        self.stream(&StorageContext::new(movie).inputs_log(), after)
    }

    fn stream_artefacts(
        &self,
        movie: &str,
        after: Option<Revision>,
    ) -> Result<EventStream<ArtifactEvent>, EventLogError> {
        self.stream(&StorageContext::new(movie).artefacts_log(), after)
    }
}

/// Iterator over one JSONL file.
///
/// A trailing line without `\n` is a writer caught mid-append and is
/// ignored; a complete line that fails to parse surfaces as
/// [`EventLogError::Corrupt`] and ends the stream.
struct LineEvents<T> {
    reader: BufReader<File>,
    path: String,
    line: u64,
    after: Option<Revision>,
    done: bool,
    _marker: std::marker::PhantomData<T>,
}

impl<T> Iterator for LineEvents<T>
where
    T: DeserializeOwned + HasRevision,
{
    type Item = Result<T, EventLogError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            let mut buf = String::new();
            match self.reader.read_line(&mut buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => {
                    self.done = true;
                    return Some(Err(EventLogError::Io {
                        path: self.path.clone(),
                        source: e,
                    }));
                }
            }
            self.line += 1;
            if !buf.ends_with('\n') {
                // Torn trailing line; a writer holds the lock right now.
                return None;
            }
            let trimmed = buf.trim_end();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<T>(trimmed) {
                Ok(event) => {
                    if let Some(after) = self.after {
                        if event.revision() <= after {
                            continue;
                        }
                    }
                    return Some(Ok(event));
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(EventLogError::Corrupt {
                        path: self.path.clone(),
                        line: self.line,
                        source: e,
                    }));
                }
            }
        }
    }
}

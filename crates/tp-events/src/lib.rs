// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// File-backed event log.
pub mod file;
/// In-memory event log for tests.
pub mod memory;

pub use file::FileEventLog;
pub use memory::MemoryEventLog;

use tp_core::{ArtifactEvent, ArtifactOutput, InputEvent, Revision};
use thiserror::Error;

/// Errors from event log operations.
#[derive(Debug, Error)]
pub enum EventLogError {
    /// A complete log line failed to parse.
    #[error("corrupt event log {path} at line {line}")]
    Corrupt {
        /// Log file path.
        path: String,
        /// 1-based line number.
        line: u64,
        /// Parse failure detail.
        #[source]
        source: serde_json::Error,
    },

    /// Underlying I/O failure.
    #[error("event log i/o failed for {path}")]
    Io {
        /// Log file path.
        path: String,
        /// OS-level cause.
        #[source]
        source: std::io::Error,
    },

    /// An event could not be serialized for appending.
    #[error("event serialization failed")]
    Serialize(#[source] serde_json::Error),
}

/// A lazy, finite, restartable sequence of events in append order.
pub type EventStream<T> = Box<dyn Iterator<Item = Result<T, EventLogError>> + Send>;

/// Append-only input/artefact event streams for one storage backend.
///
/// Appends are durable before the call returns. Concurrent readers may
/// observe a prefix of the log but never a truncated line.
pub trait EventLog: Send + Sync {
    /// Append one input event. Line-atomic under concurrent appenders.
    fn append_input(&self, movie: &str, event: &InputEvent) -> Result<(), EventLogError>;

    /// Append one artefact event. Line-atomic under concurrent appenders.
    fn append_artefact(&self, movie: &str, event: &ArtifactEvent) -> Result<(), EventLogError>;

    /// Stream input events, optionally only those with revision strictly
    /// greater than `after`.
    fn stream_inputs(
        &self,
        movie: &str,
        after: Option<Revision>,
    ) -> Result<EventStream<InputEvent>, EventLogError>;

    /// Stream artefact events, optionally filtered as above.
    fn stream_artefacts(
        &self,
        movie: &str,
        after: Option<Revision>,
    ) -> Result<EventStream<ArtifactEvent>, EventLogError>;
}

/// Revision accessor shared by both event kinds, used by the `after`
/// filter.
pub trait HasRevision {
    /// The event's revision.
    fn revision(&self) -> Revision;
}

impl HasRevision for InputEvent {
    fn revision(&self) -> Revision {
        self.revision
    }
}

impl HasRevision for ArtifactEvent {
    fn revision(&self) -> Revision {
        self.revision
    }
}

/// Canonical hash of an input payload, stable under key permutation.
#[must_use]
pub fn hash_input_payload(payload: &serde_json::Value) -> String {
    tp_hash::hash_payload(payload).hash
}

/// Canonical hash of an artefact output, stable under field permutation.
#[must_use]
pub fn hash_artefact_output(output: &ArtifactOutput) -> String {
    let value = serde_json::to_value(output).unwrap_or(serde_json::Value::Null);
    tp_hash::hash_payload(&value).hash
}

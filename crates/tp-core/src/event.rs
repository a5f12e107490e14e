// SPDX-License-Identifier: MIT OR Apache-2.0
//! Input and artefact events.
//!
//! Events are the only durable record of a movie's history. The input log
//! gets one event per changed input per planner run; the artefact log gets
//! one event per completed producer attempt (or per hand-edited draft).
//! Manifests are folds over these streams.

use crate::ids::{ArtifactId, InputId};
use crate::revision::Revision;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who recorded an input edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EditedBy {
    /// An explicit user edit (CLI flag, inputs file, UI).
    User,
    /// A value synthesized by the system (defaults, migrations).
    System,
}

/// A single input edit, appended once per changed input per planner run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InputEvent {
    /// Canonical input id.
    pub id: InputId,
    /// Revision the edit belongs to.
    pub revision: Revision,
    /// Canonical payload hash.
    pub hash: String,
    /// The new payload value.
    pub payload: Value,
    /// Origin of the edit.
    pub edited_by: EditedBy,
    /// When the event was recorded.
    pub created_at: DateTime<Utc>,
}

/// Reference to a payload stored in the blob store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BlobRef {
    /// Hex SHA-256 of the raw bytes.
    pub hash: String,
    /// Payload size in bytes.
    pub size: u64,
    /// Mime type the bytes were produced with.
    pub mime_type: String,
}

/// Terminal status of a producer attempt for one artefact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    /// The artefact was produced.
    Succeeded,
    /// The producer failed for this artefact.
    Failed,
    /// The producer was never invoked because an upstream input was missing.
    Skipped,
}

/// Where an artefact's payload lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactOutput {
    /// Binary payload written to the blob store.
    Blob(BlobRef),
    /// Structured payload recorded inline in the event.
    Inline(Value),
}

/// A single artefact outcome, appended by the runner per completed attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactEvent {
    /// Canonical artefact instance id.
    pub artefact_id: ArtifactId,
    /// Revision the attempt ran under.
    pub revision: Revision,
    /// Digest of the input ids the producing job declared.
    pub inputs_hash: String,
    /// Payload location; absent for failed and skipped attempts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<ArtifactOutput>,
    /// Outcome of the attempt.
    pub status: ArtifactStatus,
    /// Producer name (or `workspace-edit` for hand-edited drafts).
    pub produced_by: String,
    /// Structured diagnostics (error detail, retry notes).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Value>,
    /// When the event was recorded.
    pub created_at: DateTime<Utc>,
}

/// `produced_by` marker for artefact drafts injected by hand-editing.
pub const WORKSPACE_EDIT: &str = "workspace-edit";

// SPDX-License-Identifier: MIT OR Apache-2.0
//! The producer invocation ABI.
//!
//! The runner calls a producer's `produce` function with a
//! [`ProduceRequest`] and normalizes whatever comes back: an absent status
//! means `succeeded`, exceptions become `failed` with serialized detail.

use crate::ids::{ArtifactId, ProducerId};
use crate::job::JobDescriptor;
use crate::revision::Revision;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status a producer may report for a job or an individual artefact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProduceStatus {
    /// Output was produced.
    Succeeded,
    /// Production failed.
    Failed,
    /// The producer declined to run (e.g. nothing to do).
    Skipped,
}

/// A request handed to a producer by the runner.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ProduceRequest {
    /// Movie the job belongs to.
    pub movie: String,
    /// The job being executed, including resolved bindings and
    /// `context.extras.resolved_inputs`.
    pub job: JobDescriptor,
    /// Index of the layer the job was scheduled in.
    pub layer_index: usize,
    /// 1-based attempt counter.
    pub attempt: u32,
    /// Target revision of the run.
    pub revision: Revision,
}

/// Payload of one produced artefact.
///
/// Binary payloads carry raw bytes; the runner writes them to the blob
/// store and records a blob reference. Structured payloads are recorded
/// inline.
#[derive(Debug, Clone)]
pub enum ProducedPayload {
    /// Structured payload recorded inline in the artefact event.
    Inline(Value),
    /// Binary payload destined for the blob store.
    Blob {
        /// Raw bytes.
        bytes: Vec<u8>,
        /// Mime type used to pick the blob filename extension.
        mime_type: String,
    },
}

/// One artefact returned from a `produce` call.
#[derive(Debug, Clone)]
pub struct ProducedArtefact {
    /// Artefact instance id. Should be one of the job's `produces` ids.
    pub artefact_id: ArtifactId,
    /// Per-artefact status; absent means the job-level status applies.
    pub status: Option<ProduceStatus>,
    /// Payload; absent for failed/skipped artefacts.
    pub payload: Option<ProducedPayload>,
    /// Artefact-level diagnostics.
    pub diagnostics: Option<Value>,
}

impl ProducedArtefact {
    /// A succeeded artefact with an inline payload.
    pub fn inline(artefact_id: ArtifactId, payload: Value) -> Self {
        Self {
            artefact_id,
            status: Some(ProduceStatus::Succeeded),
            payload: Some(ProducedPayload::Inline(payload)),
            diagnostics: None,
        }
    }

    /// A succeeded artefact with a binary payload.
    pub fn blob(artefact_id: ArtifactId, bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            artefact_id,
            status: Some(ProduceStatus::Succeeded),
            payload: Some(ProducedPayload::Blob {
                bytes,
                mime_type: mime_type.into(),
            }),
            diagnostics: None,
        }
    }
}

/// The full result of a `produce` call.
#[derive(Debug, Clone)]
pub struct ProduceResponse {
    /// Echo of the job id.
    pub job_id: ProducerId,
    /// Job-level status; absent means `succeeded`.
    pub status: Option<ProduceStatus>,
    /// Produced artefacts.
    pub artefacts: Vec<ProducedArtefact>,
    /// Job-level diagnostics.
    pub diagnostics: Option<Value>,
}

impl ProduceResponse {
    /// The normalized job-level status: absent and unknown map to
    /// `Succeeded`.
    #[must_use]
    pub fn normalized_status(&self) -> ProduceStatus {
        self.status.unwrap_or(ProduceStatus::Succeeded)
    }
}

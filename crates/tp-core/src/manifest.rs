// SPDX-License-Identifier: MIT OR Apache-2.0
//! Manifest snapshot and the current-revision pointer.
//!
//! A manifest is the materialized view of a movie at one revision: the
//! latest value of every input and the latest *succeeded* outcome of every
//! artefact with revision at or before the manifest's. Manifests are
//! immutable once written; only the pointer file moves.

use crate::event::{ArtifactOutput, ArtifactStatus};
use crate::ids::{ArtifactId, InputId};
use crate::revision::Revision;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Latest state of one input at the manifest's revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ManifestInputEntry {
    /// Canonical payload hash. Invariant: equals `hash_payload(payload)`.
    pub hash: String,
    /// The payload value itself.
    pub payload: Value,
    /// Timestamp of the event this entry was folded from.
    pub created_at: DateTime<Utc>,
}

/// Latest recorded outcome of one artefact at the manifest's revision.
///
/// Always references the latest *succeeded* event when one exists; a
/// failed or skipped entry appears only when no success precedes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ManifestArtifactEntry {
    /// Digest of the input ids the producing job declared.
    pub inputs_hash: String,
    /// Payload location; absent for failed/skipped entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<ArtifactOutput>,
    /// Producer name that recorded the event.
    pub produced_by: String,
    /// Outcome recorded by the event.
    pub status: ArtifactStatus,
    /// Timestamp of the event this entry was folded from.
    pub created_at: DateTime<Utc>,
}

/// A materialized snapshot of a movie at one revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Manifest {
    /// Revision this manifest materializes.
    pub revision: Revision,
    /// Revision of the manifest this one was folded on top of.
    pub base_revision: Revision,
    /// When the manifest was built.
    pub created_at: DateTime<Utc>,
    /// Latest input state, keyed by canonical input id.
    pub inputs: BTreeMap<InputId, ManifestInputEntry>,
    /// Latest artefact state, keyed by canonical artefact instance id.
    pub artefacts: BTreeMap<ArtifactId, ManifestArtifactEntry>,
    /// Assembled timeline, when the timeline artefact has been produced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeline: Option<Value>,
}

impl Manifest {
    /// An empty manifest at [`Revision::ZERO`], the fold base for a
    /// movie's first run.
    #[must_use]
    pub fn empty(created_at: DateTime<Utc>) -> Self {
        Self {
            revision: Revision::ZERO,
            base_revision: Revision::ZERO,
            created_at,
            inputs: BTreeMap::new(),
            artefacts: BTreeMap::new(),
            timeline: None,
        }
    }

    /// `true` when the manifest has a succeeded entry for the artefact.
    #[must_use]
    pub fn has_succeeded(&self, id: &ArtifactId) -> bool {
        self.artefacts
            .get(id)
            .is_some_and(|e| e.status == ArtifactStatus::Succeeded)
    }
}

/// The `current.json` pointer: which manifest is current for a movie.
///
/// Rewritten atomically (write-temp-then-rename) on every commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ManifestPointer {
    /// Revision of the current manifest.
    pub revision: Revision,
    /// Logical path of the manifest file within the movie's storage.
    pub manifest_path: String,
    /// Canonical hash of the manifest document.
    pub hash: String,
    /// When the pointer was last moved.
    pub updated_at: DateTime<Utc>,
}

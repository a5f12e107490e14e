// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use tp_core::{ArtifactEvent, ArtifactId, ArtifactOutput, ArtifactStatus, BlobRef};
use tp_events::{EventLog, EventLogError};
use tp_store::{BlobStore, StorageContext, StoreError};
use tracing::debug;

/// Errors from artifact resolution.
#[derive(Debug, Error)]
pub enum ResolverError {
    /// A succeeded artefact's blob is not in the store.
    #[error("payload for {artefact} (blob {hash}) is missing")]
    PayloadMissing {
        /// The artefact id.
        artefact: String,
        /// The missing blob hash.
        hash: String,
    },

    /// Event log failure.
    #[error(transparent)]
    Events(#[from] EventLogError),

    /// Blob store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ResolverError {
    /// The taxonomy code for this error.
    #[must_use]
    pub fn error_code(&self) -> tp_error::ErrorCode {
        match self {
            Self::PayloadMissing { .. } => tp_error::ErrorCode::BlobMissing,
            Self::Events(EventLogError::Corrupt { .. }) => tp_error::ErrorCode::EventLogCorrupt,
            _ => tp_error::ErrorCode::BlobMissing,
        }
    }
}

/// A hydrated artefact payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedPayload {
    /// Structured payload, straight from the event.
    Inline(Value),
    /// Binary payload read from the blob store.
    Bytes {
        /// The raw bytes.
        bytes: Vec<u8>,
        /// Mime type recorded with the blob.
        mime_type: String,
    },
}

impl ResolvedPayload {
    /// JSON rendering for `context.extras.resolved_inputs`: inline values
    /// verbatim, binary payloads as base64 text.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Inline(v) => v.clone(),
            Self::Bytes { bytes, mime_type } => serde_json::json!({
                "base64": BASE64.encode(bytes),
                "mime_type": mime_type,
            }),
        }
    }
}

/// Hydrated payloads keyed by full instance id and dimensionless base id.
#[derive(Debug, Clone, Default)]
pub struct ResolvedArtefacts {
    map: BTreeMap<String, ResolvedPayload>,
}

impl ResolvedArtefacts {
    /// Look up by full id or base id.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ResolvedPayload> {
        self.map.get(key)
    }

    /// Number of keys (instance and base keys both count).
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// `true` when nothing resolved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// All entries as JSON, for `context.extras.resolved_inputs`.
    #[must_use]
    pub fn to_json_map(&self) -> BTreeMap<String, Value> {
        self.map
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect()
    }
}

/// Inputs to [`resolve_artifacts`].
pub struct ResolveRequest<'a> {
    /// Movie whose log to stream.
    pub movie: &'a str,
    /// The artefact instances to hydrate.
    pub artifact_ids: &'a [ArtifactId],
    /// Event source.
    pub events: &'a dyn EventLog,
    /// Blob source.
    pub store: &'a dyn BlobStore,
}

/// Hydrate the latest succeeded payload of each requested artefact.
///
/// The event log is streamed exactly once. Requested ids with no
/// succeeded event are absent from the result (the caller decides whether
/// that is a skip or an error); a succeeded blob whose bytes are gone is
/// [`ResolverError::PayloadMissing`].
pub fn resolve_artifacts(req: ResolveRequest<'_>) -> Result<ResolvedArtefacts, ResolverError> {
    let wanted: BTreeMap<&str, &ArtifactId> = req
        .artifact_ids
        .iter()
        .map(|id| (id.as_str(), id))
        .collect();

    let mut latest: BTreeMap<String, ArtifactEvent> = BTreeMap::new();
    for event in req.events.stream_artefacts(req.movie, None)? {
        let event = event?;
        if event.status != ArtifactStatus::Succeeded {
            continue;
        }
        if !wanted.contains_key(event.artefact_id.as_str()) {
            continue;
        }
        let key = event.artefact_id.to_string();
        let newer = latest
            .get(&key)
            .is_none_or(|prior| prior.revision <= event.revision);
        if newer {
            latest.insert(key, event);
        }
    }

    let ctx = StorageContext::new(req.movie);
    let mut resolved = ResolvedArtefacts::default();
    for (key, event) in latest {
        let payload = match &event.output {
            Some(ArtifactOutput::Inline(value)) => ResolvedPayload::Inline(value.clone()),
            Some(ArtifactOutput::Blob(blob)) => ResolvedPayload::Bytes {
                bytes: read_blob(req.store, &ctx, blob, &key)?,
                mime_type: blob.mime_type.clone(),
            },
            None => continue,
        };
        let base = event.artefact_id.base().to_string();
        // The base key points at the lowest index tuple; instance keys win
        // over base keys on collision.
        resolved.map.entry(base).or_insert_with(|| payload.clone());
        resolved.map.insert(key, payload);
    }
    debug!(
        target: "tp.resolver",
        movie = req.movie,
        requested = req.artifact_ids.len(),
        resolved = resolved.len(),
        "artifacts hydrated"
    );
    Ok(resolved)
}

/// Read blob bytes, extension-decorated filename first, bare-hash legacy
/// fallback.
fn read_blob(
    store: &dyn BlobStore,
    ctx: &StorageContext,
    blob: &BlobRef,
    artefact: &str,
) -> Result<Vec<u8>, ResolverError> {
    let decorated = ctx.blob_path(&blob.hash, &blob.mime_type);
    if store.file_exists(&decorated)? {
        return Ok(store.read_to_bytes(&decorated)?);
    }
    let bare = ctx.blob_path_bare(&blob.hash);
    if store.file_exists(&bare)? {
        return Ok(store.read_to_bytes(&bare)?);
    }
    Err(ResolverError::PayloadMissing {
        artefact: artefact.to_string(),
        hash: blob.hash.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use tp_core::Revision;
    use tp_events::MemoryEventLog;
    use tp_store::MemoryBlobStore;

    fn event(
        id: &str,
        rev: u64,
        status: ArtifactStatus,
        output: Option<ArtifactOutput>,
    ) -> ArtifactEvent {
        ArtifactEvent {
            artefact_id: ArtifactId::new(id),
            revision: Revision::new(rev),
            inputs_hash: "h".into(),
            output,
            status,
            produced_by: "P".into(),
            diagnostics: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn latest_succeeded_revision_wins() {
        let log = MemoryEventLog::new();
        let store = MemoryBlobStore::new();
        log.append_artefact(
            "m",
            &event(
                "X[segment=0]",
                1,
                ArtifactStatus::Succeeded,
                Some(ArtifactOutput::Inline(json!("old"))),
            ),
        )
        .unwrap();
        log.append_artefact(
            "m",
            &event(
                "X[segment=0]",
                3,
                ArtifactStatus::Succeeded,
                Some(ArtifactOutput::Inline(json!("new"))),
            ),
        )
        .unwrap();
        log.append_artefact("m", &event("X[segment=0]", 4, ArtifactStatus::Failed, None))
            .unwrap();

        let ids = [ArtifactId::new("X[segment=0]")];
        let resolved = resolve_artifacts(ResolveRequest {
            movie: "m",
            artifact_ids: &ids,
            events: &log,
            store: &store,
        })
        .unwrap();
        assert_eq!(
            resolved.get("Artifact:X[segment=0]"),
            Some(&ResolvedPayload::Inline(json!("new")))
        );
        // Base key mirrors the instance.
        assert_eq!(
            resolved.get("Artifact:X"),
            Some(&ResolvedPayload::Inline(json!("new")))
        );
    }

    #[test]
    fn blob_payload_reads_decorated_then_bare() {
        let log = MemoryEventLog::new();
        let store = MemoryBlobStore::new();
        let blob = BlobRef {
            hash: "abcd".into(),
            size: 4,
            mime_type: "image/png".into(),
        };
        log.append_artefact(
            "m",
            &event(
                "Img[image=0]",
                1,
                ArtifactStatus::Succeeded,
                Some(ArtifactOutput::Blob(blob)),
            ),
        )
        .unwrap();
        // Only the legacy bare filename exists.
        store.write_bytes("m/blobs/ab/abcd", b"\x89PNG").unwrap();

        let ids = [ArtifactId::new("Img[image=0]")];
        let resolved = resolve_artifacts(ResolveRequest {
            movie: "m",
            artifact_ids: &ids,
            events: &log,
            store: &store,
        })
        .unwrap();
        match resolved.get("Artifact:Img[image=0]").unwrap() {
            ResolvedPayload::Bytes { bytes, mime_type } => {
                assert_eq!(bytes, b"\x89PNG");
                assert_eq!(mime_type, "image/png");
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn missing_blob_is_an_error() {
        let log = MemoryEventLog::new();
        let store = MemoryBlobStore::new();
        log.append_artefact(
            "m",
            &event(
                "Img[image=0]",
                1,
                ArtifactStatus::Succeeded,
                Some(ArtifactOutput::Blob(BlobRef {
                    hash: "feed".into(),
                    size: 1,
                    mime_type: "image/png".into(),
                })),
            ),
        )
        .unwrap();

        let ids = [ArtifactId::new("Img[image=0]")];
        let err = resolve_artifacts(ResolveRequest {
            movie: "m",
            artifact_ids: &ids,
            events: &log,
            store: &store,
        })
        .unwrap_err();
        assert!(matches!(err, ResolverError::PayloadMissing { .. }));
        assert_eq!(err.error_code(), tp_error::ErrorCode::BlobMissing);
    }

    #[test]
    fn never_succeeded_artifacts_are_absent() {
        let log = MemoryEventLog::new();
        let store = MemoryBlobStore::new();
        log.append_artefact("m", &event("X[segment=0]", 1, ArtifactStatus::Failed, None))
            .unwrap();
        let ids = [ArtifactId::new("X[segment=0]")];
        let resolved = resolve_artifacts(ResolveRequest {
            movie: "m",
            artifact_ids: &ids,
            events: &log,
            store: &store,
        })
        .unwrap();
        assert!(resolved.is_empty());
    }

    #[test]
    fn json_rendering_encodes_bytes_as_base64() {
        let payload = ResolvedPayload::Bytes {
            bytes: b"abc".to_vec(),
            mime_type: "audio/mp3".into(),
        };
        let json = payload.to_json();
        assert_eq!(json["base64"], json!("YWJj"));
        assert_eq!(json["mime_type"], json!("audio/mp3"));
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;
use thiserror::Error;
use tp_core::{
    ArtifactStatus, Clock, Manifest, ManifestArtifactEntry, ManifestInputEntry, ManifestPointer,
    Revision,
};
use tp_events::{EventLog, EventLogError};
use tp_store::{BlobStore, StorageContext, StoreError};
use tracing::{debug, info};

/// Errors from manifest operations.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// No `current.json` pointer exists for the movie yet.
    #[error("no manifest pointer for movie {movie}")]
    NotFound {
        /// The movie id.
        movie: String,
    },

    /// A referenced manifest snapshot is missing.
    #[error("manifest snapshot missing at {path}")]
    SnapshotMissing {
        /// Logical path of the missing snapshot.
        path: String,
    },

    /// Blob store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Event log failure.
    #[error(transparent)]
    Events(#[from] EventLogError),

    /// A manifest or pointer file failed to (de)serialize.
    #[error("manifest serialization failed at {path}")]
    Serde {
        /// Logical path of the offending file.
        path: String,
        /// Parse/serialize detail.
        #[source]
        source: serde_json::Error,
    },
}

/// A written manifest: its snapshot path and canonical hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenManifest {
    /// Logical path of the snapshot file.
    pub path: String,
    /// Canonical hash of the manifest document.
    pub hash: String,
}

/// Arguments to [`ManifestService::build_from_events`].
pub struct BuildArgs<'a> {
    /// Movie to fold.
    pub movie: &'a str,
    /// Revision the new manifest materializes.
    pub target_revision: Revision,
    /// Base to fold on top of; `None` starts from the empty manifest.
    pub base_revision: Option<Revision>,
    /// Event source.
    pub event_log: &'a dyn EventLog,
}

/// Builds, persists, and loads manifest snapshots for movies.
pub struct ManifestService {
    store: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
}

impl ManifestService {
    /// Create a service over a blob store.
    pub fn new(store: Arc<dyn BlobStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Load the current manifest and its recorded hash.
    ///
    /// # Errors
    ///
    /// [`ManifestError::NotFound`] when the movie has no pointer yet.
    pub fn load_current(&self, movie: &str) -> Result<(Manifest, String), ManifestError> {
        let ctx = StorageContext::new(movie);
        let pointer_path = ctx.current_pointer();
        if !self.store.file_exists(&pointer_path)? {
            return Err(ManifestError::NotFound {
                movie: movie.to_string(),
            });
        }
        let pointer: ManifestPointer = self.read_json(&pointer_path)?;
        let manifest: Manifest = self.read_json(&pointer.manifest_path)?;
        Ok((manifest, pointer.hash))
    }

    /// Load the snapshot at a specific revision.
    pub fn load_at(&self, movie: &str, revision: Revision) -> Result<Manifest, ManifestError> {
        let path = StorageContext::new(movie).manifest_path(revision);
        if !self.store.file_exists(&path)? {
            return Err(ManifestError::SnapshotMissing { path });
        }
        self.read_json(&path)
    }

    /// Fold events into a manifest at `target_revision`.
    ///
    /// Starts from the manifest at `base_revision` (empty when `None` or
    /// zero). Every input/artefact event with revision at or below the
    /// target overwrites its slot, except that failed/skipped artefact
    /// events never displace a prior success.
    pub fn build_from_events(&self, args: BuildArgs<'_>) -> Result<Manifest, ManifestError> {
        let base = match args.base_revision {
            Some(rev) if !rev.is_zero() => Some(self.load_at(args.movie, rev)?),
            _ => None,
        };
        let after = base.as_ref().map(|m| m.revision);
        let base_revision = after.unwrap_or(Revision::ZERO);
        let mut manifest = base.unwrap_or_else(|| Manifest::empty(self.clock.now()));
        manifest.base_revision = base_revision;
        manifest.revision = args.target_revision;
        manifest.created_at = self.clock.now();

        for event in args.event_log.stream_inputs(args.movie, after)? {
            let event = event?;
            if event.revision > args.target_revision {
                continue;
            }
            manifest.inputs.insert(
                event.id,
                ManifestInputEntry {
                    hash: event.hash,
                    payload: event.payload,
                    created_at: event.created_at,
                },
            );
        }

        for event in args.event_log.stream_artefacts(args.movie, after)? {
            let event = event?;
            if event.revision > args.target_revision {
                continue;
            }
            let prior_success = manifest.has_succeeded(&event.artefact_id);
            if event.status != ArtifactStatus::Succeeded && prior_success {
                continue;
            }
            if event.status == ArtifactStatus::Succeeded
                && event.artefact_id.name() == "Timeline"
            {
                if let Some(tp_core::ArtifactOutput::Inline(value)) = &event.output {
                    manifest.timeline = Some(value.clone());
                }
            }
            manifest.artefacts.insert(
                event.artefact_id,
                ManifestArtifactEntry {
                    inputs_hash: event.inputs_hash,
                    output: event.output,
                    produced_by: event.produced_by,
                    status: event.status,
                    created_at: event.created_at,
                },
            );
        }

        debug!(
            target: "tp.manifest",
            movie = args.movie,
            revision = %manifest.revision,
            inputs = manifest.inputs.len(),
            artefacts = manifest.artefacts.len(),
            "manifest folded"
        );
        Ok(manifest)
    }

    /// Persist a manifest snapshot and move the pointer to it.
    ///
    /// The snapshot lands at `manifests/<revision>.json`; the pointer is
    /// rewritten atomically by the blob store's write contract.
    pub fn write_current(
        &self,
        movie: &str,
        manifest: &Manifest,
    ) -> Result<WrittenManifest, ManifestError> {
        let ctx = StorageContext::new(movie);
        let path = ctx.manifest_path(manifest.revision);
        let hash = manifest_hash(manifest).map_err(|source| ManifestError::Serde {
            path: path.clone(),
            source,
        })?;
        let bytes =
            serde_json::to_vec_pretty(manifest).map_err(|source| ManifestError::Serde {
                path: path.clone(),
                source,
            })?;
        self.store.write_bytes(&path, &bytes)?;

        let pointer = ManifestPointer {
            revision: manifest.revision,
            manifest_path: path.clone(),
            hash: hash.clone(),
            updated_at: self.clock.now(),
        };
        let pointer_path = ctx.current_pointer();
        let pointer_bytes =
            serde_json::to_vec_pretty(&pointer).map_err(|source| ManifestError::Serde {
                path: pointer_path.clone(),
                source,
            })?;
        self.store.write_bytes(&pointer_path, &pointer_bytes)?;
        info!(
            target: "tp.manifest",
            movie,
            revision = %manifest.revision,
            hash = %hash,
            "manifest pointer moved"
        );
        Ok(WrittenManifest { path, hash })
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ManifestError> {
        let bytes = self.store.read_to_bytes(path)?;
        serde_json::from_slice(&bytes).map_err(|source| ManifestError::Serde {
            path: path.to_string(),
            source,
        })
    }
}

/// Canonical hash of a manifest document.
pub fn manifest_hash(manifest: &Manifest) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(manifest)?;
    Ok(tp_hash::hash_payload(&value).hash)
}

// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Blueprint document model and the loaded blueprint tree.
pub mod blueprint;
/// Clock abstraction for deterministic timestamps.
pub mod clock;
/// Input and artefact events, blob references, statuses.
pub mod event;
/// Canonical graph types produced by the blueprint compiler.
pub mod graph;
/// Canonical id newtypes and dimension-index helpers.
pub mod ids;
/// Job descriptors, the producer graph, and execution plans.
pub mod job;
/// Manifest snapshot, entries, and the current-revision pointer.
pub mod manifest;
/// The producer invocation ABI the runner calls.
pub mod produce;
/// Ordered per-movie revision identifiers (`rev-NNNN`).
pub mod revision;

pub use blueprint::{
    ArtifactDecl, BlueprintDoc, BlueprintMeta, BlueprintTreeNode, DimensionDecl, EdgeDecl,
    InputDecl, ProducerDecl, ProducerVariant, SubBlueprintRef,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use event::{
    ArtifactEvent, ArtifactOutput, ArtifactStatus, BlobRef, EditedBy, InputEvent, WORKSPACE_EDIT,
};
pub use graph::{CanonicalEdge, CanonicalGraph, CanonicalNode, DimBinding, NodeKind, ProducerSpec};
pub use ids::{ArtifactId, DimIndex, InputId, ProducerId, dotted};
pub use job::{
    ExecutionPlan, FanInDescriptor, FanInMember, JobContext, JobDescriptor, ProducerGraph,
};
pub use manifest::{Manifest, ManifestArtifactEntry, ManifestInputEntry, ManifestPointer};
pub use produce::{
    ProduceRequest, ProduceResponse, ProduceStatus, ProducedArtefact, ProducedPayload,
};
pub use revision::{Revision, RevisionParseError};

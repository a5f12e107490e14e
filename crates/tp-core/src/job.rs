// SPDX-License-Identifier: MIT OR Apache-2.0
//! Job descriptors, the producer graph, and execution plans.

use crate::ids::{ArtifactId, ProducerId};
use crate::revision::Revision;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One member of a fan-in: an upstream artefact instance plus its place in
/// the aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FanInMember {
    /// Artefact instance id.
    pub id: ArtifactId,
    /// Outer grouping index (first dimension; 0 for scalar members).
    pub group: usize,
    /// Position within the flattened, index-ordered member list.
    pub order: usize,
}

/// All members aggregated into one logical input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FanInDescriptor {
    /// Members in index order.
    pub members: Vec<FanInMember>,
}

/// Per-job context handed to the producer runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct JobContext {
    /// Formal parameter alias → canonical instance id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub input_bindings: BTreeMap<String, String>,
    /// Aggregated inputs, keyed by alias.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fan_in: BTreeMap<String, FanInDescriptor>,
    /// The instance's dimension indices, keyed by symbol.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub indices: BTreeMap<String, usize>,
    /// Free-form extension slot. The runner populates
    /// `extras.resolved_inputs` (canonical id → hydrated payload) before
    /// each `produce` call.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extras: BTreeMap<String, Value>,
}

/// One schedulable unit: a producer instance with resolved bindings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobDescriptor {
    /// Stable, unique job id: the producer instance id.
    pub job_id: ProducerId,
    /// Declared producer name.
    pub producer: String,
    /// Canonical ids of required inputs: `Input:` ids and indexed
    /// `Artifact:` ids. Fan-ins appear as the single logical input; the
    /// members live in `context.fan_in`.
    pub inputs: Vec<String>,
    /// Artefact instance ids the job will emit.
    pub produces: Vec<ArtifactId>,
    /// Resolved provider name.
    pub provider: String,
    /// Resolved provider model.
    pub provider_model: String,
    /// Rate-limit bucket key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_key: Option<String>,
    /// Bindings, fan-ins, indices, extras.
    #[serde(default)]
    pub context: JobContext,
}

impl JobDescriptor {
    /// All artefact ids this job depends on: direct artefact inputs plus
    /// every fan-in member.
    #[must_use]
    pub fn artefact_dependencies(&self) -> Vec<ArtifactId> {
        let mut deps: Vec<ArtifactId> = self
            .inputs
            .iter()
            .filter(|raw| crate::ids::is_artifact_id(raw))
            .map(|raw| ArtifactId::new(raw.clone()))
            .collect();
        for fan in self.context.fan_in.values() {
            deps.extend(fan.members.iter().map(|m| m.id.clone()));
        }
        deps.sort();
        deps.dedup();
        deps
    }

    /// All input ids this job depends on.
    #[must_use]
    pub fn input_dependencies(&self) -> Vec<String> {
        self.inputs
            .iter()
            .filter(|raw| crate::ids::is_input_id(raw))
            .cloned()
            .collect()
    }
}

/// The projected job DAG: one node per producer instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct ProducerGraph {
    /// Arena of jobs; edges refer to indices here.
    pub jobs: Vec<JobDescriptor>,
    /// Data-flow edges `(from_job, to_job)`.
    pub edges: Vec<(usize, usize)>,
}

impl ProducerGraph {
    /// Find a job index by id.
    #[must_use]
    pub fn job_index(&self, id: &ProducerId) -> Option<usize> {
        self.jobs.iter().position(|j| &j.job_id == id)
    }
}

/// A layered execution plan for one target revision.
///
/// Layers are a stable topological stratification: a job appears in the
/// earliest layer in which all its dependencies are in strictly earlier
/// layers. Jobs within a layer are ordered by `job_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExecutionPlan {
    /// Target revision the plan will materialize.
    pub revision: Revision,
    /// Canonical hash of the base manifest the plan was diffed against.
    pub manifest_base_hash: String,
    /// Topologically stratified job layers.
    pub layers: Vec<Vec<JobDescriptor>>,
    /// When the plan was emitted.
    pub created_at: DateTime<Utc>,
}

impl ExecutionPlan {
    /// Total number of jobs across all layers.
    #[must_use]
    pub fn job_count(&self) -> usize {
        self.layers.iter().map(Vec::len).sum()
    }

    /// `true` when the plan has no work.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

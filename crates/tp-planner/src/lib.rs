// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;
use tp_core::{
    ArtifactEvent, ArtifactId, ArtifactOutput, ArtifactStatus, Clock, EditedBy, ExecutionPlan,
    InputEvent, InputId, Manifest, ProducerGraph, Revision, WORKSPACE_EDIT,
};
use tp_events::{EventLog, EventLogError};
use tp_store::{BlobStore, LockError, LockManager, StorageContext, StoreError};
use tracing::{debug, info, warn};

/// Errors from plan generation.
#[derive(Debug, Error)]
pub enum PlannerError {
    /// Another planner holds the movie's lock.
    #[error(transparent)]
    Locked(#[from] LockError),

    /// The producer graph contains a cycle among dirty jobs.
    #[error("cycle in producer graph: {}", cycle.join(" -> "))]
    Cycle {
        /// An example cycle, as job ids, first repeated at the end.
        cycle: Vec<String>,
    },

    /// Event log failure.
    #[error(transparent)]
    Events(#[from] EventLogError),

    /// Blob store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A plan file failed to serialize.
    #[error("plan serialization failed")]
    Serialize(#[source] serde_json::Error),

    /// The `inputs.yaml` materialization failed to serialize.
    #[error("inputs materialization failed")]
    InputsYaml(#[source] serde_yml::Error),
}

impl PlannerError {
    /// The taxonomy code for this error.
    #[must_use]
    pub fn error_code(&self) -> tp_error::ErrorCode {
        match self {
            Self::Locked(_) => tp_error::ErrorCode::Concurrency,
            Self::Cycle { .. } => tp_error::ErrorCode::Cycle,
            Self::Events(EventLogError::Corrupt { .. }) => tp_error::ErrorCode::EventLogCorrupt,
            _ => tp_error::ErrorCode::UserInput,
        }
    }
}

/// A hand-edited artefact injected ahead of planning.
#[derive(Debug, Clone)]
pub struct ArtifactDraft {
    /// Artefact instance the draft replaces.
    pub artefact_id: ArtifactId,
    /// The edited payload.
    pub payload: Value,
}

/// Inputs to [`Planner::generate_plan`].
pub struct PlanRequest<'a> {
    /// Movie to plan.
    pub movie: &'a str,
    /// Current manifest, when one exists.
    pub manifest: Option<&'a Manifest>,
    /// Canonical hash of the current manifest.
    pub manifest_hash: Option<&'a str>,
    /// The projected job DAG.
    pub producer_graph: &'a ProducerGraph,
    /// Effective input values (normalized, defaults seeded), keyed by
    /// source id.
    pub input_values: &'a BTreeMap<String, Value>,
    /// Hand-edited artefact drafts to record at the target revision.
    pub artefact_drafts: Vec<ArtifactDraft>,
}

/// Result of plan generation.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    /// The emitted plan (possibly empty).
    pub plan: ExecutionPlan,
    /// Input ids whose values changed relative to the manifest.
    pub changed_inputs: Vec<InputId>,
    /// Logical path the plan was persisted at.
    pub plan_path: String,
}

/// The incremental planner.
pub struct Planner {
    store: Arc<dyn BlobStore>,
    events: Arc<dyn EventLog>,
    locks: Arc<dyn LockManager>,
    clock: Arc<dyn Clock>,
}

impl Planner {
    /// Create a planner over the given backends.
    pub fn new(
        store: Arc<dyn BlobStore>,
        events: Arc<dyn EventLog>,
        locks: Arc<dyn LockManager>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            events,
            locks,
            clock,
        }
    }

    /// Diff, propagate, stratify, persist.
    ///
    /// Holds the movie's advisory lock for the whole call; a concurrent
    /// planner on the same movie fails with the `Concurrency` kind.
    pub fn generate_plan(&self, req: PlanRequest<'_>) -> Result<PlanOutcome, PlannerError> {
        let _guard = self.locks.acquire(req.movie)?;
        let ctx = StorageContext::new(req.movie);

        // 1. Effective input state and the changed set.
        let changed_inputs = self.changed_inputs(&req);

        // 2-3. Dirty seed and propagation to a fixed point.
        let dirty_jobs = dirty_jobs(req.producer_graph, req.manifest, &changed_inputs);

        // 4-5. Stratify (and detect cycles) over the dirty subgraph.
        let layers = stratify(req.producer_graph, &dirty_jobs)?;

        // 6-7. Pick a free target revision and persist the plan.
        let base_revision = req.manifest.map_or(Revision::ZERO, |m| m.revision);
        let mut target = base_revision.next();
        while self.store.file_exists(&ctx.plan_path(target))? {
            target = target.next();
        }

        let plan = ExecutionPlan {
            revision: target,
            manifest_base_hash: req.manifest_hash.unwrap_or_default().to_string(),
            layers,
            created_at: self.clock.now(),
        };
        let plan_path = ctx.plan_path(target);
        let plan_bytes = serde_json::to_vec_pretty(&plan).map_err(PlannerError::Serialize)?;
        self.store.write_bytes(&plan_path, &plan_bytes)?;

        // Record the input edits that led to this plan.
        for id in &changed_inputs {
            let payload = req
                .input_values
                .get(id.as_str())
                .cloned()
                .unwrap_or(Value::Null);
            self.events.append_input(
                req.movie,
                &InputEvent {
                    id: id.clone(),
                    revision: target,
                    hash: tp_events::hash_input_payload(&payload),
                    payload,
                    edited_by: EditedBy::User,
                    created_at: self.clock.now(),
                },
            )?;
        }

        // Hand-edited drafts land at the target revision and win over
        // whatever the run produces for the same id.
        for draft in &req.artefact_drafts {
            warn!(
                target: "tp.planner",
                movie = req.movie,
                artefact = %draft.artefact_id,
                "recording workspace-edited artefact draft"
            );
            self.events.append_artefact(
                req.movie,
                &ArtifactEvent {
                    artefact_id: draft.artefact_id.clone(),
                    revision: target,
                    inputs_hash: tp_hash::hash_inputs::<&str>(&[]),
                    output: Some(ArtifactOutput::Inline(draft.payload.clone())),
                    status: ArtifactStatus::Succeeded,
                    produced_by: WORKSPACE_EDIT.to_string(),
                    diagnostics: None,
                    created_at: self.clock.now(),
                },
            )?;
        }

        self.write_inputs_yaml(&ctx, req.input_values)?;

        info!(
            target: "tp.planner",
            movie = req.movie,
            revision = %target,
            layers = plan.layers.len(),
            jobs = plan.job_count(),
            changed = changed_inputs.len(),
            "plan emitted"
        );
        Ok(PlanOutcome {
            plan,
            changed_inputs,
            plan_path,
        })
    }

    fn changed_inputs(&self, req: &PlanRequest<'_>) -> Vec<InputId> {
        let mut changed = Vec::new();
        for (key, value) in req.input_values {
            if !tp_core::ids::is_input_id(key) {
                continue;
            }
            let id = InputId::new(key.clone());
            let new_hash = tp_events::hash_input_payload(value);
            let unchanged = req
                .manifest
                .and_then(|m| m.inputs.get(&id))
                .is_some_and(|entry| entry.hash == new_hash);
            if !unchanged {
                changed.push(id);
            }
        }
        changed
    }

    fn write_inputs_yaml(
        &self,
        ctx: &StorageContext,
        values: &BTreeMap<String, Value>,
    ) -> Result<(), PlannerError> {
        let yaml = serde_yml::to_string(values).map_err(PlannerError::InputsYaml)?;
        self.store.write_bytes(&ctx.inputs_yaml(), yaml.as_bytes())?;
        Ok(())
    }
}

/// Compute the set of dirty job indices: seeded from changed inputs and
/// never-succeeded artefacts, propagated forward to a fixed point.
///
/// A job is dirty iff any declared input (input id, artefact id, or fan-in
/// member) is dirty, or any artefact it produces is dirty. The second arm
/// is what re-runs a job whose product is missing even though its own
/// inputs did not change (e.g. a raised segment count).
fn dirty_jobs(
    graph: &ProducerGraph,
    manifest: Option<&Manifest>,
    changed_inputs: &[InputId],
) -> BTreeSet<usize> {
    let mut dirty_ids: BTreeSet<String> =
        changed_inputs.iter().map(|id| id.to_string()).collect();
    for job in &graph.jobs {
        for artefact in &job.produces {
            let succeeded = manifest.is_some_and(|m| m.has_succeeded(artefact));
            if !succeeded {
                dirty_ids.insert(artefact.to_string());
            }
        }
    }

    let mut dirty: BTreeSet<usize> = BTreeSet::new();
    loop {
        let mut grew = false;
        for (idx, job) in graph.jobs.iter().enumerate() {
            if dirty.contains(&idx) {
                continue;
            }
            let depends_dirty = job.inputs.iter().any(|i| dirty_ids.contains(i))
                || job
                    .context
                    .fan_in
                    .values()
                    .flat_map(|f| &f.members)
                    .any(|m| dirty_ids.contains(m.id.as_str()))
                || job.produces.iter().any(|p| dirty_ids.contains(p.as_str()));
            if depends_dirty {
                dirty.insert(idx);
                for artefact in &job.produces {
                    dirty_ids.insert(artefact.to_string());
                }
                grew = true;
            }
        }
        if !grew {
            break;
        }
    }
    debug!(target: "tp.planner", dirty = dirty.len(), "dirty set computed");
    dirty
}

/// Kahn stratification of the dirty subgraph. Jobs within a layer sort by
/// job id; a cycle fails with an example path.
fn stratify(
    graph: &ProducerGraph,
    dirty: &BTreeSet<usize>,
) -> Result<Vec<Vec<tp_core::JobDescriptor>>, PlannerError> {
    let mut indegree: BTreeMap<usize, usize> = dirty.iter().map(|&i| (i, 0)).collect();
    let mut successors: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for &(from, to) in &graph.edges {
        if dirty.contains(&from) && dirty.contains(&to) {
            *indegree.get_mut(&to).expect("dirty node in map") += 1;
            successors.entry(from).or_default().push(to);
        }
    }

    let mut layers = Vec::new();
    let mut current: Vec<usize> = indegree
        .iter()
        .filter(|&(_, &d)| d == 0)
        .map(|(&i, _)| i)
        .collect();
    let mut assigned = 0usize;
    while !current.is_empty() {
        let mut layer: Vec<usize> = current.clone();
        layer.sort_by(|&a, &b| graph.jobs[a].job_id.cmp(&graph.jobs[b].job_id));
        assigned += layer.len();

        let mut next = Vec::new();
        for &idx in &current {
            for &succ in successors.get(&idx).map_or(&[][..], Vec::as_slice) {
                let d = indegree.get_mut(&succ).expect("dirty node in map");
                *d -= 1;
                if *d == 0 {
                    next.push(succ);
                }
            }
        }
        layers.push(layer.into_iter().map(|i| graph.jobs[i].clone()).collect());
        current = next;
    }

    if assigned < dirty.len() {
        let remaining: BTreeSet<usize> = dirty
            .iter()
            .copied()
            .filter(|i| indegree.get(i).is_some_and(|&d| d > 0))
            .collect();
        return Err(PlannerError::Cycle {
            cycle: example_cycle(graph, &remaining),
        });
    }
    Ok(layers)
}

/// Walk successor edges among `remaining` until a node repeats, and return
/// the loop as job ids (first node repeated at the end).
fn example_cycle(graph: &ProducerGraph, remaining: &BTreeSet<usize>) -> Vec<String> {
    let Some(&start) = remaining.iter().next() else {
        return Vec::new();
    };
    let mut path = vec![start];
    let mut cursor = start;
    loop {
        let Some(&(_, next)) = graph
            .edges
            .iter()
            .find(|(from, to)| *from == cursor && remaining.contains(to))
        else {
            break;
        };
        if let Some(pos) = path.iter().position(|&p| p == next) {
            let mut cycle: Vec<String> = path[pos..]
                .iter()
                .map(|&i| graph.jobs[i].job_id.to_string())
                .collect();
            cycle.push(graph.jobs[next].job_id.to_string());
            return cycle;
        }
        path.push(next);
        cursor = next;
    }
    path.iter()
        .map(|&i| graph.jobs[i].job_id.to_string())
        .collect()
}

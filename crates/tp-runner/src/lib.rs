// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Cancellation primitives.
pub mod cancel;
/// Producer dispatch registry.
pub mod registry;
/// Retry policy for transient producer failures.
pub mod retry;

pub use cancel::CancellationToken;
pub use registry::{ANY, EchoProducer, Producer, ProducerRegistry};
pub use retry::RetryPolicy;

use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tp_core::{
    ArtifactEvent, ArtifactId, ArtifactOutput, ArtifactStatus, BlobRef, Clock, ExecutionPlan,
    JobDescriptor, Manifest, ProduceRequest, ProduceStatus, ProducedPayload, ProducerId, Revision,
};
use tp_events::EventLog;
use tp_manifest::{BuildArgs, ManifestError, ManifestService};
use tp_resolver::{ResolveRequest, resolve_artifacts};
use tp_store::{BlobStore, StorageContext};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Public surface
// ---------------------------------------------------------------------------

/// Errors that abort a run before any job is dispatched.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The configured concurrency is zero.
    #[error("concurrency must be a positive integer")]
    InvalidConcurrency,
}

/// Everything a run needs: storage, events, producers, identity.
pub struct RunnerContext {
    /// Movie being executed.
    pub movie: String,
    /// Blob store for binary artefact payloads.
    pub store: Arc<dyn BlobStore>,
    /// Event log the run records into.
    pub events: Arc<dyn EventLog>,
    /// Producer dispatch registry.
    pub registry: Arc<ProducerRegistry>,
    /// Timestamp source.
    pub clock: Arc<dyn Clock>,
    /// Environment tag for producer dispatch.
    pub environment: Option<String>,
    /// Manifest the plan was diffed against, when one exists.
    pub base_manifest: Option<Manifest>,
}

/// Execution knobs.
#[derive(Clone)]
pub struct RunOptions {
    /// Maximum producer invocations in flight within a layer.
    pub concurrency: usize,
    /// Stop after this layer (inclusive).
    pub up_to_layer: Option<usize>,
    /// Cooperative cancellation token.
    pub cancel: CancellationToken,
    /// Retry policy for transient failures.
    pub retry: RetryPolicy,
    /// Per-job soft deadline; `None` is unbounded.
    pub job_timeout: Option<Duration>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            up_to_layer: None,
            cancel: CancellationToken::new(),
            retry: RetryPolicy::default(),
            job_timeout: None,
        }
    }
}

/// Overall outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every job reached a terminal success (or skip-free) state.
    Succeeded,
    /// At least one job failed, or the run was cancelled.
    Failed,
}

/// Terminal state of one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// The producer succeeded within the attempt budget.
    Succeeded,
    /// The producer failed at its last attempt (or never started).
    Failed,
    /// An upstream artefact was unavailable; the producer was not invoked.
    Skipped,
}

/// Per-job record in the run result.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    /// The job's id.
    pub job_id: ProducerId,
    /// Layer the job was scheduled in.
    pub layer_index: usize,
    /// Attempts actually made (0 for skipped jobs).
    pub attempts: u32,
    /// Terminal state.
    pub state: JobState,
    /// Last diagnostics recorded for the job, if any.
    pub diagnostics: Option<Value>,
}

/// Result of executing a plan.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Unique id of this run.
    pub run_id: Uuid,
    /// Movie the run belongs to.
    pub movie: String,
    /// Revision the run materialized.
    pub revision: Revision,
    /// Revision of the base manifest the plan was diffed against.
    pub base_revision: Revision,
    /// Overall status.
    pub status: RunStatus,
    /// Per-job outcomes, in completion order.
    pub outcomes: Vec<JobOutcome>,
    /// `true` when the run ended due to cancellation.
    pub cancelled: bool,
}

impl RunResult {
    /// Fold the run's events into a manifest at the plan revision, using
    /// the base manifest as the starting point.
    pub fn build_manifest(
        &self,
        service: &ManifestService,
        events: &dyn EventLog,
    ) -> Result<Manifest, ManifestError> {
        service.build_from_events(BuildArgs {
            movie: &self.movie,
            target_revision: self.revision,
            base_revision: (!self.base_revision.is_zero()).then_some(self.base_revision),
            event_log: events,
        })
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Execute a plan: layers sequentially, jobs within a layer concurrently
/// up to the configured limit.
///
/// Layer `k`'s artefact events are durable before any layer `k+1`
/// producer is invoked (the join barrier between layers guarantees it).
/// Event order within the log matches completion order, not dispatch.
pub async fn execute(
    plan: &ExecutionPlan,
    ctx: &RunnerContext,
    opts: &RunOptions,
) -> Result<RunResult, RunnerError> {
    if opts.concurrency == 0 {
        return Err(RunnerError::InvalidConcurrency);
    }
    let run_id = Uuid::new_v4();
    let base_revision = ctx
        .base_manifest
        .as_ref()
        .map_or(Revision::ZERO, |m| m.revision);
    let env = Arc::new(JobEnv {
        movie: ctx.movie.clone(),
        store: Arc::clone(&ctx.store),
        events: Arc::clone(&ctx.events),
        registry: Arc::clone(&ctx.registry),
        clock: Arc::clone(&ctx.clock),
        environment: ctx.environment.clone(),
        revision: plan.revision,
        retry: opts.retry.clone(),
        job_timeout: opts.job_timeout,
        cancel: opts.cancel.clone(),
        semaphore: Semaphore::new(opts.concurrency),
        unavailable: Mutex::new(BTreeSet::new()),
    });

    info!(
        target: "tp.runner",
        movie = %ctx.movie,
        revision = %plan.revision,
        run_id = %run_id,
        layers = plan.layers.len(),
        concurrency = opts.concurrency,
        "run started"
    );

    let mut outcomes: Vec<JobOutcome> = Vec::new();
    let mut cancelled = false;
    let mut task_panicked = false;

    for (layer_index, layer) in plan.layers.iter().enumerate() {
        if opts.up_to_layer.is_some_and(|limit| layer_index > limit) {
            debug!(target: "tp.runner", layer_index, "stopping at layer limit");
            break;
        }
        if env.cancel.is_cancelled() {
            cancelled = true;
            break;
        }

        let mut set: JoinSet<JobOutcome> = JoinSet::new();
        for job in layer {
            if env.cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let blocked = env.blocked_dependencies(job);
            if !blocked.is_empty() {
                outcomes.push(env.record_skip(job, layer_index, &blocked));
                continue;
            }
            let env = Arc::clone(&env);
            let job = job.clone();
            set.spawn(async move { run_job(env, job, layer_index).await });
        }

        // Layer barrier: in-flight jobs finish even when cancelled.
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(join_err) => {
                    error!(target: "tp.runner", %join_err, "job task aborted");
                    task_panicked = true;
                }
            }
        }
        if cancelled {
            break;
        }
    }

    let failed_any = cancelled
        || task_panicked
        || outcomes.iter().any(|o| o.state == JobState::Failed);
    let status = if failed_any {
        RunStatus::Failed
    } else {
        RunStatus::Succeeded
    };
    if cancelled {
        warn!(target: "tp.runner", movie = %ctx.movie, "run cancelled");
    }
    info!(
        target: "tp.runner",
        movie = %ctx.movie,
        revision = %plan.revision,
        jobs = outcomes.len(),
        status = ?status,
        "run finished"
    );
    Ok(RunResult {
        run_id,
        movie: ctx.movie.clone(),
        revision: plan.revision,
        base_revision,
        status,
        outcomes,
        cancelled,
    })
}

// ---------------------------------------------------------------------------
// Per-job execution
// ---------------------------------------------------------------------------

struct JobEnv {
    movie: String,
    store: Arc<dyn BlobStore>,
    events: Arc<dyn EventLog>,
    registry: Arc<ProducerRegistry>,
    clock: Arc<dyn Clock>,
    environment: Option<String>,
    revision: Revision,
    retry: RetryPolicy,
    job_timeout: Option<Duration>,
    cancel: CancellationToken,
    semaphore: Semaphore,
    unavailable: Mutex<BTreeSet<String>>,
}

impl JobEnv {
    fn blocked_dependencies(&self, job: &JobDescriptor) -> Vec<String> {
        let unavailable = self.unavailable.lock().expect("unavailable set poisoned");
        job.artefact_dependencies()
            .into_iter()
            .map(String::from)
            .filter(|dep| unavailable.contains(dep))
            .collect()
    }

    fn mark_unavailable(&self, ids: impl IntoIterator<Item = ArtifactId>) {
        let mut unavailable = self.unavailable.lock().expect("unavailable set poisoned");
        unavailable.extend(ids.into_iter().map(String::from));
    }

    /// Latest value of each declared input at or before the run's
    /// revision, read from the input event log.
    fn input_values(&self, job: &JobDescriptor) -> BTreeMap<String, Value> {
        let wanted: BTreeSet<String> = job.input_dependencies().into_iter().collect();
        let mut values: BTreeMap<String, Value> = BTreeMap::new();
        let Ok(stream) = self.events.stream_inputs(&self.movie, None) else {
            return values;
        };
        for event in stream.flatten() {
            if event.revision > self.revision {
                continue;
            }
            if wanted.contains(event.id.as_str()) {
                values.insert(event.id.to_string(), event.payload);
            }
        }
        values
    }

    fn inputs_hash(&self, job: &JobDescriptor) -> String {
        let mut ids: Vec<String> = job.inputs.clone();
        ids.extend(
            job.artefact_dependencies()
                .into_iter()
                .map(String::from),
        );
        tp_hash::hash_inputs(&ids)
    }

    /// Append one artefact event, logging (rather than propagating) append
    /// failures so a broken log never strands an in-flight run.
    fn append(&self, event: &ArtifactEvent) {
        if let Err(e) = self.events.append_artefact(&self.movie, event) {
            error!(target: "tp.runner", error = %e, artefact = %event.artefact_id, "event append failed");
        }
    }

    fn record_status(
        &self,
        job: &JobDescriptor,
        inputs_hash: &str,
        status: ArtifactStatus,
        diagnostics: Option<Value>,
    ) {
        for artefact in &job.produces {
            self.append(&ArtifactEvent {
                artefact_id: artefact.clone(),
                revision: self.revision,
                inputs_hash: inputs_hash.to_string(),
                output: None,
                status,
                produced_by: job.producer.clone(),
                diagnostics: diagnostics.clone(),
                created_at: self.clock.now(),
            });
        }
    }

    fn record_skip(
        &self,
        job: &JobDescriptor,
        layer_index: usize,
        blocked: &[String],
    ) -> JobOutcome {
        let diagnostics = json!({
            "message": "upstream artefacts unavailable",
            "missing": blocked,
        });
        warn!(
            target: "tp.runner",
            job = %job.job_id,
            layer_index,
            missing = blocked.len(),
            "job skipped"
        );
        let inputs_hash = self.inputs_hash(job);
        self.record_status(job, &inputs_hash, ArtifactStatus::Skipped, Some(diagnostics.clone()));
        self.mark_unavailable(job.produces.iter().cloned());
        JobOutcome {
            job_id: job.job_id.clone(),
            layer_index,
            attempts: 0,
            state: JobState::Skipped,
            diagnostics: Some(diagnostics),
        }
    }

    /// Record a succeeded response's artefacts, writing binary payloads to
    /// the blob store first. Returns the ids that did not succeed.
    fn record_success(
        &self,
        job: &JobDescriptor,
        inputs_hash: &str,
        response: &tp_core::ProduceResponse,
    ) -> Vec<ArtifactId> {
        let ctx = StorageContext::new(&self.movie);
        let mut failed: Vec<ArtifactId> = Vec::new();
        let mut emitted: BTreeSet<String> = BTreeSet::new();

        for artefact in &response.artefacts {
            emitted.insert(artefact.artefact_id.to_string());
            let status = match artefact.status.unwrap_or(ProduceStatus::Succeeded) {
                ProduceStatus::Succeeded => ArtifactStatus::Succeeded,
                ProduceStatus::Failed => ArtifactStatus::Failed,
                ProduceStatus::Skipped => ArtifactStatus::Skipped,
            };
            let output = if status == ArtifactStatus::Succeeded {
                match &artefact.payload {
                    Some(ProducedPayload::Inline(value)) => {
                        Some(ArtifactOutput::Inline(value.clone()))
                    }
                    Some(ProducedPayload::Blob { bytes, mime_type }) => {
                        let hash = tp_hash::hash_bytes(bytes);
                        let path = ctx.blob_path(&hash, mime_type);
                        match self.store.write_bytes(&path, bytes) {
                            Ok(()) => Some(ArtifactOutput::Blob(BlobRef {
                                hash,
                                size: bytes.len() as u64,
                                mime_type: mime_type.clone(),
                            })),
                            Err(e) => {
                                error!(target: "tp.runner", error = %e, path, "blob write failed");
                                failed.push(artefact.artefact_id.clone());
                                continue;
                            }
                        }
                    }
                    None => None,
                }
            } else {
                failed.push(artefact.artefact_id.clone());
                None
            };
            self.append(&ArtifactEvent {
                artefact_id: artefact.artefact_id.clone(),
                revision: self.revision,
                inputs_hash: inputs_hash.to_string(),
                output,
                status,
                produced_by: job.producer.clone(),
                diagnostics: artefact.diagnostics.clone(),
                created_at: self.clock.now(),
            });
        }

        // Declared artefacts the producer never mentioned are failures;
        // the manifest must not silently claim them.
        for declared in &job.produces {
            if !emitted.contains(declared.as_str()) {
                self.append(&ArtifactEvent {
                    artefact_id: declared.clone(),
                    revision: self.revision,
                    inputs_hash: inputs_hash.to_string(),
                    output: None,
                    status: ArtifactStatus::Failed,
                    produced_by: job.producer.clone(),
                    diagnostics: Some(json!({
                        "message": "producer did not emit declared artefact",
                    })),
                    created_at: self.clock.now(),
                });
                failed.push(declared.clone());
            }
        }
        failed
    }
}

async fn run_job(env: Arc<JobEnv>, mut job: JobDescriptor, layer_index: usize) -> JobOutcome {
    let _permit = env
        .semaphore
        .acquire()
        .await
        .expect("runner semaphore closed");
    let inputs_hash = env.inputs_hash(&job);

    // Hydrate upstream payloads into the job context before dispatch:
    // input values from the input log, artefact payloads via the
    // resolver.
    let deps: Vec<ArtifactId> = job.artefact_dependencies();
    match resolve_artifacts(ResolveRequest {
        movie: &env.movie,
        artifact_ids: &deps,
        events: env.events.as_ref(),
        store: env.store.as_ref(),
    }) {
        Ok(resolved) => {
            let mut map = resolved.to_json_map();
            map.extend(env.input_values(&job));
            job.context.extras.insert(
                "resolved_inputs".to_string(),
                Value::Object(map.into_iter().collect()),
            );
        }
        Err(e) => {
            let diagnostics = json!({
                "name": "ResolverError",
                "message": e.to_string(),
                "code": e.error_code().as_str(),
            });
            env.record_status(&job, &inputs_hash, ArtifactStatus::Failed, Some(diagnostics.clone()));
            env.mark_unavailable(job.produces.iter().cloned());
            return JobOutcome {
                job_id: job.job_id.clone(),
                layer_index,
                attempts: 1,
                state: JobState::Failed,
                diagnostics: Some(diagnostics),
            };
        }
    }

    let Some(producer) =
        env.registry
            .get(&job.provider, &job.provider_model, env.environment.as_deref())
    else {
        let diagnostics = json!({
            "message": "no producer registered",
            "provider": job.provider,
            "model": job.provider_model,
        });
        env.record_status(&job, &inputs_hash, ArtifactStatus::Failed, Some(diagnostics.clone()));
        env.mark_unavailable(job.produces.iter().cloned());
        return JobOutcome {
            job_id: job.job_id.clone(),
            layer_index,
            attempts: 0,
            state: JobState::Failed,
            diagnostics: Some(diagnostics),
        };
    };

    let mut attempts = 0u32;
    let mut last_diagnostics: Option<Value> = None;
    let state = loop {
        attempts += 1;
        if env.cancel.is_cancelled() {
            let diagnostics = json!({"message": "run cancelled", "cancelled": true});
            env.record_status(&job, &inputs_hash, ArtifactStatus::Failed, Some(diagnostics.clone()));
            last_diagnostics = Some(diagnostics);
            break JobState::Failed;
        }

        debug!(
            target: "tp.runner",
            job = %job.job_id,
            layer_index,
            attempt = attempts,
            "dispatching producer"
        );
        let request = ProduceRequest {
            movie: env.movie.clone(),
            job: job.clone(),
            layer_index,
            attempt: attempts,
            revision: env.revision,
        };
        let invocation = producer.produce(request);
        let result = match env.job_timeout {
            Some(limit) => match tokio::time::timeout(limit, invocation).await {
                Ok(inner) => inner,
                Err(_) => Err(anyhow::anyhow!("produce timed out after {limit:?}")),
            },
            None => invocation.await,
        };

        match result {
            Ok(response) => match response.normalized_status() {
                ProduceStatus::Succeeded => {
                    let failed = env.record_success(&job, &inputs_hash, &response);
                    env.mark_unavailable(failed);
                    last_diagnostics = response.diagnostics.clone();
                    break JobState::Succeeded;
                }
                ProduceStatus::Failed => {
                    // Producer-reported failure is permanent.
                    let diagnostics = response
                        .diagnostics
                        .clone()
                        .unwrap_or_else(|| json!({"message": "producer reported failure"}));
                    env.record_status(
                        &job,
                        &inputs_hash,
                        ArtifactStatus::Failed,
                        Some(diagnostics.clone()),
                    );
                    last_diagnostics = Some(diagnostics);
                    break JobState::Failed;
                }
                ProduceStatus::Skipped => {
                    let diagnostics = response.diagnostics.clone();
                    env.record_status(&job, &inputs_hash, ArtifactStatus::Skipped, diagnostics.clone());
                    last_diagnostics = diagnostics;
                    break JobState::Skipped;
                }
            },
            Err(e) => {
                let diagnostics = json!({
                    "name": "ProduceError",
                    "message": e.to_string(),
                });
                env.record_status(
                    &job,
                    &inputs_hash,
                    ArtifactStatus::Failed,
                    Some(diagnostics.clone()),
                );
                last_diagnostics = Some(diagnostics);
                if attempts >= env.retry.max_attempts {
                    break JobState::Failed;
                }
                let delay = env.retry.delay_for(attempts);
                warn!(
                    target: "tp.runner",
                    job = %job.job_id,
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    "producer failed; retrying"
                );
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = env.cancel.cancelled() => {
                        last_diagnostics = Some(json!({
                            "message": "run cancelled during retry wait",
                            "cancelled": true,
                        }));
                        break JobState::Failed;
                    }
                }
            }
        }
    };

    if state != JobState::Succeeded {
        env.mark_unavailable(job.produces.iter().cloned());
    }
    JobOutcome {
        job_id: job.job_id.clone(),
        layer_index,
        attempts,
        state,
        diagnostics: last_diagnostics,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

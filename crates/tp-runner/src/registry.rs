// SPDX-License-Identifier: MIT OR Apache-2.0
//! Producer dispatch.
//!
//! Producer invocation dispatches on the `(provider, model, environment)`
//! triple. Registrations may wildcard any component with `"*"`; lookup
//! falls back from the most to the least specific key.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tp_core::{ProduceRequest, ProduceResponse, ProducedArtefact};

/// A producer implementation invoked by the runner.
///
/// `produce` is expected to be I/O-bound and may suspend. Returning `Err`
/// counts as a transient failure subject to retry; returning a response
/// with a failed status is permanent.
#[async_trait]
pub trait Producer: Send + Sync {
    /// Produce the artefacts of one job instance.
    async fn produce(&self, request: ProduceRequest) -> anyhow::Result<ProduceResponse>;
}

/// Wildcard component in a registry key.
pub const ANY: &str = "*";

/// A typed registry of [`Producer`]s keyed by provider, model, and
/// environment.
#[derive(Default)]
pub struct ProducerRegistry {
    producers: HashMap<(String, String, String), Arc<dyn Producer>>,
}

impl ProducerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a producer for the triple, replacing any previous entry.
    ///
    /// Any component may be [`ANY`] to match everything.
    pub fn register(
        &mut self,
        provider: impl Into<String>,
        model: impl Into<String>,
        environment: impl Into<String>,
        producer: impl Producer + 'static,
    ) {
        self.producers.insert(
            (provider.into(), model.into(), environment.into()),
            Arc::new(producer),
        );
    }

    /// Look up the most specific registration for the triple.
    ///
    /// Fallback order: exact, any-model, any-environment, any-both,
    /// fully wildcarded.
    #[must_use]
    pub fn get(
        &self,
        provider: &str,
        model: &str,
        environment: Option<&str>,
    ) -> Option<Arc<dyn Producer>> {
        let env = environment.unwrap_or(ANY);
        let candidates = [
            (provider, model, env),
            (provider, ANY, env),
            (provider, model, ANY),
            (provider, ANY, ANY),
            (ANY, ANY, ANY),
        ];
        for (p, m, e) in candidates {
            if let Some(producer) = self
                .producers
                .get(&(p.to_string(), m.to_string(), e.to_string()))
            {
                return Some(Arc::clone(producer));
            }
        }
        None
    }

    /// Number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.producers.len()
    }

    /// `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.producers.is_empty()
    }
}

/// A producer that echoes its resolved inputs as inline artefacts.
///
/// Stands in for real provider adapters in tests and dry-ish runs; every
/// declared artefact succeeds with a payload describing the job.
#[derive(Debug, Clone, Default)]
pub struct EchoProducer;

#[async_trait]
impl Producer for EchoProducer {
    async fn produce(&self, request: ProduceRequest) -> anyhow::Result<ProduceResponse> {
        let artefacts = request
            .job
            .produces
            .iter()
            .map(|id| {
                ProducedArtefact::inline(
                    id.clone(),
                    json!({
                        "producer": request.job.producer,
                        "artefact": id.as_str(),
                        "attempt": request.attempt,
                        "revision": request.revision.to_string(),
                    }),
                )
            })
            .collect();
        Ok(ProduceResponse {
            job_id: request.job.job_id.clone(),
            status: None,
            artefacts,
            diagnostics: None,
        })
    }
}

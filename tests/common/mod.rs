// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared fixtures for the end-to-end suites.
#![allow(dead_code)]

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tp_core::{
    BlueprintDoc, BlueprintTreeNode, FixedClock, InputId, Manifest, ProducerGraph,
};
use tp_events::MemoryEventLog;
use tp_manifest::ManifestService;
use tp_planner::{PlanOutcome, PlanRequest, Planner};
use tp_store::{MemoryBlobStore, MemoryLockManager};

/// The S1 movie: prompt + segment count + language, per-segment scripts,
/// fan-in timeline assembly.
pub const MINIMAL_BLUEPRINT: &str = r#"
[meta]
id = "root"
name = "Minimal movie"

[[inputs]]
name = "InquiryPrompt"
type = "string"
required = true

[[inputs]]
name = "NumOfSegments"
type = "number"
required = true

[[inputs]]
name = "Language"
type = "string"

[[inputs]]
name = "Scripts"
type = "text"
fanIn = true

[[artefacts]]
name = "NarrationScript"
type = "text"
cardinality = "segment"
countInput = "NumOfSegments"

[[artefacts]]
name = "Timeline"
type = "timeline"

[[producers]]
name = "ScriptProducer"
provider = "openai"
model = "gpt-4o"

[[producers]]
name = "TimelineAssembler"
provider = "local"
model = "assembler"

[[edges]]
from = "InquiryPrompt"
to = "ScriptProducer"

[[edges]]
from = "Language"
to = "ScriptProducer"

[[edges]]
from = "ScriptProducer"
to = "NarrationScript[i]"

[[edges]]
from = "NarrationScript[i]"
to = "Scripts"

[[edges]]
from = "Scripts"
to = "TimelineAssembler"

[[edges]]
from = "TimelineAssembler"
to = "Timeline"
"#;

/// The S3 movie: adds a voice track whose producer consumes `VoiceId`
/// but not the narration inputs.
pub const VOICED_BLUEPRINT: &str = r#"
[meta]
id = "root"
name = "Voiced movie"

[[inputs]]
name = "InquiryPrompt"
type = "string"

[[inputs]]
name = "NumOfSegments"
type = "number"

[[inputs]]
name = "VoiceId"
type = "string"

[[inputs]]
name = "Scripts"
type = "text"
fanIn = true

[[artefacts]]
name = "NarrationScript"
type = "text"
cardinality = "segment"
countInput = "NumOfSegments"

[[artefacts]]
name = "AudioTrack"
type = "audio"

[[artefacts]]
name = "Timeline"
type = "timeline"

[[producers]]
name = "ScriptProducer"
provider = "openai"
model = "gpt-4o"

[[producers]]
name = "AudioProducer"
provider = "openai"
model = "tts-1"

[[producers]]
name = "TimelineAssembler"
provider = "local"
model = "assembler"

[[edges]]
from = "InquiryPrompt"
to = "ScriptProducer"

[[edges]]
from = "ScriptProducer"
to = "NarrationScript[i]"

[[edges]]
from = "NarrationScript[i]"
to = "Scripts"

[[edges]]
from = "VoiceId"
to = "AudioProducer"

[[edges]]
from = "AudioProducer"
to = "AudioTrack"

[[edges]]
from = "AudioTrack"
to = "TimelineAssembler"

[[edges]]
from = "Scripts"
to = "TimelineAssembler"

[[edges]]
from = "TimelineAssembler"
to = "Timeline"
"#;

/// A two-producer cycle: each consumes the other's artefact.
pub const CYCLIC_BLUEPRINT: &str = r#"
[meta]
id = "root"
name = "Cyclic"

[[artefacts]]
name = "X"
type = "text"

[[artefacts]]
name = "Y"
type = "text"

[[producers]]
name = "A"
provider = "openai"
model = "gpt-4o"

[[producers]]
name = "B"
provider = "openai"
model = "gpt-4o"

[[edges]]
from = "Y"
to = "A"

[[edges]]
from = "A"
to = "X"

[[edges]]
from = "X"
to = "B"

[[edges]]
from = "B"
to = "Y"
"#;

/// Parse a blueprint document string into a single-node tree.
pub fn tree_from_toml(toml_text: &str) -> BlueprintTreeNode {
    let document: BlueprintDoc = toml::from_str(toml_text).expect("fixture blueprint parses");
    BlueprintTreeNode {
        id: document.meta.id.clone(),
        namespace_path: Vec::new(),
        document,
        children: BTreeMap::new(),
        dimension: None,
    }
}

/// Compile and project a blueprint against input values.
pub fn project(toml_text: &str, values: &BTreeMap<String, Value>) -> ProducerGraph {
    let tree = tree_from_toml(toml_text);
    let graph = tp_blueprint::compile(&tree, None).expect("fixture compiles");
    let source_map = tp_blueprint::input_source_map(&graph).expect("source map");
    let mut values = tp_blueprint::normalize_input_values(values, &source_map);
    tp_blueprint::seed_defaults(&mut values, &graph, &source_map);
    tp_graph::project(tp_graph::ProjectionArgs {
        graph: &graph,
        input_values: &values,
        source_map: &source_map,
    })
    .expect("fixture projects")
}

/// In-memory harness bundling every backend a scenario needs.
pub struct Harness {
    pub store: Arc<MemoryBlobStore>,
    pub events: Arc<MemoryEventLog>,
    pub planner: Planner,
    pub manifests: ManifestService,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryBlobStore::new());
        let events = Arc::new(MemoryEventLog::new());
        let clock = Arc::new(FixedClock::default_epoch());
        let planner = Planner::new(
            store.clone(),
            events.clone(),
            Arc::new(MemoryLockManager::new()),
            clock.clone(),
        );
        let manifests = ManifestService::new(store.clone(), clock);
        Self {
            store,
            events,
            planner,
            manifests,
        }
    }

    /// Plan against the current manifest (if any).
    pub fn plan(
        &self,
        movie: &str,
        graph: &ProducerGraph,
        values: &BTreeMap<String, Value>,
    ) -> PlanOutcome {
        let current = self.manifests.load_current(movie).ok();
        self.planner
            .generate_plan(PlanRequest {
                movie,
                manifest: current.as_ref().map(|(m, _)| m),
                manifest_hash: current.as_ref().map(|(_, h)| h.as_str()),
                producer_graph: graph,
                input_values: values,
                artefact_drafts: Vec::new(),
            })
            .expect("plan generation")
    }

    /// Commit a manifest folded from the current event streams.
    pub fn commit(&self, result: &tp_runner::RunResult) -> Manifest {
        let manifest = result
            .build_manifest(&self.manifests, self.events.as_ref())
            .expect("manifest fold");
        self.manifests
            .write_current(&result.movie, &manifest)
            .expect("manifest write");
        manifest
    }
}

/// Canonical-id-keyed value map literal.
pub fn values(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (format!("Input:{k}"), v.clone()))
        .collect()
}

/// Shorthand for the id of an input.
pub fn input_id(name: &str) -> InputId {
    InputId::new(name)
}

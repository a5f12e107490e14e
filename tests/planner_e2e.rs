// SPDX-License-Identifier: MIT OR Apache-2.0
//! Planner end-to-end scenarios: first run, incremental edits, unrelated
//! edits, cycle rejection.

mod common;

use common::{CYCLIC_BLUEPRINT, Harness, MINIMAL_BLUEPRINT, VOICED_BLUEPRINT, project, values};
use serde_json::json;
use std::sync::Arc;
use tp_core::{ArtifactId, Revision};
use tp_planner::PlannerError;
use tp_runner::{ANY, EchoProducer, ProducerRegistry, RunOptions, RunnerContext, execute};

fn echo_context(harness: &Harness, movie: &str, base: Option<tp_core::Manifest>) -> RunnerContext {
    let mut registry = ProducerRegistry::new();
    registry.register(ANY, ANY, ANY, EchoProducer);
    RunnerContext {
        movie: movie.into(),
        store: harness.store.clone(),
        events: harness.events.clone(),
        registry: Arc::new(registry),
        clock: Arc::new(tp_core::FixedClock::default_epoch()),
        environment: None,
        base_manifest: base,
    }
}

/// S1: first run of the minimal blueprint.
#[tokio::test]
async fn s1_first_run_plans_two_layers_and_materializes_three_artefacts() {
    let harness = Harness::new();
    let inputs = values(&[
        ("InquiryPrompt", json!("Tell me about Darwin and Galapagos")),
        ("NumOfSegments", json!(2)),
        ("Language", json!("en")),
    ]);
    let graph = project(MINIMAL_BLUEPRINT, &inputs);

    let outcome = harness.plan("darwin", &graph, &inputs);
    assert_eq!(outcome.plan.revision, Revision::new(1));
    assert_eq!(outcome.plan.layers.len(), 2);
    let layer0: Vec<&str> = outcome.plan.layers[0]
        .iter()
        .map(|j| j.job_id.as_str())
        .collect();
    assert_eq!(
        layer0,
        vec![
            "Producer:ScriptProducer[i=0]",
            "Producer:ScriptProducer[i=1]",
        ]
    );
    let layer1: Vec<&str> = outcome.plan.layers[1]
        .iter()
        .map(|j| j.job_id.as_str())
        .collect();
    assert_eq!(layer1, vec!["Producer:TimelineAssembler"]);

    let ctx = echo_context(&harness, "darwin", None);
    let result = execute(&outcome.plan, &ctx, &RunOptions::default())
        .await
        .unwrap();
    assert_eq!(result.status, tp_runner::RunStatus::Succeeded);

    let manifest = harness.commit(&result);
    assert_eq!(manifest.revision, Revision::new(1));
    assert_eq!(manifest.inputs.len(), 3);
    assert_eq!(manifest.artefacts.len(), 3);
    assert!(manifest.has_succeeded(&ArtifactId::new("NarrationScript[segment=0]")));
    assert!(manifest.has_succeeded(&ArtifactId::new("NarrationScript[segment=1]")));
    assert!(manifest.has_succeeded(&ArtifactId::new("Timeline")));
}

/// Universal property 2: re-planning over an up-to-date manifest yields no
/// work.
#[tokio::test]
async fn replanning_up_to_date_manifest_is_empty() {
    let harness = Harness::new();
    let inputs = values(&[
        ("InquiryPrompt", json!("Darwin")),
        ("NumOfSegments", json!(2)),
        ("Language", json!("en")),
    ]);
    let graph = project(MINIMAL_BLUEPRINT, &inputs);

    let outcome = harness.plan("m", &graph, &inputs);
    let ctx = echo_context(&harness, "m", None);
    let result = execute(&outcome.plan, &ctx, &RunOptions::default())
        .await
        .unwrap();
    harness.commit(&result);

    let second = harness.plan("m", &graph, &inputs);
    assert!(second.plan.layers.is_empty());
    assert!(second.changed_inputs.is_empty());
}

/// S2: editing only the prompt re-plans both producers at rev-0002.
#[tokio::test]
async fn s2_prompt_edit_replans_both_layers() {
    let harness = Harness::new();
    let inputs = values(&[
        ("InquiryPrompt", json!("Tell me about Darwin and Galapagos")),
        ("NumOfSegments", json!(2)),
        ("Language", json!("en")),
    ]);
    let graph = project(MINIMAL_BLUEPRINT, &inputs);
    let first = harness.plan("m", &graph, &inputs);
    let ctx = echo_context(&harness, "m", None);
    let result = execute(&first.plan, &ctx, &RunOptions::default())
        .await
        .unwrap();
    harness.commit(&result);

    let edited = values(&[
        ("InquiryPrompt", json!("Chart the rise of reusable rockets")),
        ("NumOfSegments", json!(2)),
        ("Language", json!("en")),
    ]);
    let second = harness.plan("m", &graph, &edited);

    assert_eq!(second.plan.revision, Revision::new(2));
    assert_eq!(second.changed_inputs, vec![common::input_id("InquiryPrompt")]);
    assert_eq!(second.plan.layers.len(), 2);
    assert_eq!(second.plan.layers[0].len(), 2);
    assert_eq!(second.plan.layers[1].len(), 1);
}

/// S3: an edit to an input the script producer does not consume leaves it
/// out of the plan.
#[tokio::test]
async fn s3_unrelated_edit_replans_only_the_dependent_subgraph() {
    let harness = Harness::new();
    let inputs = values(&[
        ("InquiryPrompt", json!("Darwin")),
        ("NumOfSegments", json!(2)),
        ("VoiceId", json!("alloy")),
    ]);
    let graph = project(VOICED_BLUEPRINT, &inputs);
    let first = harness.plan("m", &graph, &inputs);
    let ctx = echo_context(&harness, "m", None);
    let result = execute(&first.plan, &ctx, &RunOptions::default())
        .await
        .unwrap();
    harness.commit(&result);

    let edited = values(&[
        ("InquiryPrompt", json!("Darwin")),
        ("NumOfSegments", json!(2)),
        ("VoiceId", json!("nova")),
    ]);
    let second = harness.plan("m", &graph, &edited);

    let planned: Vec<&str> = second
        .plan
        .layers
        .iter()
        .flatten()
        .map(|j| j.job_id.as_str())
        .collect();
    assert!(
        planned.contains(&"Producer:AudioProducer"),
        "voice subgraph must re-plan: {planned:?}"
    );
    assert!(
        planned.contains(&"Producer:TimelineAssembler"),
        "timeline depends on the audio track: {planned:?}"
    );
    assert!(
        !planned.iter().any(|id| id.starts_with("Producer:ScriptProducer")),
        "script producer must not re-plan: {planned:?}"
    );
}

/// S6: a cyclic producer graph is rejected, naming both jobs.
#[test]
fn s6_cycle_is_rejected_naming_the_jobs() {
    let harness = Harness::new();
    let inputs = values(&[]);
    let graph = project(CYCLIC_BLUEPRINT, &inputs);

    let current = harness.manifests.load_current("m").ok();
    let err = harness
        .planner
        .generate_plan(tp_planner::PlanRequest {
            movie: "m",
            manifest: current.as_ref().map(|(m, _)| m),
            manifest_hash: None,
            producer_graph: &graph,
            input_values: &inputs,
            artefact_drafts: Vec::new(),
        })
        .unwrap_err();
    match err {
        PlannerError::Cycle { cycle } => {
            assert!(cycle.contains(&"Producer:A".to_string()), "{cycle:?}");
            assert!(cycle.contains(&"Producer:B".to_string()), "{cycle:?}");
        }
        other => panic!("expected cycle error, got {other}"),
    }
}

/// Raising a count input re-plans exactly the jobs for the new instances.
#[tokio::test]
async fn raising_segment_count_plans_the_new_instance() {
    let harness = Harness::new();
    let inputs = values(&[
        ("InquiryPrompt", json!("Darwin")),
        ("NumOfSegments", json!(2)),
        ("Language", json!("en")),
    ]);
    let graph = project(MINIMAL_BLUEPRINT, &inputs);
    let first = harness.plan("m", &graph, &inputs);
    let ctx = echo_context(&harness, "m", None);
    let result = execute(&first.plan, &ctx, &RunOptions::default())
        .await
        .unwrap();
    harness.commit(&result);

    let raised = values(&[
        ("InquiryPrompt", json!("Darwin")),
        ("NumOfSegments", json!(3)),
        ("Language", json!("en")),
    ]);
    let wider_graph = project(MINIMAL_BLUEPRINT, &raised);
    let second = harness.plan("m", &wider_graph, &raised);

    let planned: Vec<&str> = second
        .plan
        .layers
        .iter()
        .flatten()
        .map(|j| j.job_id.as_str())
        .collect();
    assert!(planned.contains(&"Producer:ScriptProducer[i=2]"), "{planned:?}");
    assert!(planned.contains(&"Producer:TimelineAssembler"), "{planned:?}");
}

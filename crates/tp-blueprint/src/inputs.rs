// SPDX-License-Identifier: MIT OR Apache-2.0
//! Input-source normalization and default seeding.
//!
//! A sub-blueprint's input is often just an alias: the parent wires its
//! own input straight through (`Input:ImagesPer` → `Input:Child.ImagesPer`)
//! so a single upstream value fans out unchanged. The source map collapses
//! such chains to their upstream root; planning and expansion work in
//! source-id space only.

use crate::BlueprintError;
use serde_json::Value;
use std::collections::BTreeMap;
use tp_core::{CanonicalGraph, InputId, NodeKind};

/// Compute the canonical-id → source-id map for every input node.
///
/// An input is its own source when it has no inbound input-to-input edge
/// or is marked fan-in. Otherwise its source is the transitive upstream
/// root. Multiple upstream inputs targeting the same downstream input is
/// a hard error.
pub fn input_source_map(
    graph: &CanonicalGraph,
) -> Result<BTreeMap<InputId, InputId>, BlueprintError> {
    // Direct upstream per input node, validated for uniqueness.
    let mut upstream: BTreeMap<usize, usize> = BTreeMap::new();
    for (idx, node) in graph.nodes.iter().enumerate() {
        if node.kind != NodeKind::InputSource || node.fan_in {
            continue;
        }
        let mut inbound = graph
            .edges_into(idx)
            .filter(|e| graph.nodes[e.from].kind == NodeKind::InputSource);
        if let Some(first) = inbound.next() {
            if inbound.next().is_some() {
                return Err(BlueprintError::MultipleUpstreamSources {
                    input: node.id.clone(),
                });
            }
            upstream.insert(idx, first.from);
        }
    }

    let mut map = BTreeMap::new();
    for (idx, node) in graph.nodes.iter().enumerate() {
        if node.kind != NodeKind::InputSource {
            continue;
        }
        let mut cursor = idx;
        let mut hops = 0usize;
        while let Some(&up) = upstream.get(&cursor) {
            cursor = up;
            hops += 1;
            if hops > graph.nodes.len() {
                return Err(BlueprintError::AliasCycle {
                    input: node.id.clone(),
                });
            }
        }
        map.insert(
            InputId::new(node.id.clone()),
            InputId::new(graph.nodes[cursor].id.clone()),
        );
    }
    Ok(map)
}

/// Redirect `Input:`-keyed values to their upstream source keys.
///
/// Non-input keys pass through untouched. On collision at a source key the
/// first value wins.
#[must_use]
pub fn normalize_input_values(
    values: &BTreeMap<String, Value>,
    source_map: &BTreeMap<InputId, InputId>,
) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    for (key, value) in values {
        let target = if tp_core::ids::is_input_id(key) {
            source_map
                .get(&InputId::new(key.clone()))
                .map_or_else(|| key.clone(), |src| src.to_string())
        } else {
            key.clone()
        };
        out.entry(target).or_insert_with(|| value.clone());
    }
    out
}

/// Seed declared defaults for inputs that have no explicit value yet.
///
/// Defaults are written at the input's *source* key so an aliased default
/// lands where planning will look for it.
pub fn seed_defaults(
    values: &mut BTreeMap<String, Value>,
    graph: &CanonicalGraph,
    source_map: &BTreeMap<InputId, InputId>,
) {
    for node in &graph.nodes {
        if node.kind != NodeKind::InputSource {
            continue;
        }
        let Some(default) = &node.default_value else {
            continue;
        };
        let id = InputId::new(node.id.clone());
        let source = source_map.get(&id).unwrap_or(&id);
        values
            .entry(source.to_string())
            .or_insert_with(|| default.clone());
    }
}

/// Verify every required input has a value after normalization and
/// default seeding.
pub fn ensure_required(
    values: &BTreeMap<String, Value>,
    graph: &CanonicalGraph,
    source_map: &BTreeMap<InputId, InputId>,
) -> Result<(), BlueprintError> {
    for node in &graph.nodes {
        if node.kind != NodeKind::InputSource || !node.required {
            continue;
        }
        let id = InputId::new(node.id.clone());
        let source = source_map.get(&id).unwrap_or(&id);
        if !values.contains_key(source.as_str()) {
            return Err(BlueprintError::MissingRequiredInput {
                input: source.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tp_core::{CanonicalEdge, CanonicalNode};

    fn input_node(id: &str, fan_in: bool, default: Option<Value>) -> CanonicalNode {
        CanonicalNode {
            id: format!("Input:{id}"),
            kind: NodeKind::InputSource,
            namespace_path: Vec::new(),
            name: id.rsplit('.').next().unwrap_or(id).to_string(),
            dimensions: Vec::new(),
            dimension_counts: BTreeMap::new(),
            fan_in,
            required: false,
            default_value: default,
            producer: None,
        }
    }

    fn alias_edge(from: usize, to: usize) -> CanonicalEdge {
        CanonicalEdge {
            from,
            to,
            from_bindings: Vec::new(),
            to_bindings: Vec::new(),
        }
    }

    fn graph(nodes: Vec<CanonicalNode>, edges: Vec<CanonicalEdge>) -> CanonicalGraph {
        CanonicalGraph {
            nodes,
            edges,
            namespace_dimensions: BTreeMap::new(),
        }
    }

    #[test]
    fn unaliased_input_is_its_own_source() {
        let g = graph(vec![input_node("A", false, None)], vec![]);
        let map = input_source_map(&g).unwrap();
        assert_eq!(map[&InputId::new("A")], InputId::new("A"));
    }

    #[test]
    fn alias_chain_collapses_to_root() {
        // ImagesPer -> Child.ImagesPer -> Child.Grand.ImagesPer
        let g = graph(
            vec![
                input_node("ImagesPer", false, None),
                input_node("Child.ImagesPer", false, None),
                input_node("Child.Grand.ImagesPer", false, None),
            ],
            vec![alias_edge(0, 1), alias_edge(1, 2)],
        );
        let map = input_source_map(&g).unwrap();
        assert_eq!(
            map[&InputId::new("Child.Grand.ImagesPer")],
            InputId::new("ImagesPer")
        );
        assert_eq!(map[&InputId::new("Child.ImagesPer")], InputId::new("ImagesPer"));
    }

    #[test]
    fn fan_in_input_keeps_itself_despite_inbound_edges() {
        let g = graph(
            vec![
                input_node("A", false, None),
                input_node("Agg", true, None),
            ],
            vec![alias_edge(0, 1)],
        );
        let map = input_source_map(&g).unwrap();
        assert_eq!(map[&InputId::new("Agg")], InputId::new("Agg"));
    }

    #[test]
    fn multiple_upstreams_are_a_hard_error() {
        let g = graph(
            vec![
                input_node("A", false, None),
                input_node("B", false, None),
                input_node("C", false, None),
            ],
            vec![alias_edge(0, 2), alias_edge(1, 2)],
        );
        assert!(matches!(
            input_source_map(&g),
            Err(BlueprintError::MultipleUpstreamSources { .. })
        ));
    }

    #[test]
    fn alias_cycle_is_detected() {
        let g = graph(
            vec![input_node("A", false, None), input_node("B", false, None)],
            vec![alias_edge(0, 1), alias_edge(1, 0)],
        );
        assert!(matches!(
            input_source_map(&g),
            Err(BlueprintError::AliasCycle { .. })
        ));
    }

    #[test]
    fn normalize_redirects_and_first_wins() {
        let g = graph(
            vec![
                input_node("ImagesPer", false, None),
                input_node("Child.ImagesPer", false, None),
            ],
            vec![alias_edge(0, 1)],
        );
        let map = input_source_map(&g).unwrap();
        let mut values = BTreeMap::new();
        values.insert("Input:Child.ImagesPer".to_string(), json!(3));
        values.insert("Input:ImagesPer".to_string(), json!(5));
        values.insert("blueprintPath".to_string(), json!("root.toml"));

        let normalized = normalize_input_values(&values, &map);
        // BTreeMap iteration visits Child.ImagesPer first; its value lands
        // on the source key and the direct value is dropped.
        assert_eq!(normalized["Input:ImagesPer"], json!(3));
        assert_eq!(normalized["blueprintPath"], json!("root.toml"));
        assert_eq!(normalized.len(), 2);
    }

    #[test]
    fn defaults_seed_only_missing_values() {
        let g = graph(
            vec![
                input_node("Language", false, Some(json!("en"))),
                input_node("Voice", false, Some(json!("alloy"))),
            ],
            vec![],
        );
        let map = input_source_map(&g).unwrap();
        let mut values = BTreeMap::new();
        values.insert("Input:Voice".to_string(), json!("nova"));
        seed_defaults(&mut values, &g, &map);
        assert_eq!(values["Input:Language"], json!("en"));
        assert_eq!(values["Input:Voice"], json!("nova"));
    }

    #[test]
    fn required_input_without_value_is_rejected() {
        let mut node = input_node("InquiryPrompt", false, None);
        node.required = true;
        let g = graph(vec![node], vec![]);
        let map = input_source_map(&g).unwrap();

        let empty = BTreeMap::new();
        assert!(matches!(
            ensure_required(&empty, &g, &map),
            Err(BlueprintError::MissingRequiredInput { .. })
        ));

        let mut values = BTreeMap::new();
        values.insert("Input:InquiryPrompt".to_string(), json!("Darwin"));
        assert!(ensure_required(&values, &g, &map).is_ok());
    }

    #[test]
    fn required_check_follows_the_source_map() {
        let mut alias = input_node("Child.Prompt", false, None);
        alias.required = true;
        let g = graph(
            vec![input_node("Prompt", false, None), alias],
            vec![alias_edge(0, 1)],
        );
        let map = input_source_map(&g).unwrap();
        let mut values = BTreeMap::new();
        values.insert("Input:Prompt".to_string(), json!("set upstream"));
        assert!(ensure_required(&values, &g, &map).is_ok());
    }

    #[test]
    fn aliased_default_lands_on_source_key() {
        let g = graph(
            vec![
                input_node("ImagesPer", false, None),
                input_node("Child.ImagesPer", false, Some(json!(2))),
            ],
            vec![alias_edge(0, 1)],
        );
        let map = input_source_map(&g).unwrap();
        let mut values = BTreeMap::new();
        seed_defaults(&mut values, &g, &map);
        assert_eq!(values["Input:ImagesPer"], json!(2));
        assert!(!values.contains_key("Input:Child.ImagesPer"));
    }
}

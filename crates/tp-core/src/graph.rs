// SPDX-License-Identifier: MIT OR Apache-2.0
//! Canonical graph types.
//!
//! The blueprint compiler lowers a document tree into this explicit,
//! arena-style graph: nodes in a `Vec`, edges as index pairs. Integer
//! indices sidestep ownership cycles and make topological sorts cheap.

use crate::ids::InputId;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Node kind in the canonical graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A user-editable input.
    InputSource,
    /// A computation step.
    Producer,
    /// A produced output.
    Artifact,
}

/// Provider binding carried on producer nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProducerSpec {
    /// Provider name.
    pub provider: String,
    /// Model identifier.
    pub model: String,
    /// Rate-limit bucket key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_key: Option<String>,
    /// Provider-specific configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
}

/// One node of the canonical graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CanonicalNode {
    /// Canonical id (`Input:…`, `Producer:…`, `Artifact:…`), without
    /// dimension indices.
    pub id: String,
    /// Node kind.
    pub kind: NodeKind,
    /// Namespace path from the root blueprint.
    pub namespace_path: Vec<String>,
    /// Declared name within the namespace.
    pub name: String,
    /// Ordered dimension symbols (inherited namespace dimensions first,
    /// then the node's own).
    pub dimensions: Vec<String>,
    /// For each dimension symbol, the input whose value is its length.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dimension_counts: BTreeMap<String, InputId>,
    /// Aggregation input marker (input nodes only).
    #[serde(default)]
    pub fan_in: bool,
    /// Required marker: a value must exist before planning (inputs), or
    /// the pipeline is incomplete without the node (artefacts).
    #[serde(default)]
    pub required: bool,
    /// Declared default value (input nodes only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    /// Provider binding (producer nodes only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub producer: Option<ProducerSpec>,
}

/// A dimension symbol bound to a position in an endpoint's dimension list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DimBinding {
    /// Edge-local dimension symbol.
    pub symbol: String,
    /// Position within the endpoint node's `dimensions`.
    pub position: usize,
}

/// A resolved edge between two canonical nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CanonicalEdge {
    /// Index of the upstream node.
    pub from: usize,
    /// Index of the downstream node.
    pub to: usize,
    /// Symbol bindings on the upstream endpoint.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub from_bindings: Vec<DimBinding>,
    /// Symbol bindings on the downstream endpoint.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub to_bindings: Vec<DimBinding>,
}

/// The compiled canonical graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CanonicalGraph {
    /// Arena of nodes; edges refer to indices here.
    pub nodes: Vec<CanonicalNode>,
    /// Resolved edges.
    pub edges: Vec<CanonicalEdge>,
    /// Ordered dimension symbols per dotted namespace.
    pub namespace_dimensions: BTreeMap<String, Vec<String>>,
}

impl CanonicalGraph {
    /// Find a node index by canonical id.
    #[must_use]
    pub fn node_index(&self, id: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.id == id)
    }

    /// Iterate node indices of one kind.
    pub fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = usize> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(move |(_, n)| n.kind == kind)
            .map(|(i, _)| i)
    }

    /// Edges arriving at `to`.
    pub fn edges_into(&self, to: usize) -> impl Iterator<Item = &CanonicalEdge> + '_ {
        self.edges.iter().filter(move |e| e.to == to)
    }

    /// Edges leaving `from`.
    pub fn edges_out_of(&self, from: usize) -> impl Iterator<Item = &CanonicalEdge> + '_ {
        self.edges.iter().filter(move |e| e.from == from)
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Blueprint document model.
//!
//! A blueprint is a declarative description of a movie pipeline: inputs,
//! producers, artefacts, sub-blueprints, and symbolic edges. Documents are
//! encoding-agnostic (TOML and YAML loaders live in `tp-blueprint`); this
//! module is the already-parsed abstract form plus the loaded tree.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Document identity block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BlueprintMeta {
    /// Stable document id; must equal the name a parent references it by.
    pub id: String,
    /// Human-readable title.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Optional document version tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// A user-editable input declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InputDecl {
    /// Declared input name.
    pub name: String,
    /// Value type tag (`string`, `number`, `boolean`, …). Advisory.
    #[serde(rename = "type")]
    pub input_type: String,
    /// Whether a value must be present before planning.
    #[serde(default)]
    pub required: bool,
    /// Value seeded when the user supplies none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    /// Marks an aggregation input: it is always its own source even when
    /// an upstream input feeds it.
    #[serde(default)]
    pub fan_in: bool,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A produced artefact declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactDecl {
    /// Declared artefact kind name.
    pub name: String,
    /// Payload type tag (`text`, `image`, `audio`, `timeline`, …).
    #[serde(rename = "type")]
    pub artifact_type: String,
    /// Dimension symbol when the artefact is indexed (e.g. `segment`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cardinality: Option<String>,
    /// Input whose value gives the dimension's length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count_input: Option<String>,
    /// Whether the pipeline is incomplete without it.
    #[serde(default)]
    pub required: bool,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A producer variant: one concrete provider/model binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProducerVariant {
    /// Provider name (e.g. `openai`, `replicate`).
    pub provider: String,
    /// Model identifier at the provider.
    pub model: String,
    /// Environment this variant applies to (`production`, `test`, …);
    /// absent means any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    /// Rate-limit bucket key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_key: Option<String>,
}

/// A producer declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProducerDecl {
    /// Declared producer name.
    pub name: String,
    /// Default provider.
    pub provider: String,
    /// Default model.
    pub model: String,
    /// Provider-specific configuration passed through to the adapter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
    /// Rate-limit bucket key for the default variant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_key: Option<String>,
    /// Per-environment variants overriding the default.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<ProducerVariant>,
}

impl ProducerDecl {
    /// Resolve the variant for an environment, falling back to the default
    /// provider/model when no variant matches.
    #[must_use]
    pub fn resolve_variant(&self, environment: Option<&str>) -> ProducerVariant {
        if let Some(env) = environment {
            for v in &self.models {
                if v.environment.as_deref() == Some(env) {
                    return v.clone();
                }
            }
        }
        // A variant with no environment tag acts as a catch-all override.
        for v in &self.models {
            if v.environment.is_none() {
                return v.clone();
            }
        }
        ProducerVariant {
            provider: self.provider.clone(),
            model: self.model.clone(),
            environment: None,
            rate_key: self.rate_key.clone(),
        }
    }
}

/// Reference to a child blueprint document.
///
/// The name may carry an array-style dimension (`Scene[i]`), in which case
/// the whole child namespace is indexed and `count_input` names the input
/// providing the cardinality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubBlueprintRef {
    /// Reference name, optionally with a `[sym]` dimension suffix.
    pub name: String,
    /// Explicit relative path; defaults to `<name>.<parent-ext>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Input providing the dimension's length, when the name is indexed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count_input: Option<String>,
}

/// A symbolic edge between two declared nodes.
///
/// Endpoints are names local to the declaring document, optionally dotted
/// into a sub-blueprint and optionally indexed: `A`, `A[i]`, `Sub.A[i][j]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDecl {
    /// Upstream endpoint.
    pub from: String,
    /// Downstream endpoint.
    pub to: String,
    /// Free-form annotation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// A parsed blueprint document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BlueprintDoc {
    /// Identity block.
    pub meta: BlueprintMeta,
    /// Input declarations.
    #[serde(default)]
    pub inputs: Vec<InputDecl>,
    /// Artefact declarations.
    #[serde(default)]
    pub artefacts: Vec<ArtifactDecl>,
    /// Producer declarations.
    #[serde(default)]
    pub producers: Vec<ProducerDecl>,
    /// Child blueprint references.
    #[serde(default)]
    pub sub_blueprints: Vec<SubBlueprintRef>,
    /// Symbolic edges.
    #[serde(default)]
    pub edges: Vec<EdgeDecl>,
}

/// The dimension a parent assigned to a child namespace (`Scene[i]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DimensionDecl {
    /// Dimension symbol.
    pub symbol: String,
    /// Input (name as written in the parent document) giving the length.
    pub count_input: String,
}

/// A loaded blueprint tree node: one document plus its resolved children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BlueprintTreeNode {
    /// Document id (equals the reference name used by the parent).
    pub id: String,
    /// Namespace path from the root document to this node.
    pub namespace_path: Vec<String>,
    /// The parsed document.
    pub document: BlueprintDoc,
    /// Children keyed by reference name.
    pub children: BTreeMap<String, BlueprintTreeNode>,
    /// Dimension assigned by the parent reference, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<DimensionDecl>,
}

impl BlueprintTreeNode {
    /// Depth-first walk over this node and all descendants.
    pub fn walk(&self) -> Vec<&BlueprintTreeNode> {
        let mut out = vec![self];
        for child in self.children.values() {
            out.extend(child.walk());
        }
        out
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Lowering a blueprint tree into the canonical graph.
//!
//! Two passes. The walk emits one canonical node per declared input,
//! producer, and artefact, carrying namespace dimensions down the tree.
//! The edge pass resolves symbolic endpoints, accumulates edge-derived
//! dimensions onto producers, and validates that every dimension symbol is
//! sized by exactly one count input.

use crate::BlueprintError;
use std::collections::{BTreeMap, HashMap};
use tp_core::{
    ArtifactId, BlueprintTreeNode, CanonicalEdge, CanonicalGraph, CanonicalNode, DimBinding,
    InputId, NodeKind, ProducerId, dotted,
};
use tracing::debug;

/// Compile a loaded blueprint tree into the canonical graph.
///
/// `environment` selects producer variants (`models` entries); `None`
/// resolves each producer's default binding.
pub fn compile(
    tree: &BlueprintTreeNode,
    environment: Option<&str>,
) -> Result<CanonicalGraph, BlueprintError> {
    let mut builder = GraphBuilder::default();
    builder.walk(tree, &[], environment)?;
    builder.resolve_edges(tree)?;
    builder.validate()?;
    let graph = CanonicalGraph {
        nodes: builder.nodes,
        edges: builder.edges,
        namespace_dimensions: builder.namespace_dimensions,
    };
    debug!(
        target: "tp.blueprint",
        nodes = graph.nodes.len(),
        edges = graph.edges.len(),
        "canonical graph compiled"
    );
    Ok(graph)
}

/// An ordered dimension with the input that sizes it.
type SizedDim = (String, InputId);

#[derive(Default)]
struct GraphBuilder {
    nodes: Vec<CanonicalNode>,
    index: HashMap<String, usize>,
    edges: Vec<CanonicalEdge>,
    namespace_dimensions: BTreeMap<String, Vec<String>>,
}

impl GraphBuilder {
    fn push(&mut self, node: CanonicalNode) {
        self.index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
    }

    // -- Pass 1: node emission ------------------------------------------

    fn walk(
        &mut self,
        node: &BlueprintTreeNode,
        parent_dims: &[SizedDim],
        environment: Option<&str>,
    ) -> Result<(), BlueprintError> {
        let ns = &node.namespace_path;
        let mut ns_dims: Vec<SizedDim> = parent_dims.to_vec();
        if let Some(dim) = &node.dimension {
            // The count input is written in the parent document.
            let parent_ns = &ns[..ns.len().saturating_sub(1)];
            ns_dims.push((
                dim.symbol.clone(),
                resolve_input_ref(parent_ns, &dim.count_input),
            ));
        }
        self.namespace_dimensions.insert(
            ns.join("."),
            ns_dims.iter().map(|(s, _)| s.clone()).collect(),
        );

        for input in &node.document.inputs {
            self.push(CanonicalNode {
                id: InputId::from_parts(ns, &input.name).into(),
                kind: NodeKind::InputSource,
                namespace_path: ns.clone(),
                name: input.name.clone(),
                dimensions: Vec::new(),
                dimension_counts: BTreeMap::new(),
                fan_in: input.fan_in,
                required: input.required,
                default_value: input.default_value.clone(),
                producer: None,
            });
        }

        for artefact in &node.document.artefacts {
            let mut dims: Vec<String> = ns_dims.iter().map(|(s, _)| s.clone()).collect();
            let mut counts: BTreeMap<String, InputId> = ns_dims
                .iter()
                .map(|(s, c)| (s.clone(), c.clone()))
                .collect();
            if let Some(symbol) = &artefact.cardinality {
                dims.push(symbol.clone());
                if let Some(count) = &artefact.count_input {
                    counts.insert(symbol.clone(), resolve_input_ref(ns, count));
                }
            }
            self.push(CanonicalNode {
                id: ArtifactId::from_parts(ns, &artefact.name).into(),
                kind: NodeKind::Artifact,
                namespace_path: ns.clone(),
                name: artefact.name.clone(),
                dimensions: dims,
                dimension_counts: counts,
                fan_in: false,
                required: artefact.required,
                default_value: None,
                producer: None,
            });
        }

        for producer in &node.document.producers {
            let variant = producer.resolve_variant(environment);
            self.push(CanonicalNode {
                id: ProducerId::from_parts(ns, &producer.name).into(),
                kind: NodeKind::Producer,
                namespace_path: ns.clone(),
                name: producer.name.clone(),
                dimensions: ns_dims.iter().map(|(s, _)| s.clone()).collect(),
                dimension_counts: ns_dims
                    .iter()
                    .map(|(s, c)| (s.clone(), c.clone()))
                    .collect(),
                fan_in: false,
                required: false,
                default_value: None,
                producer: Some(tp_core::ProducerSpec {
                    provider: variant.provider,
                    model: variant.model,
                    rate_key: variant.rate_key,
                    config: producer.config.clone(),
                }),
            });
        }

        for child in node.children.values() {
            self.walk(child, &ns_dims, environment)?;
        }
        Ok(())
    }

    // -- Pass 2: edge resolution ----------------------------------------

    fn resolve_edges(&mut self, tree: &BlueprintTreeNode) -> Result<(), BlueprintError> {
        let mut raw = Vec::new();
        for doc_node in tree.walk() {
            let ns = &doc_node.namespace_path;
            for edge in &doc_node.document.edges {
                let from = self.resolve_endpoint(&edge.from, ns)?;
                let to = self.resolve_endpoint(&edge.to, ns)?;
                raw.push((from, to));
            }
        }

        // Accumulate edge-derived dimensions onto producers first so that
        // binding positions refer to the final dimension lists.
        for (from, to) in &raw {
            self.accumulate_producer_dims(from, to)?;
            self.accumulate_producer_dims(to, from)?;
        }

        for (from, to) in raw {
            let from_bindings = self.bindings_for(&from)?;
            let to_bindings = self.bindings_for(&to)?;
            self.edges.push(CanonicalEdge {
                from: from.node,
                to: to.node,
                from_bindings,
                to_bindings,
            });
        }
        Ok(())
    }

    /// Give `endpoint`'s node the dimensions an indexed edge implies, when
    /// that node is a producer. Symbols come from the producer endpoint
    /// itself and from the artefact on the other end; counts come from the
    /// artefact's matched positions.
    fn accumulate_producer_dims(
        &mut self,
        endpoint: &RawEndpoint,
        other: &RawEndpoint,
    ) -> Result<(), BlueprintError> {
        if self.nodes[endpoint.node].kind != NodeKind::Producer {
            return Ok(());
        }
        // Edges through a fan-in input aggregate; they do not iterate.
        if self.nodes[other.node].kind == NodeKind::InputSource && self.nodes[other.node].fan_in {
            return Ok(());
        }

        let mut implied: Vec<(String, Option<InputId>)> = Vec::new();
        if self.nodes[other.node].kind == NodeKind::Artifact {
            let artifact = &self.nodes[other.node];
            let dims = &artifact.dimensions;
            if other.symbols.len() > dims.len() {
                return Err(BlueprintError::TooManyIndices {
                    reference: other.reference.clone(),
                    symbols: other.symbols.len(),
                    dims: dims.len(),
                });
            }
            let offset = dims.len() - other.symbols.len();
            for (k, sym) in other.symbols.iter().enumerate() {
                let artifact_dim = &dims[offset + k];
                let count = artifact.dimension_counts.get(artifact_dim).cloned();
                implied.push((sym.clone(), count));
            }
        }
        for sym in &endpoint.symbols {
            if !implied.iter().any(|(s, _)| s == sym) {
                implied.push((sym.clone(), None));
            }
        }

        let producer = &mut self.nodes[endpoint.node];
        for (sym, count) in implied {
            if let Some(count) = count {
                match producer.dimension_counts.get(&sym).cloned() {
                    Some(existing) if existing != count => {
                        return Err(BlueprintError::DimensionCountMismatch {
                            symbol: sym,
                            node: producer.id.clone(),
                            first: existing.to_string(),
                            second: count.to_string(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        producer.dimension_counts.insert(sym.clone(), count);
                    }
                }
            }
            if !producer.dimensions.contains(&sym) {
                producer.dimensions.push(sym);
            }
        }
        Ok(())
    }

    fn bindings_for(&self, endpoint: &RawEndpoint) -> Result<Vec<DimBinding>, BlueprintError> {
        if endpoint.symbols.is_empty() {
            return Ok(Vec::new());
        }
        let node = &self.nodes[endpoint.node];
        match node.kind {
            NodeKind::InputSource => Err(BlueprintError::IndexOnInput {
                reference: endpoint.reference.clone(),
            }),
            NodeKind::Artifact => {
                let dims = &node.dimensions;
                if endpoint.symbols.len() > dims.len() {
                    return Err(BlueprintError::TooManyIndices {
                        reference: endpoint.reference.clone(),
                        symbols: endpoint.symbols.len(),
                        dims: dims.len(),
                    });
                }
                // Symbols bind the trailing dimensions, in declared order.
                let offset = dims.len() - endpoint.symbols.len();
                Ok(endpoint
                    .symbols
                    .iter()
                    .enumerate()
                    .map(|(k, sym)| DimBinding {
                        symbol: sym.clone(),
                        position: offset + k,
                    })
                    .collect())
            }
            NodeKind::Producer => endpoint
                .symbols
                .iter()
                .map(|sym| {
                    node.dimensions
                        .iter()
                        .position(|d| d == sym)
                        .map(|position| DimBinding {
                            symbol: sym.clone(),
                            position,
                        })
                        .ok_or_else(|| BlueprintError::MissingDimensionCount {
                            symbol: sym.clone(),
                            node: node.id.clone(),
                        })
                })
                .collect(),
        }
    }

    fn resolve_endpoint(
        &self,
        reference: &str,
        doc_ns: &[String],
    ) -> Result<RawEndpoint, BlueprintError> {
        let (path, symbols) = split_symbols(reference);
        let mut segments: Vec<&str> = path.split('.').collect();
        let name = segments.pop().unwrap_or(path);
        let mut ns: Vec<String> = doc_ns.to_vec();
        ns.extend(segments.iter().map(|s| s.to_string()));

        let target = dotted(&ns, name);
        let candidates = [
            format!("Input:{target}"),
            format!("Artifact:{target}"),
            format!("Producer:{target}"),
        ];
        let matches: Vec<usize> = candidates
            .iter()
            .filter_map(|id| self.index.get(id).copied())
            .collect();
        match matches.as_slice() {
            [] => Err(BlueprintError::UnknownEndpoint {
                reference: reference.to_string(),
                namespace: doc_ns.join("."),
            }),
            [single] => Ok(RawEndpoint {
                node: *single,
                symbols,
                reference: reference.to_string(),
            }),
            _ => Err(BlueprintError::AmbiguousEndpoint {
                reference: reference.to_string(),
                namespace: doc_ns.join("."),
            }),
        }
    }

    // -- Final validation -----------------------------------------------

    fn validate(&self) -> Result<(), BlueprintError> {
        for node in &self.nodes {
            for sym in &node.dimensions {
                match node.dimension_counts.get(sym) {
                    None => {
                        return Err(BlueprintError::MissingDimensionCount {
                            symbol: sym.clone(),
                            node: node.id.clone(),
                        });
                    }
                    Some(count) => {
                        if !self.index.contains_key(count.as_str()) {
                            return Err(BlueprintError::UnknownCountInput {
                                input: count.to_string(),
                                referenced_by: node.id.clone(),
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

struct RawEndpoint {
    node: usize,
    symbols: Vec<String>,
    reference: String,
}

/// Split `Sub.A[i][j]` into (`Sub.A`, `["i", "j"]`).
fn split_symbols(reference: &str) -> (&str, Vec<String>) {
    let Some(open) = reference.find('[') else {
        return (reference, Vec::new());
    };
    let (path, rest) = reference.split_at(open);
    let symbols = rest
        .split(']')
        .map(|g| g.trim_start_matches('['))
        .filter(|g| !g.is_empty())
        .map(str::to_string)
        .collect();
    (path, symbols)
}

/// Resolve an input reference written in a document to a canonical id.
///
/// Plain names resolve within the declaring namespace; dotted names reach
/// into sub-namespaces.
fn resolve_input_ref(ns: &[String], reference: &str) -> InputId {
    InputId::from_parts(ns, reference)
}

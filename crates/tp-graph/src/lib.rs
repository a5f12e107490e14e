// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use tp_core::{
    ArtifactId, CanonicalEdge, CanonicalGraph, CanonicalNode, DimIndex, FanInDescriptor,
    FanInMember, InputId, JobContext, JobDescriptor, NodeKind, ProducerGraph, ProducerId,
};
use tracing::debug;

/// Errors from graph projection.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A dimension's count input has no value.
    #[error("no value for count input {input} sizing dimension {dimension:?} of {node}")]
    MissingCountValue {
        /// The count input id.
        input: String,
        /// The unsized dimension symbol.
        dimension: String,
        /// The node being expanded.
        node: String,
    },

    /// A count input's value is not a non-negative integer.
    #[error("count input {input} has non-integer value {value}")]
    InvalidCountValue {
        /// The count input id.
        input: String,
        /// The offending value.
        value: Value,
    },

    /// A consumed or produced artefact dimension cannot be pinned to an
    /// index of the producer instance.
    #[error("dimension {symbol:?} of {artifact} is not bound by producer {producer}")]
    UnboundDimension {
        /// The loose dimension symbol.
        symbol: String,
        /// The artefact being matched.
        artifact: String,
        /// The producer instance.
        producer: String,
    },
}

impl GraphError {
    /// The taxonomy code for this error.
    #[must_use]
    pub fn error_code(&self) -> tp_error::ErrorCode {
        tp_error::ErrorCode::UserInput
    }
}

/// Inputs to [`project`].
pub struct ProjectionArgs<'a> {
    /// The compiled canonical graph.
    pub graph: &'a CanonicalGraph,
    /// Normalized, default-seeded input values keyed by source id.
    pub input_values: &'a BTreeMap<String, Value>,
    /// Alias → source map from input normalization.
    pub source_map: &'a BTreeMap<InputId, InputId>,
}

/// Project the canonical graph into the runnable job DAG.
pub fn project(args: ProjectionArgs<'_>) -> Result<ProducerGraph, GraphError> {
    let projector = Projector {
        graph: args.graph,
        input_values: args.input_values,
        source_map: args.source_map,
    };
    projector.run()
}

struct Projector<'a> {
    graph: &'a CanonicalGraph,
    input_values: &'a BTreeMap<String, Value>,
    source_map: &'a BTreeMap<InputId, InputId>,
}

impl Projector<'_> {
    fn run(&self) -> Result<ProducerGraph, GraphError> {
        let mut jobs: Vec<JobDescriptor> = Vec::new();
        // Artefact instance id → producing job index, for edge wiring.
        let mut produced_by: BTreeMap<String, usize> = BTreeMap::new();

        for producer_idx in self.graph.nodes_of_kind(NodeKind::Producer) {
            let node = &self.graph.nodes[producer_idx];
            let sizes = self.dimension_sizes(node)?;
            for tuple in enumerate_tuples(&sizes) {
                let indices: BTreeMap<String, usize> = node
                    .dimensions
                    .iter()
                    .cloned()
                    .zip(tuple.iter().copied())
                    .collect();
                let job = self.build_job(producer_idx, node, &indices)?;
                for artefact in &job.produces {
                    produced_by.insert(artefact.to_string(), jobs.len());
                }
                jobs.push(job);
            }
        }

        let mut edges: Vec<(usize, usize)> = Vec::new();
        for (to_idx, job) in jobs.iter().enumerate() {
            for dep in job.artefact_dependencies() {
                if let Some(&from_idx) = produced_by.get(dep.as_str()) {
                    if from_idx != to_idx {
                        edges.push((from_idx, to_idx));
                    }
                }
            }
        }
        edges.sort_unstable();
        edges.dedup();

        debug!(
            target: "tp.graph",
            jobs = jobs.len(),
            edges = edges.len(),
            "producer graph projected"
        );
        Ok(ProducerGraph { jobs, edges })
    }

    /// Sizes of a node's dimensions, in declared order.
    fn dimension_sizes(&self, node: &CanonicalNode) -> Result<Vec<usize>, GraphError> {
        node.dimensions
            .iter()
            .map(|sym| {
                let count_input = node.dimension_counts.get(sym).ok_or_else(|| {
                    GraphError::MissingCountValue {
                        input: String::new(),
                        dimension: sym.clone(),
                        node: node.id.clone(),
                    }
                })?;
                self.count_value(count_input, sym, &node.id)
            })
            .collect()
    }

    fn count_value(
        &self,
        count_input: &InputId,
        dimension: &str,
        node: &str,
    ) -> Result<usize, GraphError> {
        let source = self.source_map.get(count_input).unwrap_or(count_input);
        let value =
            self.input_values
                .get(source.as_str())
                .ok_or_else(|| GraphError::MissingCountValue {
                    input: source.to_string(),
                    dimension: dimension.to_string(),
                    node: node.to_string(),
                })?;
        value
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| GraphError::InvalidCountValue {
                input: source.to_string(),
                value: value.clone(),
            })
    }

    fn build_job(
        &self,
        producer_idx: usize,
        node: &CanonicalNode,
        indices: &BTreeMap<String, usize>,
    ) -> Result<JobDescriptor, GraphError> {
        let dim_indices: Vec<DimIndex> = node
            .dimensions
            .iter()
            .map(|sym| DimIndex::new(sym.clone(), indices[sym]))
            .collect();
        let job_id = ProducerId::new(node.id.clone()).with_indices(&dim_indices);

        let mut inputs: Vec<String> = Vec::new();
        let mut context = JobContext {
            indices: indices.clone(),
            ..JobContext::default()
        };
        let spec = node.producer.clone().unwrap_or_else(|| {
            // Producer nodes carry a spec by construction.
            tp_core::ProducerSpec {
                provider: String::new(),
                model: String::new(),
                rate_key: None,
                config: None,
            }
        });
        if let Some(config) = &spec.config {
            context.extras.insert("config".to_string(), config.clone());
        }

        for edge in self.graph.edges_into(producer_idx) {
            let upstream = &self.graph.nodes[edge.from];
            match upstream.kind {
                NodeKind::InputSource if upstream.fan_in => {
                    let descriptor = self.fan_in_members(edge.from, indices, &job_id)?;
                    inputs.push(upstream.id.clone());
                    context
                        .input_bindings
                        .insert(upstream.name.clone(), upstream.id.clone());
                    context.fan_in.insert(upstream.name.clone(), descriptor);
                }
                NodeKind::InputSource => {
                    let id = InputId::new(upstream.id.clone());
                    let source = self.source_map.get(&id).unwrap_or(&id);
                    inputs.push(source.to_string());
                    context
                        .input_bindings
                        .insert(upstream.name.clone(), source.to_string());
                }
                NodeKind::Artifact => {
                    let instance =
                        self.match_instance(upstream, edge, false, indices, &job_id)?;
                    inputs.push(instance.to_string());
                    context
                        .input_bindings
                        .insert(upstream.name.clone(), instance.to_string());
                }
                NodeKind::Producer => {
                    // Producer-to-producer edges carry no payload binding.
                }
            }
        }

        let mut produces: Vec<ArtifactId> = Vec::new();
        for edge in self.graph.edges_out_of(producer_idx) {
            let downstream = &self.graph.nodes[edge.to];
            if downstream.kind != NodeKind::Artifact {
                continue;
            }
            produces.push(self.match_instance(downstream, edge, true, indices, &job_id)?);
        }
        produces.sort();
        produces.dedup();
        inputs.sort();
        inputs.dedup();

        Ok(JobDescriptor {
            job_id,
            producer: node.name.clone(),
            inputs,
            produces,
            provider: spec.provider,
            provider_model: spec.model,
            rate_key: spec.rate_key,
            context,
        })
    }

    /// Pin one artefact instance for a direct consumption or production
    /// edge: every artefact dimension must resolve to an index of the
    /// producer instance, either through an edge symbol binding or a
    /// shared dimension symbol.
    fn match_instance(
        &self,
        artifact: &CanonicalNode,
        edge: &CanonicalEdge,
        producing: bool,
        indices: &BTreeMap<String, usize>,
        job_id: &ProducerId,
    ) -> Result<ArtifactId, GraphError> {
        let bindings = if producing {
            &edge.to_bindings
        } else {
            &edge.from_bindings
        };
        let mut instance = Vec::new();
        for (position, dim) in artifact.dimensions.iter().enumerate() {
            let symbol = bindings
                .iter()
                .find(|b| b.position == position)
                .map_or(dim.as_str(), |b| b.symbol.as_str());
            let index = indices
                .get(symbol)
                .copied()
                .ok_or_else(|| GraphError::UnboundDimension {
                    symbol: symbol.to_string(),
                    artifact: artifact.id.clone(),
                    producer: job_id.to_string(),
                })?;
            instance.push(DimIndex::new(dim.clone(), index));
        }
        Ok(ArtifactId::new(artifact.id.clone()).with_indices(&instance))
    }

    /// Enumerate the members aggregated into a fan-in input: all instances
    /// of every artefact feeding it, with dimensions shared with the
    /// consumer pinned to the consumer's indices.
    fn fan_in_members(
        &self,
        input_idx: usize,
        indices: &BTreeMap<String, usize>,
        job_id: &ProducerId,
    ) -> Result<FanInDescriptor, GraphError> {
        let mut members: Vec<(String, Vec<usize>, ArtifactId)> = Vec::new();
        for edge in self.graph.edges_into(input_idx) {
            let artifact = &self.graph.nodes[edge.from];
            if artifact.kind != NodeKind::Artifact {
                continue;
            }
            // Per-dimension: pinned to the consumer's index when shared,
            // iterated in full otherwise.
            let mut axes: Vec<Vec<usize>> = Vec::new();
            for (position, dim) in artifact.dimensions.iter().enumerate() {
                let symbol = edge
                    .from_bindings
                    .iter()
                    .find(|b| b.position == position)
                    .map_or(dim.as_str(), |b| b.symbol.as_str());
                if let Some(&pinned) = indices.get(symbol) {
                    axes.push(vec![pinned]);
                } else {
                    let count_input = artifact.dimension_counts.get(dim).ok_or_else(|| {
                        GraphError::UnboundDimension {
                            symbol: dim.clone(),
                            artifact: artifact.id.clone(),
                            producer: job_id.to_string(),
                        }
                    })?;
                    let size = self.count_value(count_input, dim, &artifact.id)?;
                    axes.push((0..size).collect());
                }
            }
            for tuple in enumerate_axes(&axes) {
                let dims: Vec<DimIndex> = artifact
                    .dimensions
                    .iter()
                    .zip(tuple.iter())
                    .map(|(d, &i)| DimIndex::new(d.clone(), i))
                    .collect();
                let id = ArtifactId::new(artifact.id.clone()).with_indices(&dims);
                members.push((artifact.id.clone(), tuple, id));
            }
        }
        members.sort();
        Ok(FanInDescriptor {
            members: members
                .into_iter()
                .enumerate()
                .map(|(order, (_, tuple, id))| FanInMember {
                    id,
                    group: tuple.first().copied().unwrap_or(0),
                    order,
                })
                .collect(),
        })
    }
}

/// Row-major cross product of `0..size` per dimension. A zero size yields
/// no tuples; no dimensions yield the single empty tuple.
fn enumerate_tuples(sizes: &[usize]) -> Vec<Vec<usize>> {
    let axes: Vec<Vec<usize>> = sizes.iter().map(|&n| (0..n).collect()).collect();
    enumerate_axes(&axes)
}

fn enumerate_axes(axes: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let mut tuples: Vec<Vec<usize>> = vec![Vec::new()];
    for axis in axes {
        let mut next = Vec::with_capacity(tuples.len() * axis.len());
        for tuple in &tuples {
            for &value in axis {
                let mut extended = tuple.clone();
                extended.push(value);
                next.push(extended);
            }
        }
        tuples = next;
    }
    tuples
}

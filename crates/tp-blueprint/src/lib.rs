// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Lowering a blueprint tree into the canonical graph.
pub mod compile;
/// Input-source normalization and default seeding.
pub mod inputs;
/// Reading blueprint documents from disk.
pub mod loader;

pub use compile::compile;
pub use inputs::{ensure_required, input_source_map, normalize_input_values, seed_defaults};
pub use loader::load_blueprint;

use thiserror::Error;

/// Errors from blueprint loading and compilation.
#[derive(Debug, Error)]
pub enum BlueprintError {
    /// A document file could not be read.
    #[error("cannot read blueprint at {path}")]
    Io {
        /// Filesystem path.
        path: String,
        /// OS-level cause.
        #[source]
        source: std::io::Error,
    },

    /// A document failed to parse.
    #[error("cannot parse blueprint at {path}: {detail}")]
    Parse {
        /// Filesystem path.
        path: String,
        /// Parser message.
        detail: String,
    },

    /// A document has an unsupported extension.
    #[error("unsupported blueprint extension: {path} (expected .toml, .yaml, or .yml)")]
    UnsupportedExtension {
        /// Filesystem path.
        path: String,
    },

    /// A sub-blueprint reference re-entered a document being loaded.
    #[error("circular sub-blueprint reference via {path}")]
    CircularSubBlueprint {
        /// Filesystem path of the re-entered document.
        path: String,
    },

    /// A child's declared id does not match the reference name.
    #[error("sub-blueprint at {path} declares id {found:?}, referenced as {expected:?}")]
    IdMismatch {
        /// Name the parent used.
        expected: String,
        /// Id the child declares.
        found: String,
        /// Filesystem path of the child.
        path: String,
    },

    /// No file was found for a sub-blueprint reference.
    #[error("sub-blueprint {name:?} not found; tried {tried:?}")]
    MissingSubBlueprint {
        /// Reference name.
        name: String,
        /// Candidate paths probed.
        tried: Vec<String>,
    },

    /// An indexed sub-blueprint reference lacks a count input.
    #[error("sub-blueprint reference {name:?} is indexed but has no countInput")]
    IndexedRefWithoutCount {
        /// Reference name as written.
        name: String,
    },

    /// An edge endpoint does not name a known node.
    #[error("unknown edge endpoint {reference:?} in namespace {namespace:?}")]
    UnknownEndpoint {
        /// Endpoint as written.
        reference: String,
        /// Dotted namespace of the declaring document.
        namespace: String,
    },

    /// An edge endpoint matches more than one node kind.
    #[error("ambiguous edge endpoint {reference:?} in namespace {namespace:?}")]
    AmbiguousEndpoint {
        /// Endpoint as written.
        reference: String,
        /// Dotted namespace of the declaring document.
        namespace: String,
    },

    /// An input endpoint carries index symbols.
    #[error("input endpoint {reference:?} cannot be indexed")]
    IndexOnInput {
        /// Endpoint as written.
        reference: String,
    },

    /// An endpoint carries more index symbols than the node has dimensions.
    #[error("endpoint {reference:?} has {symbols} index symbols but node has {dims} dimensions")]
    TooManyIndices {
        /// Endpoint as written.
        reference: String,
        /// Number of symbols written.
        symbols: usize,
        /// Number of dimensions on the node.
        dims: usize,
    },

    /// The same symbol is driven by two different count inputs.
    #[error("dimension symbol {symbol:?} on {node} is driven by both {first} and {second}")]
    DimensionCountMismatch {
        /// The contended symbol.
        symbol: String,
        /// Node id where the mismatch was found.
        node: String,
        /// First count input seen.
        first: String,
        /// Conflicting count input.
        second: String,
    },

    /// A dimension has no count input to size it.
    #[error("dimension symbol {symbol:?} on {node} has no count input")]
    MissingDimensionCount {
        /// The unsized symbol.
        symbol: String,
        /// Node id.
        node: String,
    },

    /// A count input reference does not name a declared input.
    #[error("count input {input} referenced by {referenced_by} is not declared")]
    UnknownCountInput {
        /// The missing input id.
        input: String,
        /// The declaring node or reference.
        referenced_by: String,
    },

    /// Two upstream inputs target the same downstream input.
    #[error("input {input} has multiple upstream sources")]
    MultipleUpstreamSources {
        /// The contended downstream input id.
        input: String,
    },

    /// Input alias edges form a cycle.
    #[error("input alias cycle through {input}")]
    AliasCycle {
        /// An input on the cycle.
        input: String,
    },

    /// A required input has neither a supplied value nor a default.
    #[error("required input {input} has no value")]
    MissingRequiredInput {
        /// The unset input id.
        input: String,
    },
}

impl BlueprintError {
    /// The taxonomy code for this error. Everything here is caller error.
    #[must_use]
    pub fn error_code(&self) -> tp_error::ErrorCode {
        tp_error::ErrorCode::UserInput
    }
}

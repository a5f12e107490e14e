// SPDX-License-Identifier: MIT OR Apache-2.0
//! Canonical id newtypes.
//!
//! Canonical ids are strings with a kind prefix and a dotted namespace
//! path: `Input:Scene.ImagesPer`, `Producer:ScriptProducer`,
//! `Artifact:ScriptProducer.NarrationScript[segment=1]`. Artefact and
//! producer ids may carry zero-based dimension indices in declared order.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Join a namespace path and a name with dots.
///
/// An empty namespace path yields the bare name.
#[must_use]
pub fn dotted(namespace_path: &[String], name: &str) -> String {
    if namespace_path.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", namespace_path.join("."), name)
    }
}

/// A single dimension index: symbol plus zero-based ordinal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
pub struct DimIndex {
    /// Dimension symbol (e.g. `segment`, `image`, `i`).
    pub symbol: String,
    /// Zero-based ordinal within the dimension.
    pub index: usize,
}

impl DimIndex {
    /// Construct a dimension index.
    pub fn new(symbol: impl Into<String>, index: usize) -> Self {
        Self {
            symbol: symbol.into(),
            index,
        }
    }
}

/// Render indices as `[sym=0][sym2=3]…` in the given order.
#[must_use]
pub fn format_indices(indices: &[DimIndex]) -> String {
    let mut out = String::new();
    for d in indices {
        out.push_str(&format!("[{}={}]", d.symbol, d.index));
    }
    out
}

/// Split a canonical id into its dimensionless base and parsed indices.
///
/// Unparseable bracket groups are left attached to the base.
#[must_use]
pub fn split_indices(id: &str) -> (&str, Vec<DimIndex>) {
    let Some(start) = id.find('[') else {
        return (id, Vec::new());
    };
    let (base, rest) = id.split_at(start);
    let mut indices = Vec::new();
    for group in rest.split(']') {
        let group = group.trim_start_matches('[');
        if group.is_empty() {
            continue;
        }
        let Some((sym, n)) = group.split_once('=') else {
            return (id, Vec::new());
        };
        let Ok(index) = n.parse::<usize>() else {
            return (id, Vec::new());
        };
        indices.push(DimIndex::new(sym, index));
    }
    (base, indices)
}

macro_rules! canonical_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash,
            Serialize, Deserialize, JsonSchema,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// The id kind prefix, including the colon.
            pub const PREFIX: &'static str = $prefix;

            /// Wrap a raw canonical id string.
            ///
            /// The prefix is added if missing so that ids read from user
            /// input and ids built internally compare equal.
            pub fn new(raw: impl Into<String>) -> Self {
                let raw = raw.into();
                if raw.starts_with($prefix) {
                    Self(raw)
                } else {
                    Self(format!("{}{raw}", $prefix))
                }
            }

            /// Build an id from a namespace path and a declared name.
            #[must_use]
            pub fn from_parts(namespace_path: &[String], name: &str) -> Self {
                Self(format!("{}{}", $prefix, dotted(namespace_path, name)))
            }

            /// The full canonical string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// The id without its kind prefix.
            #[must_use]
            pub fn path(&self) -> &str {
                &self.0[$prefix.len()..]
            }

            /// The id with any dimension indices stripped.
            #[must_use]
            pub fn base(&self) -> Self {
                let (base, _) = split_indices(&self.0);
                Self(base.to_string())
            }

            /// Parsed dimension indices, in declared order.
            #[must_use]
            pub fn indices(&self) -> Vec<DimIndex> {
                split_indices(&self.0).1
            }

            /// A copy of this id with the given indices appended.
            #[must_use]
            pub fn with_indices(&self, indices: &[DimIndex]) -> Self {
                let (base, _) = split_indices(&self.0);
                Self(format!("{base}{}", format_indices(indices)))
            }

            /// The declared name: the last dotted segment of the base id.
            #[must_use]
            pub fn name(&self) -> &str {
                let (base, _) = split_indices(&self.0);
                let path = &base[$prefix.len()..];
                path.rsplit('.').next().unwrap_or(path)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

canonical_id!(
    /// Canonical id of a user-editable input (`Input:…`).
    InputId,
    "Input:"
);
canonical_id!(
    /// Canonical id of a produced artefact instance (`Artifact:…[dim=n]…`).
    ArtifactId,
    "Artifact:"
);
canonical_id!(
    /// Canonical id of a producer instance (`Producer:…[dim=n]…`).
    ProducerId,
    "Producer:"
);

/// `true` if the raw id string is an input id.
#[must_use]
pub fn is_input_id(raw: &str) -> bool {
    raw.starts_with(InputId::PREFIX)
}

/// `true` if the raw id string is an artefact id.
#[must_use]
pub fn is_artifact_id(raw: &str) -> bool {
    raw.starts_with(ArtifactId::PREFIX)
}

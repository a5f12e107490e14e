// SPDX-License-Identifier: MIT OR Apache-2.0
//! Ordered per-movie revision identifiers.
//!
//! Revisions are written `rev-NNNN`: the `rev-` prefix followed by the
//! decimal revision number zero-padded to at least four digits. The width
//! grows past four digits on overflow. `rev-0000` means "no committed
//! revision".

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A monotonically increasing revision identifier, totally ordered per movie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, JsonSchema)]
#[schemars(with = "String")]
pub struct Revision(u64);

impl Revision {
    /// The "no committed revision" sentinel, `rev-0000`.
    pub const ZERO: Revision = Revision(0);

    /// Construct from a raw revision number.
    #[must_use]
    pub fn new(n: u64) -> Self {
        Self(n)
    }

    /// The numeric revision value.
    #[must_use]
    pub fn number(&self) -> u64 {
        self.0
    }

    /// The next revision in sequence.
    #[must_use]
    pub fn next(&self) -> Revision {
        Revision(self.0 + 1)
    }

    /// `true` for [`Revision::ZERO`].
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rev-{:04}", self.0)
    }
}

/// Failure to parse a textual revision identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid revision identifier: {text:?}")]
pub struct RevisionParseError {
    /// The offending text.
    pub text: String,
}

impl FromStr for Revision {
    type Err = RevisionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("rev-").ok_or_else(|| RevisionParseError {
            text: s.to_string(),
        })?;
        if digits.len() < 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(RevisionParseError {
                text: s.to_string(),
            });
        }
        let n = digits.parse::<u64>().map_err(|_| RevisionParseError {
            text: s.to_string(),
        })?;
        Ok(Revision(n))
    }
}

impl Serialize for Revision {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Revision {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

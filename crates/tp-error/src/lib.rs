// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Disposition
// ---------------------------------------------------------------------------

/// How a caller is expected to react to an error of a given kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Surface verbatim to the caller; no retry.
    Surface,
    /// Retry up to the configured attempt budget, then record a failure.
    Retry,
    /// Record the failure as an artefact event; downstream jobs skip.
    RecordAndSkip,
    /// Internal to the core; callers substitute a default (e.g. an empty
    /// manifest on the first run of a movie).
    Synthesize,
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code.
///
/// Each variant serializes to a `SCREAMING_SNAKE_CASE` string that will not
/// change across patch releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed blueprint, missing required input, contradictory CLI flags.
    UserInput,
    /// The producer graph contains a dependency cycle.
    Cycle,
    /// No config/storage root exists yet; `init` has not been run.
    NotInitialized,
    /// No committed manifest pointer for a movie yet.
    ManifestNotFound,
    /// An event log line failed to parse.
    EventLogCorrupt,
    /// An artefact's blob hash is not present in the blob store.
    BlobMissing,
    /// A producer threw or timed out; eligible for retry.
    ProviderTransient,
    /// A producer reported a non-retryable failure.
    ProviderPermanent,
    /// A run was cancelled cooperatively.
    Cancelled,
    /// Two planners raced for the same movie.
    Concurrency,
}

impl ErrorCode {
    /// Stable `&'static str` representation (e.g. `"MANIFEST_NOT_FOUND"`).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserInput => "USER_INPUT",
            Self::Cycle => "CYCLE",
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::ManifestNotFound => "MANIFEST_NOT_FOUND",
            Self::EventLogCorrupt => "EVENT_LOG_CORRUPT",
            Self::BlobMissing => "BLOB_MISSING",
            Self::ProviderTransient => "PROVIDER_TRANSIENT",
            Self::ProviderPermanent => "PROVIDER_PERMANENT",
            Self::Cancelled => "CANCELLED",
            Self::Concurrency => "CONCURRENCY",
        }
    }

    /// The expected caller reaction for this code.
    #[must_use]
    pub fn disposition(&self) -> Disposition {
        match self {
            Self::UserInput
            | Self::Cycle
            | Self::NotInitialized
            | Self::EventLogCorrupt
            | Self::Concurrency => Disposition::Surface,
            Self::ManifestNotFound => Disposition::Synthesize,
            Self::ProviderTransient => Disposition::Retry,
            Self::BlobMissing | Self::ProviderPermanent | Self::Cancelled => {
                Disposition::RecordAndSkip
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TpError
// ---------------------------------------------------------------------------

/// Unified Tutopanda error.
///
/// Carries a stable [`ErrorCode`], a human-readable message, an optional
/// source error for cause-chaining, and arbitrary structured context.
///
/// # Builder usage
///
/// ```
/// use tp_error::{ErrorCode, TpError};
///
/// let err = TpError::new(ErrorCode::BlobMissing, "artefact payload not on disk")
///     .with_context("movie", "darwin-01")
///     .with_context("hash", "ab12…");
/// ```
pub struct TpError {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Optional underlying cause.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Arbitrary structured context for diagnostics.
    pub context: BTreeMap<String, serde_json::Value>,
}

impl TpError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
            context: BTreeMap::new(),
        }
    }

    /// Attach a key-value pair to the diagnostic context.
    ///
    /// The value is converted via [`serde_json::to_value`]; if serialization
    /// fails the entry is silently skipped.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Attach an underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Shorthand for `self.code.disposition()`.
    #[must_use]
    pub fn disposition(&self) -> Disposition {
        self.code.disposition()
    }
}

impl fmt::Debug for TpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("TpError");
        d.field("code", &self.code);
        d.field("message", &self.message);
        if let Some(ref src) = self.source {
            d.field("source", &src.to_string());
        }
        if !self.context.is_empty() {
            d.field("context", &self.context);
        }
        d.finish()
    }
}

impl fmt::Display for TpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)?;
        if !self.context.is_empty() {
            // Deterministic output thanks to BTreeMap.
            if let Ok(ctx) = serde_json::to_string(&self.context) {
                write!(f, " {ctx}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for TpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

// ---------------------------------------------------------------------------
// Serialization support
// ---------------------------------------------------------------------------

/// Serializable snapshot of a [`TpError`] (without the opaque source).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TpErrorDto {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Structured context.
    pub context: BTreeMap<String, serde_json::Value>,
    /// String representation of the source error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_message: Option<String>,
}

impl From<&TpError> for TpErrorDto {
    fn from(err: &TpError) -> Self {
        Self {
            code: err.code,
            message: err.message.clone(),
            context: err.context.clone(),
            source_message: err.source.as_ref().map(|s| s.to_string()),
        }
    }
}

impl From<TpErrorDto> for TpError {
    fn from(dto: TpErrorDto) -> Self {
        Self {
            code: dto.code,
            message: dto.message,
            source: None,
            context: dto.context,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::io;

    const ALL_CODES: &[ErrorCode] = &[
        ErrorCode::UserInput,
        ErrorCode::Cycle,
        ErrorCode::NotInitialized,
        ErrorCode::ManifestNotFound,
        ErrorCode::EventLogCorrupt,
        ErrorCode::BlobMissing,
        ErrorCode::ProviderTransient,
        ErrorCode::ProviderPermanent,
        ErrorCode::Cancelled,
        ErrorCode::Concurrency,
    ];

    #[test]
    fn basic_construction() {
        let err = TpError::new(ErrorCode::Cycle, "A -> B -> A");
        assert_eq!(err.code, ErrorCode::Cycle);
        assert_eq!(err.message, "A -> B -> A");
        assert!(err.source.is_none());
        assert!(err.context.is_empty());
    }

    #[test]
    fn display_without_context() {
        let err = TpError::new(ErrorCode::ManifestNotFound, "no pointer yet");
        assert_eq!(err.to_string(), "[MANIFEST_NOT_FOUND] no pointer yet");
    }

    #[test]
    fn display_with_context() {
        let err = TpError::new(ErrorCode::Concurrency, "movie locked")
            .with_context("movie", "darwin-01");
        let s = err.to_string();
        assert!(s.starts_with("[CONCURRENCY] movie locked"));
        assert!(s.contains("darwin-01"));
    }

    #[test]
    fn builder_with_source() {
        let src = io::Error::new(io::ErrorKind::NotFound, "blob gone");
        let err = TpError::new(ErrorCode::BlobMissing, "missing").with_source(src);
        let chained = std::error::Error::source(&err).unwrap();
        assert_eq!(chained.to_string(), "blob gone");
    }

    #[test]
    fn dispositions_match_taxonomy() {
        assert_eq!(ErrorCode::UserInput.disposition(), Disposition::Surface);
        assert_eq!(ErrorCode::Cycle.disposition(), Disposition::Surface);
        assert_eq!(
            ErrorCode::ManifestNotFound.disposition(),
            Disposition::Synthesize
        );
        assert_eq!(
            ErrorCode::ProviderTransient.disposition(),
            Disposition::Retry
        );
        assert_eq!(
            ErrorCode::ProviderPermanent.disposition(),
            Disposition::RecordAndSkip
        );
        assert_eq!(
            ErrorCode::Cancelled.disposition(),
            Disposition::RecordAndSkip
        );
        assert_eq!(ErrorCode::Concurrency.disposition(), Disposition::Surface);
    }

    #[test]
    fn all_codes_have_unique_as_str() {
        let mut seen = HashSet::new();
        for code in ALL_CODES {
            assert!(seen.insert(code.as_str()), "duplicate: {code:?}");
        }
        assert_eq!(seen.len(), ALL_CODES.len());
    }

    #[test]
    fn serde_uses_stable_strings() {
        for code in ALL_CODES {
            let json = serde_json::to_string(code).unwrap();
            assert_eq!(json, format!(r#""{}""#, code.as_str()));
            let back: ErrorCode = serde_json::from_str(&json).unwrap();
            assert_eq!(&back, code);
        }
    }

    #[test]
    fn dto_roundtrip() {
        let err = TpError::new(ErrorCode::EventLogCorrupt, "bad line")
            .with_context("line", 42)
            .with_source(io::Error::other("parse"));
        let dto: TpErrorDto = (&err).into();
        assert_eq!(dto.source_message.as_deref(), Some("parse"));
        let json = serde_json::to_string(&dto).unwrap();
        let back: TpErrorDto = serde_json::from_str(&json).unwrap();
        assert_eq!(dto, back);
        let restored: TpError = back.into();
        assert_eq!(restored.code, ErrorCode::EventLogCorrupt);
        assert!(restored.source.is_none());
    }
}

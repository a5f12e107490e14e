// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default config filename, resolved against the working directory.
pub const CONFIG_FILE: &str = "tutopanda.toml";

/// Default runner concurrency when the config does not set one.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Errors from configuration handling.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No config file exists yet.
    #[error("no configuration found at {path}; run `tutopanda init` first")]
    NotInitialized {
        /// Path that was probed.
        path: String,
    },

    /// The file could not be parsed as valid TOML.
    #[error("failed to parse {path}: {reason}")]
    ParseError {
        /// Path of the offending file.
        path: String,
        /// Parser message.
        reason: String,
    },

    /// The file could not be read or written.
    #[error("config i/o failed for {path}")]
    Io {
        /// Path of the offending file.
        path: String,
        /// OS-level cause.
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    /// The taxonomy code for this error.
    #[must_use]
    pub fn error_code(&self) -> tp_error::ErrorCode {
        match self {
            Self::NotInitialized { .. } => tp_error::ErrorCode::NotInitialized,
            _ => tp_error::ErrorCode::UserInput,
        }
    }
}

/// Persistent settings of the `tutopanda` CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TutopandaConfig {
    /// Directory all movie state lives under.
    pub storage_root: PathBuf,

    /// Runner concurrency when `--concurrency` is not given.
    #[serde(default = "default_concurrency")]
    pub default_concurrency: usize,

    /// Movie id of the most recent successful `generate`, for `--last`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_movie_id: Option<String>,
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

impl TutopandaConfig {
    /// A fresh config rooted at the given storage directory.
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
            default_concurrency: DEFAULT_CONCURRENCY,
            last_movie_id: None,
        }
    }

    /// Load the config from `path`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::NotInitialized`] when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotInitialized {
                    path: path.display().to_string(),
                });
            }
            Err(e) => {
                return Err(ConfigError::Io {
                    path: path.display().to_string(),
                    source: e,
                });
            }
        };
        toml::from_str(&text).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Persist the config at `path` (temp-then-rename).
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        };
        let text = toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
            }
        }
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, text).map_err(io_err)?;
        std::fs::rename(&tmp, path).map_err(io_err)?;
        Ok(())
    }
}

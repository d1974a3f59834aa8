//! Error taxonomy for the documentation pipeline.
//!
//! Every error here is scoped to a single file or step. None of them aborts
//! a run: the walk skips unreadable entries, the cache falls back to an empty
//! snapshot, and inference failures become per-file [`TaskFailure`]s.
//!
//! [`TaskFailure`]: crate::models::TaskFailure

use std::path::PathBuf;

use thiserror::Error;

/// Problems building the ignore filter or walking the repository.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("invalid ignore pattern '{pattern}': {source}")]
    IgnorePattern {
        pattern: String,
        #[source]
        source: ignore::Error,
    },

    #[error("invalid exclude glob '{pattern}': {source}")]
    Glob {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("failed to read ignore file {path}: {source}")]
    IgnoreFile {
        path: PathBuf,
        #[source]
        source: ignore::Error,
    },

    #[error("unreadable entry during walk: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("repository root does not exist: {0}")]
    MissingRoot(PathBuf),
}

/// Problems loading or persisting the change-detection cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache snapshot {path} is unreadable: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache snapshot {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cache snapshot {path} has unsupported version {found}")]
    Version { path: PathBuf, found: u32 },

    #[error("failed to persist cache snapshot {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize cache snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failure of a single call to the inference service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InferenceError {
    /// Timeouts, rate limiting, server errors, dropped connections. Retried.
    #[error("transient inference error: {0}")]
    Transient(String),

    /// Bad request, authentication failure, unusable response. Never retried.
    #[error("permanent inference error: {0}")]
    Permanent(String),
}

impl InferenceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, InferenceError::Transient(_))
    }
}

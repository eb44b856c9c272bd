//! Error taxonomy for a run.
//!
//! Only `RootUnreadable` stops a run; every other variant is scoped to one
//! model file and is counted in the summary.

use std::path::PathBuf;

use thiserror::Error;

/// Why a single model file (or the run) could not be pushed.
#[derive(Debug, Error)]
pub enum InjectError {
    /// The file could not be read.
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not a usable model (bad JSON, bad `_metadata`).
    #[error("malformed model {path:?}: {source}")]
    MalformedInput {
        path: PathBuf,
        #[source]
        source: ParseError,
    },

    /// The store rejected a write; remaining writes for the file are skipped.
    #[error("store rejected write to {target}: {source}")]
    Store {
        target: String,
        #[source]
        source: StoreError,
    },

    /// The app directory is missing or cannot be walked.
    #[error("app directory {path:?} is not readable: {reason}")]
    RootUnreadable { path: PathBuf, reason: String },
}

/// Problems found while turning raw JSON into a parsed model.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("top-level value must be a JSON object")]
    NotAnObject,

    #[error("invalid _metadata: {0}")]
    Metadata(String),
}

/// Failures reported by a `DocumentStore`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend: {0}")]
    Backend(#[from] rusqlite::Error),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid document path: {0}")]
    InvalidPath(String),

    /// Refused by the store itself, e.g. a permission rule.
    #[error("write rejected: {0}")]
    Rejected(String),
}

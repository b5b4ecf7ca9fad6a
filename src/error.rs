//! Error taxonomy for the retrieval core.
//!
//! The core never swallows a [`Error::DimensionMismatch`] or
//! [`Error::NotFound`]; both are fatal to the call that produced them and
//! leave prior state unchanged. External service failures are surfaced to
//! the caller as [`Error::Embedding`] / [`Error::Generation`] and are not
//! retried here (the HTTP providers retry transient statuses themselves).
//! An empty search result is not an error.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Document count, embedding row count, or vector dimensionality
    /// disagree. The index is left exactly as it was before the call.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A required persisted artifact is missing on load.
    #[error("required index artifact not found: {}", .0.display())]
    NotFound(PathBuf),

    /// A persisted artifact exists but cannot be decoded.
    #[error("invalid index artifact: {0}")]
    InvalidArtifact(String),

    /// No agent matches the requested name and no default is registered.
    #[error("no agent registered")]
    NoAgentRegistered,

    /// The embedding service call failed.
    #[error("embedding service error: {0}")]
    Embedding(String),

    /// The generation service call failed.
    #[error("generation service error: {0}")]
    Generation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

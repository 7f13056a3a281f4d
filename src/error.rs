//! Error types for attractor.

use thiserror::Error;

/// Errors that can occur while analyzing or compressing a vector sequence.
///
/// Every stage either returns a fully valid result or one of these. Nothing is
/// retried: all computations are deterministic, so a retry reproduces the error.
#[derive(Debug, Error)]
pub enum AttractorError {
    /// A zero-norm vector where cosine similarity needs a direction.
    #[error("degenerate vector at index {index}: zero norm")]
    DegenerateVector { index: usize },

    /// Fewer than two usable (r, C(r)) samples after the saturation guards.
    #[error("insufficient scaling region: {usable} usable samples (need at least 2)")]
    InsufficientScalingRegion { usable: usize },

    /// Requested more principal directions than the data supports.
    #[error("insufficient rank: requested {requested} components, data supports at most {max_rank}")]
    InsufficientRank { requested: usize, max_rank: usize },

    /// Invalid parameter value, rejected before any computation.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A vector whose length differs from the sequence dimension.
    #[error("dimension mismatch at index {index}: expected {expected}, got {actual}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },

    /// The input contained no vectors (or zero-dimensional ones).
    #[error("empty sequence")]
    EmptySequence,

    /// A NaN or infinite component.
    #[error("non-finite component in vector {index}")]
    NonFinite { index: usize },

    /// Too few vectors for the requested operation.
    #[error("sequence too short: need at least {required} vectors, got {actual}")]
    TooShort { required: usize, actual: usize },

    /// I/O error while loading vectors or writing a report.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AttractorError {
    /// Shorthand for a [`AttractorError::Configuration`] error.
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, AttractorError>;

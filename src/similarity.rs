//! Consecutive cosine similarity.
//!
//! The single number that predicts whether delta encoding will pay off: if
//! neighbouring embeddings point in nearly the same direction, their
//! differences are small and quantize cheaply.
//!
//! ```text
//! sim(i) = <v[i], v[i+1]> / (|v[i]| |v[i+1]|),   i = 0..N-2
//! ```
//!
//! A zero vector has no direction, so the similarity is undefined and the
//! analysis fails with [`AttractorError::DegenerateVector`] instead of
//! reporting NaN or a silent 0.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::distance;
use crate::error::{AttractorError, Result};
use crate::sequence::VectorSequence;

/// Similarity analysis configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimilarityConfig {
    /// Keep the full ordered series of N-1 values (default: false).
    pub keep_values: bool,
}

/// Result of consecutive-similarity analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityReport {
    /// Arithmetic mean over all consecutive pairs.
    pub mean: f64,
    /// Smallest pair similarity.
    pub min: f64,
    /// Largest pair similarity.
    pub max: f64,
    /// Number of consecutive pairs (N-1).
    pub pair_count: usize,
    /// Ordered per-pair values, when requested.
    pub values: Option<Vec<f64>>,
}

/// Cosine similarity of a single pair.
///
/// `index` is reported in the error when `a` has zero norm; `index + 1` when
/// only `b` does.
pub fn cosine_similarity(a: &[f32], b: &[f32], index: usize) -> Result<f64> {
    if distance::norm(a) == 0.0 {
        return Err(AttractorError::DegenerateVector { index });
    }
    distance::cosine(a, b).ok_or(AttractorError::DegenerateVector { index: index + 1 })
}

/// Compute cosine similarity between every consecutive pair.
///
/// # Errors
///
/// - [`AttractorError::TooShort`] when N < 2.
/// - [`AttractorError::DegenerateVector`] with the lowest offending index when
///   any vector in the sequence has zero norm.
pub fn consecutive_similarity(
    seq: &VectorSequence,
    config: &SimilarityConfig,
) -> Result<SimilarityReport> {
    seq.require_len(2)?;
    let pair_count = seq.len() - 1;

    let pair = |i: usize| cosine_similarity(seq.get(i), seq.get(i + 1), i);

    #[cfg(feature = "parallel")]
    let values: Result<Vec<f64>> = (0..pair_count).into_par_iter().map(pair).collect();
    #[cfg(not(feature = "parallel"))]
    let values: Result<Vec<f64>> = (0..pair_count).map(pair).collect();

    // rayon may surface any failing pair; report the first one in sequence order.
    let values = match values {
        Ok(v) => v,
        Err(_) => {
            let index = seq
                .iter()
                .position(|v| distance::norm(v) == 0.0)
                .unwrap_or(0);
            return Err(AttractorError::DegenerateVector { index });
        }
    };

    let mean = values.iter().sum::<f64>() / pair_count as f64;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    debug!(pairs = pair_count, mean, min, max, "consecutive similarity");

    Ok(SimilarityReport {
        mean,
        min,
        max,
        pair_count,
        values: config.keep_values.then_some(values),
    })
}

//! Inter-vector differential (delta) encoding.
//!
//! ```text
//! delta[0] = reduced[0]                     (baseline, no predecessor)
//! delta[i] = reduced[i] - reduced[i - 1]    (i >= 1)
//! ```
//!
//! Consecutive embeddings sit close together on the manifold, so the deltas
//! are small with a narrow dynamic range, which is what lets the quantizer
//! spend few bits on them. [`DeltaStats`] measures exactly that.
//!
//! Decoding is a running sum and inverts encoding up to `f64` rounding.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::pca::ReducedSequence;

/// Upper edges of the |Δ| histogram buckets; the last bucket is open.
pub const MAGNITUDE_BUCKETS: [f64; 7] = [0.0, 0.001, 0.01, 0.05, 0.1, 0.5, 1.0];

/// Per-index deltas of a reduced sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaSequence {
    /// N delta vectors of dimension K.
    pub deltas: Vec<Vec<f64>>,
}

impl DeltaSequence {
    /// Delta-encode the reduced vectors of a PCA run.
    pub fn encode(reduced: &ReducedSequence) -> Self {
        Self::from_vectors(&reduced.vectors)
    }

    /// Delta-encode an arbitrary ordered list of equal-length vectors.
    pub fn from_vectors(vectors: &[Vec<f64>]) -> Self {
        let delta_at = |i: usize| -> Vec<f64> {
            if i == 0 {
                vectors[0].clone()
            } else {
                vectors[i]
                    .iter()
                    .zip(&vectors[i - 1])
                    .map(|(cur, prev)| cur - prev)
                    .collect()
            }
        };

        #[cfg(feature = "parallel")]
        let deltas = (0..vectors.len()).into_par_iter().map(delta_at).collect();
        #[cfg(not(feature = "parallel"))]
        let deltas = (0..vectors.len()).map(delta_at).collect();

        Self { deltas }
    }

    /// Number of deltas (N).
    #[inline]
    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    /// True for an empty sequence.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    /// Delta dimension (K), 0 when empty.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.deltas.first().map(Vec::len).unwrap_or(0)
    }

    /// Accumulate deltas back into absolute vectors.
    pub fn decode(&self) -> Vec<Vec<f64>> {
        let mut out: Vec<Vec<f64>> = Vec::with_capacity(self.deltas.len());
        for delta in &self.deltas {
            let next = match out.last() {
                None => delta.clone(),
                Some(prev) => prev.iter().zip(delta).map(|(p, d)| p + d).collect(),
            };
            out.push(next);
        }
        out
    }

    /// Magnitude statistics of the inter-vector deltas.
    pub fn stats(&self) -> DeltaStats {
        DeltaStats::from_deltas(self)
    }
}

/// Distribution of delta components, excluding the baseline row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaStats {
    /// Number of components summarized.
    pub count: usize,
    /// Mean of the signed components.
    pub mean: f64,
    /// Mean of |Δ|.
    pub mean_abs: f64,
    /// Median of |Δ|.
    pub median_abs: f64,
    /// 95th percentile of |Δ|.
    pub p95_abs: f64,
    /// Largest |Δ|.
    pub max_abs: f64,
    /// Counts per [`MAGNITUDE_BUCKETS`] bucket (last bucket is `[1, ∞)`).
    pub histogram: Vec<usize>,
}

impl DeltaStats {
    /// Summarize `deltas[1..]`. With fewer than two deltas every statistic is
    /// zero.
    pub fn from_deltas(deltas: &DeltaSequence) -> Self {
        let signed: Vec<f64> = deltas.deltas.iter().skip(1).flatten().copied().collect();
        let mut histogram = vec![0usize; MAGNITUDE_BUCKETS.len()];

        if signed.is_empty() {
            return Self {
                count: 0,
                mean: 0.0,
                mean_abs: 0.0,
                median_abs: 0.0,
                p95_abs: 0.0,
                max_abs: 0.0,
                histogram,
            };
        }

        let count = signed.len();
        let mut mags: Vec<f64> = signed.iter().map(|x| x.abs()).collect();
        mags.sort_unstable_by(f64::total_cmp);

        for &m in &mags {
            // Index of the last bucket edge <= m.
            let bucket = MAGNITUDE_BUCKETS.partition_point(|&edge| edge <= m).saturating_sub(1);
            histogram[bucket] += 1;
        }

        let p95_idx = ((count as f64 * 0.95) as usize).min(count - 1);
        Self {
            count,
            mean: signed.iter().sum::<f64>() / count as f64,
            mean_abs: mags.iter().sum::<f64>() / count as f64,
            median_abs: mags[count / 2],
            p95_abs: mags[p95_idx],
            max_abs: mags[count - 1],
            histogram,
        }
    }
}

//! Dynamical-systems diagnostics for embedding trajectories.
//!
//! The correlation dimension says how many degrees of freedom the sequence
//! occupies; the maximum Lyapunov exponent says whether nearby states drift
//! apart (λ₁ > 0, chaotic) or converge (λ₁ < 0). Together they give a coarse
//! verdict on whether the sequence behaves like a strange attractor, and how
//! much room a low-dimensional description has compared with the ambient
//! dimension.
//!
//! # Lyapunov estimate
//!
//! For evenly spaced reference indices `i`, find the nearest neighbour `j`
//! (outside a temporal exclusion window) and follow both trajectories:
//!
//! ```text
//! λ(i) = mean over t = 1..horizon of  ln(d(i+t, j+t) / d(i, j)) / t
//! λ₁   = mean over references of λ(i)
//! ```
//!
//! The result is an exponent per sequence step. Saturation at the attractor
//! size pulls the estimate toward zero for long horizons, so it is a sign
//! test more than a precise rate.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::correlation::{self, CorrelationConfig};
use crate::distance;
use crate::error::{AttractorError, Result};
use crate::sequence::VectorSequence;

/// Separations at or below this are treated as identical states.
const MIN_SEPARATION: f64 = 1e-6;

/// Smallest D2 for which a compression potential is reported.
const MIN_POTENTIAL_D2: f64 = 0.1;

/// Parameters for [`max_lyapunov_exponent`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LyapunovConfig {
    /// Number of reference trajectories (default: 50).
    pub reference_points: usize,
    /// Steps each pair is followed (default: 20).
    pub horizon: usize,
    /// Neighbours closer than this many steps in time are skipped (default: 0).
    pub theiler_window: usize,
    /// Cap on the number of vectors considered (default: 1000).
    pub max_points: Option<usize>,
}

impl Default for LyapunovConfig {
    fn default() -> Self {
        Self {
            reference_points: 50,
            horizon: 20,
            theiler_window: 0,
            max_points: Some(1000),
        }
    }
}

impl LyapunovConfig {
    /// Reject invalid parameters.
    pub fn validate(&self) -> Result<()> {
        if self.reference_points == 0 {
            return Err(AttractorError::config("reference_points must be positive"));
        }
        if self.horizon == 0 {
            return Err(AttractorError::config("horizon must be positive"));
        }
        if let Some(cap) = self.max_points {
            if cap < self.horizon + 2 {
                return Err(AttractorError::config(format!(
                    "max_points ({cap}) must exceed horizon + 1 ({})",
                    self.horizon + 1
                )));
            }
        }
        Ok(())
    }
}

/// Result of a Lyapunov estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LyapunovEstimate {
    /// Maximum Lyapunov exponent per step; 0.0 when no reference qualified.
    pub lambda: f64,
    /// References that contributed.
    pub references_used: usize,
}

/// Nearest neighbour of `i` among `0..limit`, excluding the temporal window.
fn nearest_neighbour(seq: &VectorSequence, i: usize, limit: usize, window: usize) -> Option<(usize, f64)> {
    let a = seq.get(i);
    (0..limit)
        .filter(|&j| j.abs_diff(i) > window)
        .map(|j| (j, distance::l2_distance(a, seq.get(j))))
        .filter(|&(_, d)| d > MIN_SEPARATION)
        .min_by(|x, y| x.1.total_cmp(&y.1))
}

fn reference_rate(seq: &VectorSequence, i: usize, config: &LyapunovConfig, n: usize) -> Option<f64> {
    let limit = n - config.horizon;
    let (j, d0) = nearest_neighbour(seq, i, limit, config.theiler_window)?;

    let mut sum = 0.0;
    let mut steps = 0usize;
    for t in 1..=config.horizon {
        if i + t >= n || j + t >= n {
            break;
        }
        let dt = distance::l2_distance(seq.get(i + t), seq.get(j + t));
        if dt > MIN_SEPARATION {
            sum += (dt / d0).ln() / t as f64;
            steps += 1;
        }
    }
    (steps > 0).then(|| sum / steps as f64)
}

/// Estimate the maximum Lyapunov exponent of the sequence.
///
/// # Errors
///
/// - [`AttractorError::Configuration`] for invalid parameters.
/// - [`AttractorError::TooShort`] when the (capped) sequence has fewer than
///   `horizon + 2` vectors.
pub fn max_lyapunov_exponent(seq: &VectorSequence, config: &LyapunovConfig) -> Result<LyapunovEstimate> {
    config.validate()?;
    let n = config.max_points.map_or(seq.len(), |cap| seq.len().min(cap));
    let required = config.horizon + 2;
    if n < required {
        return Err(AttractorError::TooShort {
            required,
            actual: n,
        });
    }

    let limit = n - config.horizon;
    let step = (limit / config.reference_points).max(1);
    let references: Vec<usize> = (0..limit).step_by(step).collect();

    let rate = |&i: &usize| reference_rate(seq, i, config, n);

    #[cfg(feature = "parallel")]
    let rates: Vec<f64> = references.par_iter().filter_map(rate).collect();
    #[cfg(not(feature = "parallel"))]
    let rates: Vec<f64> = references.iter().filter_map(rate).collect();

    if rates.is_empty() {
        warn!(references = references.len(), "no reference trajectory had a usable neighbour");
        return Ok(LyapunovEstimate {
            lambda: 0.0,
            references_used: 0,
        });
    }

    let lambda = rates.iter().sum::<f64>() / rates.len() as f64;
    debug!(lambda, references = rates.len(), "lyapunov exponent");
    Ok(LyapunovEstimate {
        lambda,
        references_used: rates.len(),
    })
}

/// Time-delay (Takens) embedding.
///
/// Point `i` concatenates `v[i], v[i + delay], ..., v[i + (m-1)·delay]`, giving
/// `N - (m-1)·delay` points of dimension `m·D`.
///
/// # Errors
///
/// - [`AttractorError::Configuration`] when `delay` or `embed_dim` is zero.
/// - [`AttractorError::TooShort`] when no complete point fits.
pub fn delay_embedding(seq: &VectorSequence, delay: usize, embed_dim: usize) -> Result<VectorSequence> {
    if delay == 0 || embed_dim == 0 {
        return Err(AttractorError::config(format!(
            "delay and embedding dimension must be positive, got delay={delay}, m={embed_dim}"
        )));
    }
    let span = delay * (embed_dim - 1);
    seq.require_len(span + 1)?;

    let count = seq.len() - span;
    let mut data = Vec::with_capacity(count * embed_dim * seq.dimension());
    for i in 0..count {
        for lag in 0..embed_dim {
            data.extend_from_slice(seq.get(i + lag * delay));
        }
    }
    VectorSequence::from_flat(data, embed_dim * seq.dimension())
}

/// Combined attractor verdict.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttractorDiagnosis {
    /// Correlation dimension.
    pub d2: f64,
    /// Maximum Lyapunov exponent per step.
    pub lyapunov: f64,
    /// Ambient dimension D.
    pub embedding_dimension: usize,
    /// D2 below the ambient dimension and λ₁ > 0.
    pub is_chaotic: bool,
    /// D / D2, when D2 is large enough to be meaningful.
    pub compression_potential: Option<f64>,
}

impl AttractorDiagnosis {
    /// Assemble a verdict from already computed estimates.
    pub fn from_estimates(d2: f64, lyapunov: f64, embedding_dimension: usize) -> Self {
        let is_chaotic = d2 < embedding_dimension as f64 && lyapunov > 0.0;
        let compression_potential =
            (d2 > MIN_POTENTIAL_D2).then(|| embedding_dimension as f64 / d2);
        Self {
            d2,
            lyapunov,
            embedding_dimension,
            is_chaotic,
            compression_potential,
        }
    }
}

/// Estimate D2 and λ₁ and combine them.
pub fn diagnose(
    seq: &VectorSequence,
    correlation_config: &CorrelationConfig,
    lyapunov_config: &LyapunovConfig,
) -> Result<AttractorDiagnosis> {
    let analysis = correlation::estimate_correlation_dimension(seq, correlation_config)?;
    let lyapunov = max_lyapunov_exponent(seq, lyapunov_config)?;
    let diagnosis =
        AttractorDiagnosis::from_estimates(analysis.estimate.d2, lyapunov.lambda, seq.dimension());
    debug!(
        d2 = diagnosis.d2,
        lambda = diagnosis.lyapunov,
        chaotic = diagnosis.is_chaotic,
        "attractor diagnosis"
    );
    Ok(diagnosis)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contracting(n: usize, dim: usize) -> VectorSequence {
        let mut current = vec![1.0f32; dim];
        let mut data = Vec::with_capacity(n * dim);
        for _ in 0..n {
            data.extend_from_slice(&current);
            current.iter_mut().for_each(|x| *x *= 0.95);
        }
        VectorSequence::from_flat(data, dim).unwrap()
    }

    fn logistic(n: usize) -> VectorSequence {
        let mut x = 0.1234f64;
        let data = (0..n)
            .map(|_| {
                x = 4.0 * x * (1.0 - x);
                x as f32
            })
            .collect();
        VectorSequence::from_flat(data, 1).unwrap()
    }

    #[test]
    fn contracting_sequence_has_negative_exponent() {
        let est = max_lyapunov_exponent(&contracting(200, 5), &LyapunovConfig::default()).unwrap();
        assert!(est.references_used > 0);
        assert!(est.lambda < 0.0, "lambda = {}", est.lambda);
        // Each step shrinks separations by 5%.
        assert!((est.lambda - 0.95f64.ln()).abs() < 0.01);
    }

    #[test]
    fn logistic_map_has_positive_exponent() {
        let est = max_lyapunov_exponent(&logistic(1000), &LyapunovConfig::default()).unwrap();
        assert!(est.lambda > 0.1, "lambda = {}", est.lambda);
    }

    #[test]
    fn short_sequence_rejected() {
        let err = max_lyapunov_exponent(&contracting(10, 2), &LyapunovConfig::default()).unwrap_err();
        assert!(matches!(err, AttractorError::TooShort { required: 22, actual: 10 }));
    }

    #[test]
    fn constant_sequence_yields_zero() {
        let seq = VectorSequence::from_flat(vec![0.5; 60], 2).unwrap();
        let est = max_lyapunov_exponent(&seq, &LyapunovConfig::default()).unwrap();
        assert_eq!(est.references_used, 0);
        assert_eq!(est.lambda, 0.0);
    }

    #[test]
    fn delay_embedding_shape() {
        let seq = VectorSequence::from_flat((0..20).map(|x| x as f32).collect(), 2).unwrap();
        let embedded = delay_embedding(&seq, 2, 3).unwrap();
        // 10 vectors, span 4 -> 6 points of dimension 6.
        assert_eq!(embedded.len(), 6);
        assert_eq!(embedded.dimension(), 6);
        assert_eq!(embedded.get(0), &[0.0, 1.0, 4.0, 5.0, 8.0, 9.0]);
        assert_eq!(embedded.get(5), &[10.0, 11.0, 14.0, 15.0, 18.0, 19.0]);
    }

    #[test]
    fn delay_embedding_rejects_bad_params() {
        let seq = VectorSequence::from_flat(vec![1.0; 6], 1).unwrap();
        assert!(matches!(delay_embedding(&seq, 0, 2), Err(AttractorError::Configuration(_))));
        assert!(matches!(delay_embedding(&seq, 1, 0), Err(AttractorError::Configuration(_))));
        assert!(matches!(delay_embedding(&seq, 3, 3), Err(AttractorError::TooShort { .. })));
        assert_eq!(delay_embedding(&seq, 1, 1).unwrap(), seq);
    }

    #[test]
    fn diagnosis_rules() {
        let chaotic = AttractorDiagnosis::from_estimates(2.05, 0.9, 3);
        assert!(chaotic.is_chaotic);
        let potential = chaotic.compression_potential.unwrap();
        assert!((potential - 3.0 / 2.05).abs() < 1e-12);

        let stable = AttractorDiagnosis::from_estimates(1.0, -0.05, 768);
        assert!(!stable.is_chaotic);

        let point = AttractorDiagnosis::from_estimates(0.01, 0.3, 10);
        assert!(point.compression_potential.is_none());
    }

    #[test]
    fn diagnose_combines_estimates() {
        let seq = crate::datasets::lorenz(600, 2).unwrap();
        let correlation_config = CorrelationConfig::explicit(1.0, 8.0);
        let diagnosis = diagnose(&seq, &correlation_config, &LyapunovConfig::default()).unwrap();
        assert_eq!(diagnosis.embedding_dimension, 3);
        assert!(diagnosis.d2 > 1.0 && diagnosis.d2 < 3.0, "d2 = {}", diagnosis.d2);
        assert!(diagnosis.compression_potential.is_some());
    }

    #[test]
    fn invalid_config_rejected() {
        let config = LyapunovConfig {
            horizon: 0,
            ..LyapunovConfig::default()
        };
        assert!(matches!(config.validate(), Err(AttractorError::Configuration(_))));
        let config = LyapunovConfig {
            max_points: Some(5),
            ..LyapunovConfig::default()
        };
        assert!(config.validate().is_err());
    }
}

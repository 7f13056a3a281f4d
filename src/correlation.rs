//! Correlation dimension (D2) estimation, Grassberger–Procaccia style.
//!
//! # Intuition
//!
//! Count how many pairs of points sit within distance r of each other. On a
//! k-dimensional manifold that count grows like r^k for small r, so the slope
//! of log C(r) against log r recovers k, even when the points live in a
//! 768-dimensional embedding space.
//!
//! # Mathematical Foundation
//!
//! ```text
//! C(r) = #{ (i, j), i < j : |v_i - v_j| <= r } / (N (N - 1) / 2)
//! D2   = d log C(r) / d log r      (over the scaling region)
//! ```
//!
//! The slope is fitted by ordinary least squares on log10 C(r) vs log10 r.
//! Radii where C(r) = 0 (log undefined) or C(r) = 1 (saturated, no scaling
//! information) are excluded before the fit.
//!
//! # Cost
//!
//! O(N²) distances, computed once and sorted; every radius is then a binary
//! search. The distance pass is parallel when the `parallel` feature is on.
//! Sorting makes the result independent of thread scheduling.
//!
//! # References
//!
//! - Grassberger & Procaccia (1983) "Measuring the strangeness of strange
//!   attractors"

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::distance;
use crate::error::{AttractorError, Result};
use crate::sequence::VectorSequence;

/// Smallest radius ever produced from percentile bounds.
const MIN_RADIUS: f64 = 1e-6;

/// Below this many fitted points the estimate is reported but flagged in logs.
const THIN_FIT_POINTS: usize = 5;

/// How the radius bounds are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RadiusRange {
    /// Caller-supplied bounds, `0 < min < max`.
    Explicit { min: f64, max: f64 },
    /// Bounds taken from quantiles of the pairwise distance distribution,
    /// `0 <= low < high <= 1`.
    Percentile { low: f64, high: f64 },
}

impl Default for RadiusRange {
    fn default() -> Self {
        Self::Percentile {
            low: 0.01,
            high: 0.99,
        }
    }
}

/// Correlation-dimension configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationConfig {
    /// Number of log-spaced radii (default: 50).
    pub radius_count: usize,
    /// Radius bounds (default: 1st to 99th distance percentile).
    pub radii: RadiusRange,
    /// Restrict the fit to this log10(r) interval.
    pub fit_range: Option<(f64, f64)>,
    /// Only use the first `max_points` vectors.
    pub max_points: Option<usize>,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            radius_count: 50,
            radii: RadiusRange::default(),
            fit_range: None,
            max_points: None,
        }
    }
}

impl CorrelationConfig {
    /// Explicit radius bounds with the default count.
    pub fn explicit(min: f64, max: f64) -> Self {
        Self {
            radii: RadiusRange::Explicit { min, max },
            ..Self::default()
        }
    }

    /// Reject invalid parameters.
    pub fn validate(&self) -> Result<()> {
        if self.radius_count < 2 {
            return Err(AttractorError::config(format!(
                "radius_count must be at least 2, got {}",
                self.radius_count
            )));
        }
        match self.radii {
            RadiusRange::Explicit { min, max } => {
                if !(min.is_finite() && max.is_finite()) || min <= 0.0 || min >= max {
                    return Err(AttractorError::config(format!(
                        "radius bounds must satisfy 0 < radius_min < radius_max, got [{min}, {max}]"
                    )));
                }
            }
            RadiusRange::Percentile { low, high } => {
                if !(0.0..=1.0).contains(&low) || !(0.0..=1.0).contains(&high) || low >= high {
                    return Err(AttractorError::config(format!(
                        "percentile bounds must satisfy 0 <= low < high <= 1, got [{low}, {high}]"
                    )));
                }
            }
        }
        if let Some((lo, hi)) = self.fit_range {
            if !(lo.is_finite() && hi.is_finite()) || lo >= hi {
                return Err(AttractorError::config(format!(
                    "fit_range must be a non-empty log10(r) interval, got [{lo}, {hi}]"
                )));
            }
        }
        if self.max_points == Some(0) || self.max_points == Some(1) {
            return Err(AttractorError::config("max_points must be at least 2"));
        }
        Ok(())
    }
}

/// One point of the correlation integral.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrelationSample {
    /// Radius r > 0.
    pub radius: f64,
    /// Fraction of pairs within r, in [0, 1].
    pub fraction: f64,
}

/// Correlation integral sampled at increasing radii.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationCurve {
    /// Samples ordered by radius.
    pub samples: Vec<CorrelationSample>,
    /// Number of unordered pairs, N(N-1)/2.
    pub pair_count: usize,
}

/// Fitted correlation dimension.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionEstimate {
    /// Slope of log10 C(r) vs log10 r.
    pub d2: f64,
    /// Intercept of the fit.
    pub intercept: f64,
    /// Smallest log10(r) used in the fit.
    pub log_r_min: f64,
    /// Largest log10(r) used in the fit.
    pub log_r_max: f64,
    /// Samples that survived the guards.
    pub points_used: usize,
    /// Coefficient of determination of the fit.
    pub r_squared: f64,
    /// Root-mean-square residual of the fit.
    pub residual: f64,
}

/// Curve plus estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationAnalysis {
    pub curve: CorrelationCurve,
    pub estimate: DimensionEstimate,
}

/// All N(N-1)/2 pairwise Euclidean distances, sorted ascending.
///
/// # Errors
///
/// [`AttractorError::TooShort`] when N < 2.
pub fn pairwise_distances(seq: &VectorSequence) -> Result<Vec<f64>> {
    seq.require_len(2)?;
    let n = seq.len();

    let row = |i: usize| -> Vec<f64> {
        let a = seq.get(i);
        ((i + 1)..n)
            .map(|j| distance::l2_distance(a, seq.get(j)))
            .collect()
    };

    #[cfg(feature = "parallel")]
    let mut distances: Vec<f64> = (0..n - 1).into_par_iter().flat_map_iter(row).collect();
    #[cfg(not(feature = "parallel"))]
    let mut distances: Vec<f64> = (0..n - 1).flat_map(row).collect();

    #[cfg(feature = "parallel")]
    distances.par_sort_unstable_by(f64::total_cmp);
    #[cfg(not(feature = "parallel"))]
    distances.sort_unstable_by(f64::total_cmp);

    Ok(distances)
}

/// `count` radii log-spaced over `[min, max]`, both ends included.
pub fn log_spaced_radii(min: f64, max: f64, count: usize) -> Vec<f64> {
    match count {
        0 => return Vec::new(),
        1 => return vec![min],
        _ => {}
    }
    let (lo, hi) = (min.log10(), max.log10());
    let step = (hi - lo) / (count - 1) as f64;
    (0..count)
        .map(|i| {
            if i == count - 1 {
                max
            } else {
                10f64.powf(lo + step * i as f64)
            }
        })
        .collect()
}

/// Fraction of sorted distances `<= r`.
#[inline]
fn fraction_within(sorted: &[f64], r: f64) -> f64 {
    sorted.partition_point(|&d| d <= r) as f64 / sorted.len() as f64
}

/// Value at quantile `q` of an ascending slice (nearest rank).
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let idx = ((sorted.len() - 1) as f64 * q).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn resolve_bounds(radii: RadiusRange, sorted: &[f64]) -> Result<(f64, f64)> {
    match radii {
        RadiusRange::Explicit { min, max } => Ok((min, max)),
        RadiusRange::Percentile { low, high } => {
            let min = quantile(sorted, low).max(MIN_RADIUS);
            let max = quantile(sorted, high).max(MIN_RADIUS);
            if min >= max {
                // All pairs at (nearly) the same distance: nothing scales.
                return Err(AttractorError::InsufficientScalingRegion { usable: 0 });
            }
            Ok((min, max))
        }
    }
}

/// Sample the correlation integral from pre-sorted pairwise distances.
pub fn curve_from_distances(sorted: &[f64], config: &CorrelationConfig) -> Result<CorrelationCurve> {
    config.validate()?;
    if sorted.is_empty() {
        return Err(AttractorError::TooShort {
            required: 2,
            actual: 1,
        });
    }
    let (min, max) = resolve_bounds(config.radii, sorted)?;
    let samples = log_spaced_radii(min, max, config.radius_count)
        .into_iter()
        .map(|radius| CorrelationSample {
            radius,
            fraction: fraction_within(sorted, radius),
        })
        .collect();
    Ok(CorrelationCurve {
        samples,
        pair_count: sorted.len(),
    })
}

/// Compute the correlation integral C(r) over the configured radii.
pub fn correlation_integral(seq: &VectorSequence, config: &CorrelationConfig) -> Result<CorrelationCurve> {
    config.validate()?;
    let distances = match config.max_points {
        Some(cap) if cap < seq.len() => pairwise_distances(&seq.prefix(cap))?,
        _ => pairwise_distances(seq)?,
    };
    curve_from_distances(&distances, config)
}

/// Fit D2 to a correlation curve.
///
/// Only samples with `0 < C(r) < 1` (and, if given, `log10 r` inside
/// `fit_range`) take part.
///
/// # Errors
///
/// [`AttractorError::InsufficientScalingRegion`] when fewer than two samples
/// remain, or when the remaining radii are all identical.
pub fn fit_dimension(curve: &CorrelationCurve, fit_range: Option<(f64, f64)>) -> Result<DimensionEstimate> {
    let points: Vec<(f64, f64)> = curve
        .samples
        .iter()
        .filter(|s| s.fraction > 0.0 && s.fraction < 1.0 && s.radius > 0.0)
        .map(|s| (s.radius.log10(), s.fraction.log10()))
        .filter(|&(x, _)| match fit_range {
            Some((lo, hi)) => x >= lo && x <= hi,
            None => true,
        })
        .collect();

    let usable = points.len();
    if usable < 2 {
        return Err(AttractorError::InsufficientScalingRegion { usable });
    }

    let n = usable as f64;
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;
    let sxx: f64 = points.iter().map(|p| (p.0 - mean_x).powi(2)).sum();
    let sxy: f64 = points.iter().map(|p| (p.0 - mean_x) * (p.1 - mean_y)).sum();
    let syy: f64 = points.iter().map(|p| (p.1 - mean_y).powi(2)).sum();

    if sxx <= f64::EPSILON {
        return Err(AttractorError::InsufficientScalingRegion { usable });
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;
    let sse: f64 = points
        .iter()
        .map(|&(x, y)| (y - (intercept + slope * x)).powi(2))
        .sum();
    let r_squared = if syy > 0.0 { 1.0 - sse / syy } else { 1.0 };

    let log_r_min = points.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
    let log_r_max = points.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);

    if usable < THIN_FIT_POINTS {
        warn!(usable, "correlation dimension fitted on a thin scaling region");
    }

    Ok(DimensionEstimate {
        d2: slope,
        intercept,
        log_r_min,
        log_r_max,
        points_used: usable,
        r_squared,
        residual: (sse / n).sqrt(),
    })
}

/// Correlation integral and D2 estimate in one pass.
pub fn estimate_correlation_dimension(
    seq: &VectorSequence,
    config: &CorrelationConfig,
) -> Result<CorrelationAnalysis> {
    let curve = correlation_integral(seq, config)?;
    let estimate = fit_dimension(&curve, config.fit_range)?;
    debug!(
        pairs = curve.pair_count,
        d2 = estimate.d2,
        points = estimate.points_used,
        r_squared = estimate.r_squared,
        "correlation dimension"
    );
    Ok(CorrelationAnalysis { curve, estimate })
}

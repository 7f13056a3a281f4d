//! Principal component analysis for embedding sequences.
//!
//! Projects a sequence onto the K directions of largest variance. The basis
//! and the centering mean are kept next to the reduced vectors: without them
//! the reduced coordinates cannot be mapped back, and the reconstruction error
//! of the pipeline is only meaningful through this exact inverse projection.
//!
//! # Algorithm
//!
//! 1. Center every vector by the sequence mean.
//! 2. Eigendecompose the covariance `Xᵀ X / (N-1)` (D×D). When N < D (the
//!    usual case for a few hundred 768-d embeddings) decompose the Gram
//!    matrix `X Xᵀ` (N×N) instead and recover each direction as
//!    `Xᵀ u / sqrt(λ)`. Both give the same nonzero spectrum.
//! 3. Order directions by decreasing explained variance.
//!
//! This is the serialization point of the pipeline: it needs every vector
//! before it can start, and every later stage needs its output.

use nalgebra::{DMatrix, SymmetricEigen};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AttractorError, Result};
use crate::sequence::VectorSequence;

/// Eigenvalues below `RANK_TOLERANCE * largest` are treated as zero.
const RANK_TOLERANCE: f64 = 1e-9;

/// How many principal directions to keep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ReductionTarget {
    /// Smallest K whose cumulative explained variance reaches this fraction,
    /// in (0, 1].
    Variance(f64),
    /// Exactly this many directions, 1 <= K <= D.
    Components(usize),
}

impl Default for ReductionTarget {
    fn default() -> Self {
        Self::Variance(0.95)
    }
}

impl ReductionTarget {
    /// Reject invalid targets for data of dimension `dimension`.
    pub fn validate(&self, dimension: usize) -> Result<()> {
        match *self {
            Self::Variance(p) => {
                if !(p > 0.0 && p <= 1.0) {
                    return Err(AttractorError::config(format!(
                        "retained-variance fraction must be in (0, 1], got {p}"
                    )));
                }
            }
            Self::Components(k) => {
                if k == 0 || k > dimension {
                    return Err(AttractorError::config(format!(
                        "component count must be in 1..={dimension}, got {k}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Orthonormal basis and centering offset of a fitted PCA.
#[derive(Debug, Clone, PartialEq)]
pub struct PcaBasis {
    /// Mean of the input vectors (length D).
    pub mean: Vec<f64>,
    /// K unit directions of length D, by decreasing variance.
    pub components: Vec<Vec<f64>>,
    /// Variance along each kept direction.
    pub explained_variance: Vec<f64>,
    /// Variance along every nonzero-or-not direction found, descending.
    pub spectrum: Vec<f64>,
    /// Total variance of the data (trace of the covariance).
    pub total_variance: f64,
    /// Number of directions with non-negligible variance.
    pub rank: usize,
}

impl PcaBasis {
    /// Original dimension D.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.mean.len()
    }

    /// Reduced dimension K.
    #[inline]
    pub fn k(&self) -> usize {
        self.components.len()
    }

    /// Fraction of total variance captured by the first `k` directions of the
    /// full spectrum. Non-decreasing in `k`; 1.0 for constant data.
    pub fn cumulative_variance(&self, k: usize) -> f64 {
        if self.total_variance <= 0.0 {
            return 1.0;
        }
        let captured: f64 = self.spectrum.iter().take(k).sum();
        (captured / self.total_variance).min(1.0)
    }

    /// Fraction captured by the kept directions.
    pub fn retained_variance(&self) -> f64 {
        self.cumulative_variance(self.k())
    }

    /// Coordinates of `v` in the reduced basis.
    pub fn project(&self, v: &[f32]) -> Vec<f64> {
        self.components
            .iter()
            .map(|c| {
                c.iter()
                    .zip(v.iter().zip(&self.mean))
                    .map(|(&ci, (&x, &m))| ci * (f64::from(x) - m))
                    .sum()
            })
            .collect()
    }

    /// Map reduced coordinates back to the original space.
    pub fn reconstruct(&self, reduced: &[f64]) -> Vec<f32> {
        let mut out = self.mean.clone();
        for (c, &coef) in self.components.iter().zip(reduced) {
            for (o, &ci) in out.iter_mut().zip(c) {
                *o += coef * ci;
            }
        }
        out.into_iter().map(|x| x as f32).collect()
    }

    /// Copy with the mean and components rounded to f32, the width counted by
    /// [`byte_size`](Self::byte_size) in reports.
    pub fn to_stored_precision(&self) -> Self {
        let round = |v: &[f64]| -> Vec<f64> { v.iter().map(|&x| f64::from(x as f32)).collect() };
        Self {
            mean: round(self.mean.as_slice()),
            components: self.components.iter().map(|c| round(c.as_slice())).collect(),
            ..self.clone()
        }
    }

    /// Bytes needed to store the basis and mean, `(K·D + D) · width`.
    #[inline]
    pub fn byte_size(&self, component_bytes: usize) -> usize {
        (self.k() * self.dimension() + self.dimension()) * component_bytes
    }
}

/// A sequence projected onto a PCA basis.
#[derive(Debug, Clone, PartialEq)]
pub struct ReducedSequence {
    /// N reduced vectors of dimension K, in the original order.
    pub vectors: Vec<Vec<f64>>,
    /// Basis used for the projection.
    pub basis: PcaBasis,
    /// Achieved retained-variance fraction.
    pub retained_variance: f64,
}

impl ReducedSequence {
    /// Number of vectors.
    #[inline]
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Always false for a sequence built by [`reduce`].
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Reduced dimension K.
    #[inline]
    pub fn k(&self) -> usize {
        self.basis.k()
    }

    /// Inverse projection of every reduced vector.
    pub fn reconstruct(&self) -> Result<VectorSequence> {
        reconstruct_all(&self.basis, &self.vectors)
    }
}

/// Inverse-project a batch of reduced vectors into a [`VectorSequence`].
pub fn reconstruct_all(basis: &PcaBasis, reduced: &[Vec<f64>]) -> Result<VectorSequence> {
    let mut data = Vec::with_capacity(reduced.len() * basis.dimension());
    for r in reduced {
        data.extend(basis.reconstruct(r));
    }
    VectorSequence::from_flat(data, basis.dimension())
}

/// Descending (variance, direction) pairs from the D×D covariance.
fn spectrum_covariance(centered: &DMatrix<f64>, denom: f64) -> Vec<(f64, Vec<f64>)> {
    let cov = centered.tr_mul(centered) / denom;
    let eig = SymmetricEigen::new(cov);
    let mut pairs: Vec<(f64, Vec<f64>)> = (0..eig.eigenvalues.len())
        .map(|i| {
            (
                eig.eigenvalues[i].max(0.0),
                eig.eigenvectors.column(i).iter().copied().collect(),
            )
        })
        .collect();
    pairs.sort_by(|a, b| b.0.total_cmp(&a.0));
    pairs
}

/// Descending (variance, direction) pairs via the N×N Gram matrix.
///
/// Directions with zero Gram eigenvalue carry no variance and cannot be
/// recovered from `Xᵀ u`; they are returned with an all-zero direction and
/// are never selected because they fall below the rank cutoff.
fn spectrum_gram(centered: &DMatrix<f64>, denom: f64) -> Vec<(f64, Vec<f64>)> {
    let gram = centered * centered.transpose();
    let eig = SymmetricEigen::new(gram);
    let d = centered.ncols();
    let mut pairs: Vec<(f64, Vec<f64>)> = (0..eig.eigenvalues.len())
        .map(|i| {
            let lambda = eig.eigenvalues[i].max(0.0);
            let direction = if lambda > 0.0 {
                let scale = lambda.sqrt();
                centered
                    .tr_mul(&eig.eigenvectors.column(i))
                    .iter()
                    .map(|x| x / scale)
                    .collect()
            } else {
                vec![0.0; d]
            };
            (lambda / denom, direction)
        })
        .collect();
    pairs.sort_by(|a, b| b.0.total_cmp(&a.0));
    pairs
}

/// Fit a PCA basis for `seq` and keep the directions selected by `target`.
///
/// # Errors
///
/// - [`AttractorError::Configuration`] for an invalid target.
/// - [`AttractorError::InsufficientRank`] when the target needs more
///   directions than the data's effective rank.
pub fn fit_basis(seq: &VectorSequence, target: ReductionTarget) -> Result<PcaBasis> {
    let (n, d) = (seq.len(), seq.dimension());
    target.validate(d)?;

    let mut mean = vec![0.0f64; d];
    for v in seq {
        for (m, &x) in mean.iter_mut().zip(v) {
            *m += f64::from(x);
        }
    }
    for m in &mut mean {
        *m /= n as f64;
    }

    let centered = DMatrix::from_fn(n, d, |i, j| f64::from(seq.get(i)[j]) - mean[j]);
    let denom = n.saturating_sub(1).max(1) as f64;
    let total_variance = centered.iter().map(|x| x * x).sum::<f64>() / denom;

    let pairs = if n < d {
        spectrum_gram(&centered, denom)
    } else {
        spectrum_covariance(&centered, denom)
    };

    let largest = pairs.first().map(|p| p.0).unwrap_or(0.0);
    let rank = pairs
        .iter()
        .filter(|p| p.0 > 0.0 && p.0 > largest * RANK_TOLERANCE)
        .count();
    let spectrum: Vec<f64> = pairs.iter().map(|p| p.0).collect();

    let k = match target {
        ReductionTarget::Components(k) => {
            if k > rank {
                return Err(AttractorError::InsufficientRank {
                    requested: k,
                    max_rank: rank,
                });
            }
            k
        }
        ReductionTarget::Variance(p) => {
            if rank == 0 {
                return Err(AttractorError::InsufficientRank {
                    requested: 1,
                    max_rank: 0,
                });
            }
            let mut captured = 0.0;
            let mut chosen = rank;
            for (i, &var) in spectrum.iter().take(rank).enumerate() {
                captured += var;
                if captured / total_variance >= p - 1e-12 {
                    chosen = i + 1;
                    break;
                }
            }
            chosen
        }
    };

    let (explained_variance, components): (Vec<f64>, Vec<Vec<f64>>) =
        pairs.into_iter().take(k).unzip();

    let basis = PcaBasis {
        mean,
        components,
        explained_variance,
        spectrum,
        total_variance,
        rank,
    };
    debug!(
        n,
        d,
        k,
        rank,
        retained = basis.retained_variance(),
        "fitted PCA basis"
    );
    Ok(basis)
}

/// Reduce `seq` to K dimensions.
pub fn reduce(seq: &VectorSequence, target: ReductionTarget) -> Result<ReducedSequence> {
    let basis = fit_basis(seq, target)?;
    let vectors = seq.iter().map(|v| basis.project(v)).collect();
    let retained_variance = basis.retained_variance();
    Ok(ReducedSequence {
        vectors,
        basis,
        retained_variance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_seq(n: usize, d: usize, seed: u64) -> VectorSequence {
        let mut rng = StdRng::seed_from_u64(seed);
        let data = (0..n * d).map(|_| rng.random::<f32>() * 2.0 - 1.0).collect();
        VectorSequence::from_flat(data, d).unwrap()
    }

    /// Points `a * u + b * w` on a plane through the origin of R^d.
    fn planar_seq(n: usize, d: usize, seed: u64) -> VectorSequence {
        let mut rng = StdRng::seed_from_u64(seed);
        let u: Vec<f32> = (0..d).map(|_| rng.random::<f32>() - 0.5).collect();
        let w: Vec<f32> = (0..d).map(|_| rng.random::<f32>() - 0.5).collect();
        let data = (0..n)
            .flat_map(|_| {
                let a = rng.random::<f32>() * 4.0 - 2.0;
                let b = rng.random::<f32>() - 0.5;
                u.iter().zip(&w).map(move |(&ui, &wi)| a * ui + b * wi).collect::<Vec<_>>()
            })
            .collect();
        VectorSequence::from_flat(data, d).unwrap()
    }

    fn max_abs_diff(a: &VectorSequence, b: &VectorSequence) -> f32 {
        a.as_flat()
            .iter()
            .zip(b.as_flat())
            .map(|(x, y)| (x - y).abs())
            .fold(0.0, f32::max)
    }

    #[test]
    fn variance_target_finds_plane() {
        let seq = planar_seq(60, 12, 3);
        let reduced = reduce(&seq, ReductionTarget::Variance(0.999)).unwrap();
        assert_eq!(reduced.k(), 2);
        assert_eq!(reduced.basis.rank, 2);
        assert!(reduced.retained_variance >= 0.999);
        assert_eq!(reduced.len(), 60);
        assert_eq!(reduced.vectors[0].len(), 2);

        let back = reduced.reconstruct().unwrap();
        assert!(max_abs_diff(&seq, &back) < 1e-4);
    }

    #[test]
    fn full_rank_round_trip_with_k_equal_d() {
        let seq = random_seq(40, 5, 11);
        let reduced = reduce(&seq, ReductionTarget::Components(5)).unwrap();
        assert!((reduced.retained_variance - 1.0).abs() < 1e-9);
        let back = reduced.reconstruct().unwrap();
        assert!(max_abs_diff(&seq, &back) < 1e-5);
    }

    #[test]
    fn gram_path_round_trips_at_rank() {
        // N < D: centered data has rank N - 1.
        let seq = random_seq(6, 30, 5);
        let reduced = reduce(&seq, ReductionTarget::Components(5)).unwrap();
        assert_eq!(reduced.basis.rank, 5);
        let back = reduced.reconstruct().unwrap();
        assert!(max_abs_diff(&seq, &back) < 1e-5);
    }

    #[test]
    fn gram_and_covariance_spectra_agree() {
        let seq = random_seq(8, 5, 21);
        let n = seq.len();
        let mean: Vec<f64> = (0..5)
            .map(|j| seq.iter().map(|v| f64::from(v[j])).sum::<f64>() / n as f64)
            .collect();
        let centered = DMatrix::from_fn(n, 5, |i, j| f64::from(seq.get(i)[j]) - mean[j]);
        let cov = spectrum_covariance(&centered, (n - 1) as f64);
        let gram = spectrum_gram(&centered, (n - 1) as f64);
        for (a, b) in cov.iter().zip(&gram).take(5) {
            assert!((a.0 - b.0).abs() < 1e-9, "{} vs {}", a.0, b.0);
        }
    }

    #[test]
    fn basis_is_orthonormal() {
        let seq = random_seq(50, 8, 2);
        let basis = fit_basis(&seq, ReductionTarget::Components(6)).unwrap();
        for (i, a) in basis.components.iter().enumerate() {
            for (j, b) in basis.components.iter().enumerate() {
                let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((dot - expected).abs() < 1e-9);
            }
        }
        assert!(basis
            .explained_variance
            .windows(2)
            .all(|w| w[0] >= w[1]));
    }

    #[test]
    fn cumulative_variance_is_monotone() {
        let seq = random_seq(30, 10, 9);
        let basis = fit_basis(&seq, ReductionTarget::Components(1)).unwrap();
        let mut prev = 0.0;
        for k in 1..=10 {
            let v = basis.cumulative_variance(k);
            assert!(v >= prev - 1e-12);
            prev = v;
        }
        assert!((prev - 1.0).abs() < 1e-9);
    }

    #[test]
    fn too_many_components_is_insufficient_rank() {
        let seq = planar_seq(20, 6, 4);
        let err = reduce(&seq, ReductionTarget::Components(3)).unwrap_err();
        assert!(matches!(
            err,
            AttractorError::InsufficientRank {
                requested: 3,
                max_rank: 2
            }
        ));
    }

    #[test]
    fn constant_data_has_rank_zero() {
        let seq = VectorSequence::new(vec![vec![1.0, 2.0, 3.0]; 5]).unwrap();
        assert!(matches!(
            reduce(&seq, ReductionTarget::Variance(0.9)),
            Err(AttractorError::InsufficientRank { max_rank: 0, .. })
        ));
    }

    #[test]
    fn invalid_targets_rejected() {
        for target in [
            ReductionTarget::Variance(0.0),
            ReductionTarget::Variance(1.5),
            ReductionTarget::Variance(f64::NAN),
            ReductionTarget::Components(0),
            ReductionTarget::Components(9),
        ] {
            assert!(matches!(
                target.validate(8),
                Err(AttractorError::Configuration(_))
            ));
        }
    }

    #[test]
    fn byte_size_counts_basis_and_mean() {
        let seq = random_seq(20, 4, 1);
        let basis = fit_basis(&seq, ReductionTarget::Components(2)).unwrap();
        assert_eq!(basis.byte_size(4), (2 * 4 + 4) * 4);
    }

    #[test]
    fn stored_precision_rounds_mean_and_components() {
        let seq = random_seq(20, 6, 2);
        let basis = fit_basis(&seq, ReductionTarget::Components(3)).unwrap();
        let stored = basis.to_stored_precision();
        assert_eq!(stored.k(), 3);
        assert_eq!(stored.spectrum, basis.spectrum);
        for (full, narrow) in basis.components.iter().flatten().zip(stored.components.iter().flatten()) {
            assert_eq!(f64::from(*narrow as f32), *narrow);
            assert!((full - narrow).abs() < 1e-6);
        }
        assert!(stored.mean.iter().all(|&m| f64::from(m as f32) == m));
    }
}

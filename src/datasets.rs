//! Seeded synthetic embedding sequences.
//!
//! Every generator takes an explicit seed and returns the same sequence for
//! the same arguments. They model the regimes the pipeline is meant to tell
//! apart: smooth drift (high consecutive similarity, cheap deltas), topic
//! jumps (similar within a block, abrupt in between), a genuinely
//! low-dimensional manifold, and a classic chaotic attractor for calibrating
//! the dimension estimates.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::distance::normalize_in_place;
use crate::error::{AttractorError, Result};
use crate::sequence::VectorSequence;

/// Standard normal sample (Box-Muller).
fn gaussian(rng: &mut StdRng) -> f32 {
    // 1 - u keeps the log argument in (0, 1].
    let u1: f32 = 1.0 - rng.random::<f32>();
    let u2: f32 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f32::consts::PI * u2).cos()
}

fn uniform_vector(rng: &mut StdRng, dim: usize) -> Vec<f32> {
    (0..dim).map(|_| rng.random::<f32>()).collect()
}

fn unit_gaussian_vector(rng: &mut StdRng, dim: usize) -> Vec<f32> {
    let mut v: Vec<f32> = (0..dim).map(|_| gaussian(rng)).collect();
    normalize_in_place(&mut v);
    v
}

/// Vectors that share a fraction of their components with one random base.
///
/// The base is uniform in `[0, 1)`. Each component of each vector keeps the
/// base value plus up to 0.1 of uniform jitter with probability
/// `similarity`, and is resampled uniformly otherwise. Vectors are not
/// normalized, and order carries no structure beyond the shared base.
///
/// # Errors
///
/// [`AttractorError::Configuration`] when `similarity` is outside `[0, 1]`.
pub fn random_similar(n: usize, dim: usize, similarity: f64, seed: u64) -> Result<VectorSequence> {
    if !(0.0..=1.0).contains(&similarity) {
        return Err(AttractorError::config(format!(
            "similarity must be in [0, 1], got {similarity}"
        )));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let base = uniform_vector(&mut rng, dim);

    let mut data = Vec::with_capacity(n * dim);
    for _ in 0..n {
        data.extend(base.iter().map(|&b| {
            if rng.random::<f64>() < similarity {
                b + rng.random::<f32>() * 0.1
            } else {
                rng.random::<f32>()
            }
        }));
    }
    VectorSequence::from_flat(data, dim)
}

/// Cumulative drift: each vector mixes the previous one with fresh noise.
///
/// `next = normalize((1 - rate)·current + rate·noise)` with uniform noise in
/// `[0, 1)`. Small rates give consecutive similarity close to 1.
pub fn conversational_drift(n: usize, dim: usize, drift_rate: f32, seed: u64) -> Result<VectorSequence> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut current = uniform_vector(&mut rng, dim);
    normalize_in_place(&mut current);

    let mut data = Vec::with_capacity(n * dim);
    for i in 0..n {
        if i > 0 {
            let drift = uniform_vector(&mut rng, dim);
            for (c, d) in current.iter_mut().zip(&drift) {
                *c = *c * (1.0 - drift_rate) + d * drift_rate;
            }
            normalize_in_place(&mut current);
        }
        data.extend_from_slice(&current);
    }
    VectorSequence::from_flat(data, dim)
}

/// Exponential moving average over uniform noise with smoothing `alpha`.
///
/// `next = normalize(alpha·current + (1 - alpha)·noise)`. Higher `alpha`
/// means smoother trajectories.
pub fn temporal_smoothing(n: usize, dim: usize, alpha: f32, seed: u64) -> Result<VectorSequence> {
    conversational_drift(n, dim, 1.0 - alpha, seed)
}

/// Blocks of `cluster_size` vectors around a shared center, with a new
/// random center for each block.
///
/// Within a block vectors are `normalize(0.98·center + 0.02·noise)`.
pub fn clustered_topics(n: usize, dim: usize, cluster_size: usize, seed: u64) -> Result<VectorSequence> {
    let mut rng = StdRng::seed_from_u64(seed);
    let cluster_size = cluster_size.max(1);
    let clusters = n.div_ceil(cluster_size);

    let centers: Vec<Vec<f32>> = (0..clusters)
        .map(|_| {
            let mut c = uniform_vector(&mut rng, dim);
            normalize_in_place(&mut c);
            c
        })
        .collect();

    let mut data = Vec::with_capacity(n * dim);
    for i in 0..n {
        let center = &centers[i / cluster_size];
        let mut v: Vec<f32> = center
            .iter()
            .map(|&c| c * 0.98 + rng.random::<f32>() * 0.02)
            .collect();
        normalize_in_place(&mut v);
        data.extend(v);
    }
    VectorSequence::from_flat(data, dim)
}

/// Parameters for [`manifold_trajectory`].
#[derive(Debug, Clone)]
pub struct ManifoldParams {
    /// Number of latent oscillating directions.
    pub latent: usize,
    /// Oscillation amplitude along each latent direction.
    pub amplitude: f32,
    /// Typical angular frequency per step; each direction draws one in
    /// `[0.75, 1.25]` times this.
    pub frequency: f32,
    /// Per-component Gaussian noise.
    pub noise: f32,
}

impl Default for ManifoldParams {
    fn default() -> Self {
        Self {
            latent: 4,
            amplitude: 1.0,
            frequency: 0.3,
            noise: 0.001,
        }
    }
}

/// A smooth trajectory on a low-dimensional manifold embedded in `dim`
/// dimensions.
///
/// ```text
/// v(t) = b + A · Σ_j sin(ω_j t + φ_j) u_j + ε
/// ```
///
/// `b` and `u_j` are random unit vectors (nearly orthogonal for large `dim`),
/// `ε` is isotropic noise. Almost all variance lives in `latent` directions
/// and consecutive vectors are highly similar, which is the regime where
/// reduce-then-delta compression pays off.
pub fn manifold_trajectory(n: usize, dim: usize, params: &ManifoldParams, seed: u64) -> Result<VectorSequence> {
    let mut rng = StdRng::seed_from_u64(seed);
    let base = unit_gaussian_vector(&mut rng, dim);
    let directions: Vec<Vec<f32>> = (0..params.latent)
        .map(|_| unit_gaussian_vector(&mut rng, dim))
        .collect();
    let oscillators: Vec<(f32, f32)> = (0..params.latent)
        .map(|_| {
            let omega = params.frequency * rng.random_range(0.75f32..1.25);
            let phase = rng.random_range(0.0f32..std::f32::consts::TAU);
            (omega, phase)
        })
        .collect();

    let mut data = Vec::with_capacity(n * dim);
    for t in 0..n {
        let mut v = base.clone();
        for (u, &(omega, phase)) in directions.iter().zip(&oscillators) {
            let coef = params.amplitude * (omega * t as f32 + phase).sin();
            for (x, &ui) in v.iter_mut().zip(u) {
                *x += coef * ui;
            }
        }
        if params.noise > 0.0 {
            for x in v.iter_mut() {
                *x += params.noise * gaussian(&mut rng);
            }
        }
        data.extend(v);
    }
    VectorSequence::from_flat(data, dim)
}

/// Integration step for [`lorenz`].
const LORENZ_DT: f64 = 0.01;
/// Integration steps between recorded points.
const LORENZ_STRIDE: usize = 10;
/// Steps discarded so the trajectory settles onto the attractor.
const LORENZ_TRANSIENT: usize = 1000;

fn lorenz_derivative([x, y, z]: [f64; 3]) -> [f64; 3] {
    const SIGMA: f64 = 10.0;
    const RHO: f64 = 28.0;
    const BETA: f64 = 8.0 / 3.0;
    [SIGMA * (y - x), x * (RHO - z) - y, x * y - BETA * z]
}

fn rk4_step(s: [f64; 3], dt: f64) -> [f64; 3] {
    let add = |a: [f64; 3], b: [f64; 3], h: f64| [a[0] + h * b[0], a[1] + h * b[1], a[2] + h * b[2]];
    let k1 = lorenz_derivative(s);
    let k2 = lorenz_derivative(add(s, k1, dt / 2.0));
    let k3 = lorenz_derivative(add(s, k2, dt / 2.0));
    let k4 = lorenz_derivative(add(s, k3, dt));
    [
        s[0] + dt / 6.0 * (k1[0] + 2.0 * k2[0] + 2.0 * k3[0] + k4[0]),
        s[1] + dt / 6.0 * (k1[1] + 2.0 * k2[1] + 2.0 * k3[1] + k4[1]),
        s[2] + dt / 6.0 * (k1[2] + 2.0 * k2[2] + 2.0 * k3[2] + k4[2]),
    ]
}

/// Points on the Lorenz attractor (σ = 10, ρ = 28, β = 8/3), D = 3.
///
/// RK4 with step 0.01, one point recorded every 10 steps after a 1000-step
/// transient. The attractor's correlation dimension is about 2.05.
pub fn lorenz(n: usize, seed: u64) -> Result<VectorSequence> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut state = [
        1.0 + rng.random_range(-0.1..0.1),
        1.0 + rng.random_range(-0.1..0.1),
        1.0 + rng.random_range(-0.1..0.1),
    ];
    for _ in 0..LORENZ_TRANSIENT {
        state = rk4_step(state, LORENZ_DT);
    }

    let mut data = Vec::with_capacity(n * 3);
    for _ in 0..n {
        data.extend(state.iter().map(|&c| c as f32));
        for _ in 0..LORENZ_STRIDE {
            state = rk4_step(state, LORENZ_DT);
        }
    }
    VectorSequence::from_flat(data, 3)
}

//! Dense vector kernels shared by every stage.
//!
//! Vectors are stored as `f32` (the width embedding models emit), but every
//! kernel here accumulates in `f64`.
//!
//! ## Important nuance
//!
//! [`cosine`] returns `None` for a zero-norm operand instead of inventing a
//! value. Callers decide whether that is an error (similarity analysis) or
//! something to skip.

/// Dot product with `f64` accumulation.
#[inline]
#[must_use]
pub fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| f64::from(x) * f64::from(y))
        .sum()
}

/// L2 norm of a vector.
#[inline]
#[must_use]
pub fn norm(v: &[f32]) -> f64 {
    dot(v, v).sqrt()
}

/// L2 distance squared (avoid sqrt for comparison).
#[inline]
#[must_use]
pub fn l2_distance_squared(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = f64::from(x) - f64::from(y);
            d * d
        })
        .sum()
}

/// L2 (Euclidean) distance.
#[inline]
#[must_use]
pub fn l2_distance(a: &[f32], b: &[f32]) -> f64 {
    l2_distance_squared(a, b).sqrt()
}

/// Cosine similarity, clamped to `[-1, 1]`.
///
/// Returns `None` when either norm is exactly zero.
#[inline]
#[must_use]
pub fn cosine(a: &[f32], b: &[f32]) -> Option<f64> {
    let na = norm(a);
    let nb = norm(b);
    if na == 0.0 || nb == 0.0 {
        return None;
    }
    Some((dot(a, b) / (na * nb)).clamp(-1.0, 1.0))
}

/// Normalize a vector to unit L2 norm. Zero vectors are returned unchanged.
#[inline]
#[must_use]
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let n = norm(v);
    if n < 1e-10 {
        return v.to_vec();
    }
    v.iter().map(|&x| (f64::from(x) / n) as f32).collect()
}

/// In-place variant of [`normalize`].
#[inline]
pub fn normalize_in_place(v: &mut [f32]) {
    let n = norm(v);
    if n < 1e-10 {
        return;
    }
    for x in v.iter_mut() {
        *x = (f64::from(*x) / n) as f32;
    }
}

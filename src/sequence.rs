//! Ordered sequences of fixed-dimension embedding vectors.
//!
//! A [`VectorSequence`] is the input to every stage. Index order is the
//! generation order of the embeddings, which is what consecutive similarity and
//! delta encoding rely on, so the sequence is never reordered.
//!
//! Storage is a single row-major `Vec<f32>` (`len * dimension` values).

use crate::error::{AttractorError, Result};

/// Immutable ordered collection of equal-length vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorSequence {
    data: Vec<f32>,
    dimension: usize,
}

impl VectorSequence {
    /// Build a sequence from individual vectors.
    ///
    /// # Errors
    ///
    /// - [`AttractorError::EmptySequence`] if there are no vectors or the
    ///   first one is empty.
    /// - [`AttractorError::DimensionMismatch`] if any vector differs in length.
    /// - [`AttractorError::NonFinite`] if any component is NaN or infinite.
    pub fn new(vectors: Vec<Vec<f32>>) -> Result<Self> {
        let dimension = vectors.first().map(Vec::len).unwrap_or(0);
        if dimension == 0 {
            return Err(AttractorError::EmptySequence);
        }

        let mut data = Vec::with_capacity(vectors.len() * dimension);
        for (index, v) in vectors.iter().enumerate() {
            if v.len() != dimension {
                return Err(AttractorError::DimensionMismatch {
                    index,
                    expected: dimension,
                    actual: v.len(),
                });
            }
            if v.iter().any(|x| !x.is_finite()) {
                return Err(AttractorError::NonFinite { index });
            }
            data.extend_from_slice(v);
        }

        Ok(Self { data, dimension })
    }

    /// Build a sequence from a flat row-major buffer.
    ///
    /// # Errors
    ///
    /// Fails if `dimension` is zero, the buffer is empty, its length is not a
    /// multiple of `dimension`, or it contains non-finite values.
    pub fn from_flat(data: Vec<f32>, dimension: usize) -> Result<Self> {
        if dimension == 0 || data.is_empty() {
            return Err(AttractorError::EmptySequence);
        }
        if data.len() % dimension != 0 {
            return Err(AttractorError::DimensionMismatch {
                index: data.len() / dimension,
                expected: dimension,
                actual: data.len() % dimension,
            });
        }
        if let Some(pos) = data.iter().position(|x| !x.is_finite()) {
            return Err(AttractorError::NonFinite {
                index: pos / dimension,
            });
        }
        Ok(Self { data, dimension })
    }

    /// Number of vectors (N).
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    /// Always false: construction rejects empty input.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Vector dimension (D).
    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Vector at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len()`.
    #[inline]
    pub fn get(&self, index: usize) -> &[f32] {
        &self.data[index * self.dimension..(index + 1) * self.dimension]
    }

    /// Iterate vectors in sequence order.
    pub fn iter(&self) -> std::slice::ChunksExact<'_, f32> {
        self.data.chunks_exact(self.dimension)
    }

    /// The underlying row-major buffer.
    #[inline]
    pub fn as_flat(&self) -> &[f32] {
        &self.data
    }

    /// Copy out as one `Vec` per vector.
    pub fn to_vecs(&self) -> Vec<Vec<f32>> {
        self.iter().map(<[f32]>::to_vec).collect()
    }

    /// The first `n` vectors (or all of them if `n >= len()`).
    pub fn prefix(&self, n: usize) -> Self {
        let n = n.clamp(1, self.len());
        Self {
            data: self.data[..n * self.dimension].to_vec(),
            dimension: self.dimension,
        }
    }

    /// Uncompressed size in bytes when each component takes `component_bytes`.
    #[inline]
    pub fn byte_size(&self, component_bytes: usize) -> usize {
        self.data.len() * component_bytes
    }

    /// Fail with [`AttractorError::TooShort`] unless at least `required`
    /// vectors are present.
    pub fn require_len(&self, required: usize) -> Result<()> {
        if self.len() < required {
            return Err(AttractorError::TooShort {
                required,
                actual: self.len(),
            });
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a VectorSequence {
    type Item = &'a [f32];
    type IntoIter = std::slice::ChunksExact<'a, f32>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

//! attractor: manifold structure and compression of embedding sequences.
//!
//! Embeddings produced one after another (tokens of a dialogue, frames of a
//! stream, steps of a trajectory) are not scattered through their ambient
//! space. Consecutive vectors sit close together on a low-dimensional
//! manifold. This crate measures that structure and exploits it:
//!
//! - [`similarity`]: consecutive cosine similarity, the quick indicator.
//! - [`correlation`]: Grassberger–Procaccia correlation dimension D2.
//! - [`pca`]: projection onto the K directions of largest variance.
//! - [`delta`]: inter-vector differences of the reduced sequence.
//! - [`quantize`]: fixed-point codes with per-vector or per-sequence scale.
//! - [`pipeline`]: runs everything and reports sizes, ratios and error.
//!
//! Supporting modules: [`dynamics`] (Lyapunov exponent, delay embedding,
//! attractor verdict), [`datasets`] (seeded synthetic sequences), [`io`]
//! (JSON embedding files and reports), [`distance`] (shared kernels).
//!
//! # Critical Nuances
//!
//! ## Correlation dimension needs a scaling region
//!
//! D2 is the slope of log C(r) against log r where that relation is linear.
//! Below the smallest pairwise distance C(r) is 0; above the diameter it is 1;
//! both ends carry no information and are excluded from the fit. With few
//! points or a poorly chosen radius range there may be nothing left, which is
//! reported as an error rather than a made-up slope.
//!
//! ## The basis is part of the price
//!
//! A K-dimensional code is useless without the K×D basis that decodes it. For
//! one short sequence the basis dominates the compressed size; it amortizes
//! only when shared across many sequences. Reports carry both ratios.
//!
//! ## Delta quantization drifts
//!
//! Quantization is applied to each delta independently, so the decoded vector
//! at index i carries the rounding errors of every delta before it. Long
//! sequences at low bit widths drift; the reported reconstruction error
//! measures exactly this.
//!
//! # Example
//!
//! ```no_run
//! use attractor::{datasets, pipeline, PipelineConfig};
//!
//! let seq = datasets::manifold_trajectory(100, 768, &Default::default(), 42)?;
//! let report = pipeline::run(&seq, &PipelineConfig::default())?;
//! println!("D2 = {:.2}, ratio = {:.1}x", report.correlation_dimension, report.compression_ratio);
//! # Ok::<(), attractor::AttractorError>(())
//! ```

pub mod correlation;
pub mod datasets;
pub mod delta;
pub mod distance;
pub mod dynamics;
pub mod error;
pub mod io;
pub mod pca;
pub mod pipeline;
pub mod quantize;
pub mod sequence;
pub mod similarity;

// Re-exports
pub use correlation::{CorrelationConfig, DimensionEstimate, RadiusRange};
pub use delta::{DeltaSequence, DeltaStats};
pub use error::{AttractorError, Result};
pub use pca::{PcaBasis, ReducedSequence, ReductionTarget};
pub use pipeline::{
    BaselineMethod, BaselineSummary, CompressedSequence, ErrorMetric, PipelineConfig, PipelineReport,
};
pub use quantize::{QuantRange, QuantScope, QuantizedSequence, QuantizerConfig};
pub use sequence::VectorSequence;
pub use similarity::{SimilarityConfig, SimilarityReport};

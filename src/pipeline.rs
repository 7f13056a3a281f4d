//! End-to-end analysis and compression.
//!
//! ```text
//!                    ┌─> consecutive similarity ─────────────┐
//! VectorSequence ────┼─> correlation dimension ──────────────┼─> PipelineReport
//!                    └─> PCA ─> delta ─> quantize ─> (decode)┘
//! ```
//!
//! The similarity and correlation stages read the input independently; the
//! compression chain is strictly sequential. Any stage failure aborts the run
//! and is returned unchanged.
//!
//! # Size accounting
//!
//! | Part | Bytes |
//! |------|-------|
//! | original | `N · D · component_bytes` |
//! | payload | `ceil(N · K · bits / 8) + pairs · 2 · 4` |
//! | basis | `(K · D + D) · 4` |
//! | compressed | payload + basis |
//!
//! `compression_ratio` charges the basis to this one sequence.
//! `payload_ratio` leaves it out, which is the right figure when one basis is
//! shared by many sequences drawn from the same model.
//!
//! Scale, offset, basis and mean are all counted at f32 width, and
//! [`CompressedSequence::decompress`] decodes from values rounded to f32, so
//! the reported error is the error of what the byte counts pay for.
//!
//! With per-vector parameters every vector carries a 64-bit (scale, offset)
//! pair next to its codes. The payload beats an f32 original only when
//! `bits · K + 64 < 32 · D`; for very small D the parameters alone outweigh
//! the input.
//!
//! # Baselines
//!
//! Unless disabled, each run also quantizes the original vectors without PCA,
//! once directly and once after delta encoding, with the same quantizer
//! settings. The report lists their payload, ratio and error next to the
//! main result so the gain from the reduction is visible.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::correlation::{self, CorrelationConfig};
use crate::delta::{DeltaSequence, DeltaStats};
use crate::dynamics::{self, AttractorDiagnosis, LyapunovConfig};
use crate::error::{AttractorError, Result};
use crate::pca::{self, ReducedSequence, ReductionTarget};
use crate::quantize::{self, QuantizationError, QuantizedSequence, QuantizerConfig};
use crate::sequence::VectorSequence;
use crate::similarity::{self, SimilarityConfig};

/// Bytes per stored basis or mean component (f32).
pub const BASIS_COMPONENT_BYTES: usize = 4;

/// Reconstruction error measure in the original space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ErrorMetric {
    /// Mean |x̂ - x| over all N·D components.
    #[default]
    MeanAbsolute,
    /// Mean (x̂ - x)² over all N·D components.
    MeanSquared,
}

impl ErrorMetric {
    /// Error between two sequences of the same shape.
    pub fn measure(&self, original: &VectorSequence, reconstructed: &VectorSequence) -> f64 {
        let pairs = original.as_flat().iter().zip(reconstructed.as_flat());
        let count = original.as_flat().len().max(1) as f64;
        let total: f64 = match self {
            Self::MeanAbsolute => pairs.map(|(&a, &b)| (f64::from(a) - f64::from(b)).abs()).sum(),
            Self::MeanSquared => pairs
                .map(|(&a, &b)| {
                    let e = f64::from(a) - f64::from(b);
                    e * e
                })
                .sum(),
        };
        total / count
    }
}

/// Everything a pipeline run needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Label copied into the report.
    pub name: String,
    pub similarity: SimilarityConfig,
    pub correlation: CorrelationConfig,
    pub reduction: ReductionTarget,
    pub quantizer: QuantizerConfig,
    pub error_metric: ErrorMetric,
    /// Bytes per original component (default: 4, f32).
    pub component_bytes: usize,
    /// When set, a Lyapunov estimate is added and the report carries an
    /// attractor diagnosis.
    pub lyapunov: Option<LyapunovConfig>,
    /// Run the no-PCA baselines (default: true).
    pub compare_baselines: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: String::from("sequence"),
            similarity: SimilarityConfig::default(),
            correlation: CorrelationConfig::default(),
            reduction: ReductionTarget::default(),
            quantizer: QuantizerConfig::default(),
            error_metric: ErrorMetric::default(),
            component_bytes: 4,
            lyapunov: None,
            compare_baselines: true,
        }
    }
}

impl PipelineConfig {
    /// Parse a (possibly partial) JSON config; missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject invalid parameters before any computation.
    ///
    /// The component count is only checked for being positive here; see
    /// [`validate_for`](Self::validate_for) for the check against D.
    pub fn validate(&self) -> Result<()> {
        self.correlation.validate()?;
        self.quantizer.validate()?;
        self.reduction.validate(usize::MAX)?;
        if let Some(lyapunov) = &self.lyapunov {
            lyapunov.validate()?;
        }
        if self.component_bytes == 0 {
            return Err(AttractorError::config("component_bytes must be positive"));
        }
        Ok(())
    }

    /// [`validate`](Self::validate) plus the checks that need the input:
    /// a component count above `seq.dimension()` is rejected here.
    pub fn validate_for(&self, seq: &VectorSequence) -> Result<()> {
        self.validate()?;
        self.reduction.validate(seq.dimension())
    }
}

/// Compression artifacts of one sequence.
#[derive(Debug, Clone)]
pub struct CompressedSequence {
    /// PCA output, including the basis needed for decoding.
    pub reduced: ReducedSequence,
    /// Exact deltas before quantization.
    pub deltas: DeltaSequence,
    /// Quantized deltas.
    pub quantized: QuantizedSequence,
}

impl CompressedSequence {
    /// Packed codes plus quantization parameters.
    pub fn payload_bytes(&self) -> usize {
        self.quantized.payload_bytes()
    }

    /// Basis and mean.
    pub fn basis_bytes(&self) -> usize {
        self.reduced.basis.byte_size(BASIS_COMPONENT_BYTES)
    }

    /// Payload plus basis.
    pub fn compressed_bytes(&self) -> usize {
        self.payload_bytes() + self.basis_bytes()
    }

    /// Dequantize, accumulate deltas and inverse-project.
    ///
    /// Quantization errors accumulate along the sequence: each decoded vector
    /// carries the sum of the rounding errors of all deltas before it.
    /// Parameters, basis and mean are rounded to f32 first.
    pub fn decompress(&self) -> Result<VectorSequence> {
        let reduced = self.quantized.to_stored_precision().dequantize().decode();
        pca::reconstruct_all(&self.reduced.basis.to_stored_precision(), &reduced)
    }
}

/// Run the compression chain: PCA, delta encoding, quantization.
pub fn compress(seq: &VectorSequence, config: &PipelineConfig) -> Result<CompressedSequence> {
    config.validate_for(seq)?;
    let reduced = pca::reduce(seq, config.reduction)?;
    let deltas = DeltaSequence::encode(&reduced);
    let quantized = quantize::quantize(&deltas, &config.quantizer)?;
    debug!(
        n = seq.len(),
        d = seq.dimension(),
        k = reduced.k(),
        payload = quantized.payload_bytes(),
        "compressed sequence"
    );
    Ok(CompressedSequence {
        reduced,
        deltas,
        quantized,
    })
}

/// A compression method that skips PCA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BaselineMethod {
    /// Quantize the original vectors directly.
    Quantize,
    /// Delta-encode the original vectors, then quantize.
    DeltaQuantize,
}

/// Size and error of one baseline method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineSummary {
    pub method: BaselineMethod,
    pub payload_bytes: usize,
    /// original / payload.
    pub compression_ratio: f64,
    /// Original-space error under the run's metric.
    pub reconstruction_error: f64,
}

/// Compress `seq` without PCA, using the quantizer settings of `config`.
pub fn baseline(seq: &VectorSequence, method: BaselineMethod, config: &PipelineConfig) -> Result<BaselineSummary> {
    config.validate()?;
    let rows: Vec<Vec<f64>> = seq
        .iter()
        .map(|v| v.iter().map(|&x| f64::from(x)).collect())
        .collect();
    let input = match method {
        BaselineMethod::Quantize => DeltaSequence { deltas: rows },
        BaselineMethod::DeltaQuantize => DeltaSequence::from_vectors(&rows),
    };

    let quantized = quantize::quantize(&input, &config.quantizer)?.to_stored_precision();
    let decoded = quantized.dequantize();
    let rows = match method {
        BaselineMethod::Quantize => decoded.deltas,
        BaselineMethod::DeltaQuantize => decoded.decode(),
    };
    let data: Vec<f32> = rows.into_iter().flatten().map(|x| x as f32).collect();
    let reconstructed = VectorSequence::from_flat(data, seq.dimension())?;

    let payload_bytes = quantized.payload_bytes();
    let summary = BaselineSummary {
        method,
        payload_bytes,
        compression_ratio: seq.byte_size(config.component_bytes) as f64 / payload_bytes.max(1) as f64,
        reconstruction_error: config.error_metric.measure(seq, &reconstructed),
    };
    debug!(
        method = ?method,
        ratio = summary.compression_ratio,
        error = summary.reconstruction_error,
        "baseline"
    );
    Ok(summary)
}

/// Summary of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub name: String,
    /// Original dimension D.
    pub dimension: usize,
    /// Sequence length N.
    pub count: usize,
    /// Reduced dimension K.
    pub reduced_dimension: usize,
    pub retained_variance: f64,

    pub correlation_dimension: f64,
    /// log10(r) interval of the D2 fit.
    pub fit_log_r_min: f64,
    pub fit_log_r_max: f64,
    pub fit_r_squared: f64,

    pub mean_similarity: f64,
    pub min_similarity: f64,
    /// Per-pair similarities, when requested in the config.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_values: Option<Vec<f64>>,

    pub original_bytes: usize,
    pub payload_bytes: usize,
    pub basis_bytes: usize,
    pub compressed_bytes: usize,
    /// original / (payload + basis).
    pub compression_ratio: f64,
    /// original / payload.
    pub payload_ratio: f64,

    pub bits: u8,
    pub error_metric: ErrorMetric,
    /// Original-space error under `error_metric`.
    pub reconstruction_error: f64,
    /// Delta-space quantization error.
    pub quantization: QuantizationError,
    pub clamped: usize,
    /// Shannon entropy of the codes, bits per code.
    pub code_entropy_bits: f64,
    pub delta_stats: DeltaStats,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnosis: Option<AttractorDiagnosis>,

    /// No-PCA comparison methods; empty when disabled.
    #[serde(default)]
    pub baselines: Vec<BaselineSummary>,
}

impl PipelineReport {
    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a report written by [`PipelineReport::to_json`].
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Analyze and compress `seq`, returning the full report.
///
/// # Errors
///
/// Configuration errors (including a component count above D) before any
/// work, then the first failure of any stage: [`AttractorError::TooShort`],
/// [`AttractorError::DegenerateVector`],
/// [`AttractorError::InsufficientScalingRegion`],
/// [`AttractorError::InsufficientRank`].
pub fn run(seq: &VectorSequence, config: &PipelineConfig) -> Result<PipelineReport> {
    config.validate_for(seq)?;
    info!(name = %config.name, n = seq.len(), d = seq.dimension(), "pipeline start");

    let similarity = similarity::consecutive_similarity(seq, &config.similarity)?;
    let correlation = correlation::estimate_correlation_dimension(seq, &config.correlation)?;

    let compressed = compress(seq, config)?;
    let reconstructed = compressed.decompress()?;
    let reconstruction_error = config.error_metric.measure(seq, &reconstructed);
    let quantization = compressed.quantized.error_against(&compressed.deltas);

    let diagnosis = match &config.lyapunov {
        Some(lyapunov) => {
            let estimate = dynamics::max_lyapunov_exponent(seq, lyapunov)?;
            Some(AttractorDiagnosis::from_estimates(
                correlation.estimate.d2,
                estimate.lambda,
                seq.dimension(),
            ))
        }
        None => None,
    };

    let baselines = if config.compare_baselines {
        [BaselineMethod::Quantize, BaselineMethod::DeltaQuantize]
            .into_iter()
            .map(|method| baseline(seq, method, config))
            .collect::<Result<Vec<_>>>()?
    } else {
        Vec::new()
    };

    let original_bytes = seq.byte_size(config.component_bytes);
    let payload_bytes = compressed.payload_bytes();
    let basis_bytes = compressed.basis_bytes();
    let compressed_bytes = payload_bytes + basis_bytes;
    let compression_ratio = original_bytes as f64 / compressed_bytes as f64;
    let payload_ratio = original_bytes as f64 / payload_bytes.max(1) as f64;

    info!(
        name = %config.name,
        k = compressed.reduced.k(),
        d2 = correlation.estimate.d2,
        compression_ratio,
        payload_ratio,
        reconstruction_error,
        "pipeline finished"
    );

    Ok(PipelineReport {
        name: config.name.clone(),
        dimension: seq.dimension(),
        count: seq.len(),
        reduced_dimension: compressed.reduced.k(),
        retained_variance: compressed.reduced.retained_variance,
        correlation_dimension: correlation.estimate.d2,
        fit_log_r_min: correlation.estimate.log_r_min,
        fit_log_r_max: correlation.estimate.log_r_max,
        fit_r_squared: correlation.estimate.r_squared,
        mean_similarity: similarity.mean,
        min_similarity: similarity.min,
        similarity_values: similarity.values,
        original_bytes,
        payload_bytes,
        basis_bytes,
        compressed_bytes,
        compression_ratio,
        payload_ratio,
        bits: compressed.quantized.bits,
        error_metric: config.error_metric,
        reconstruction_error,
        quantization,
        clamped: compressed.quantized.clamped,
        code_entropy_bits: compressed.quantized.code_entropy_bits(),
        delta_stats: compressed.deltas.stats(),
        diagnosis,
        baselines,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::{self, ManifoldParams};
    use crate::quantize::QuantScope;

    fn small_manifold() -> VectorSequence {
        datasets::manifold_trajectory(60, 64, &ManifoldParams::default(), 11).unwrap()
    }

    #[test]
    fn compress_then_decompress_is_close() {
        let seq = small_manifold();
        let config = PipelineConfig {
            reduction: ReductionTarget::Components(8),
            ..PipelineConfig::default()
        };
        let compressed = compress(&seq, &config).unwrap();
        let back = compressed.decompress().unwrap();
        assert_eq!(back.len(), seq.len());
        assert_eq!(back.dimension(), seq.dimension());
        assert!(ErrorMetric::MeanAbsolute.measure(&seq, &back) < 0.02);
    }

    #[test]
    fn size_accounting() {
        let seq = small_manifold();
        let config = PipelineConfig {
            reduction: ReductionTarget::Components(4),
            quantizer: QuantizerConfig {
                scope: QuantScope::PerSequence,
                ..QuantizerConfig::default()
            },
            ..PipelineConfig::default()
        };
        let report = run(&seq, &config).unwrap();
        assert_eq!(report.original_bytes, 60 * 64 * 4);
        assert_eq!(report.payload_bytes, 60 * 4 + 8);
        assert_eq!(report.basis_bytes, (4 * 64 + 64) * 4);
        assert_eq!(report.compressed_bytes, report.payload_bytes + report.basis_bytes);
        let expected = report.original_bytes as f64 / report.compressed_bytes as f64;
        assert!((report.compression_ratio - expected).abs() < 1e-12);
        assert!(report.payload_ratio > report.compression_ratio);
    }

    #[test]
    fn error_metrics_agree_on_identity() {
        let seq = small_manifold();
        assert_eq!(ErrorMetric::MeanAbsolute.measure(&seq, &seq), 0.0);
        assert_eq!(ErrorMetric::MeanSquared.measure(&seq, &seq), 0.0);
    }

    #[test]
    fn squared_metric_is_reported_when_chosen() {
        let seq = small_manifold();
        let config = PipelineConfig {
            error_metric: ErrorMetric::MeanSquared,
            reduction: ReductionTarget::Components(6),
            ..PipelineConfig::default()
        };
        let report = run(&seq, &config).unwrap();
        assert_eq!(report.error_metric, ErrorMetric::MeanSquared);
        let back = compress(&seq, &config).unwrap().decompress().unwrap();
        let expected = ErrorMetric::MeanSquared.measure(&seq, &back);
        assert!((report.reconstruction_error - expected).abs() < 1e-12);
    }

    #[test]
    fn config_from_partial_json() {
        let config = PipelineConfig::from_json_str(
            r#"{"name": "drift", "quantizer": {"bits": 6, "scope": "PerSequence", "range": "MinMax"}}"#,
        )
        .unwrap();
        assert_eq!(config.name, "drift");
        assert_eq!(config.quantizer.bits, 6);
        assert_eq!(config.component_bytes, 4);
        assert_eq!(config.reduction, ReductionTarget::Variance(0.95));
    }

    #[test]
    fn invalid_config_fails_before_work() {
        let seq = small_manifold();
        let config = PipelineConfig {
            component_bytes: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(run(&seq, &config), Err(AttractorError::Configuration(_))));

        let err = PipelineConfig::from_json_str(r#"{"quantizer": {"bits": 20, "scope": "PerVector", "range": "MinMax"}}"#)
            .unwrap_err();
        assert!(matches!(err, AttractorError::Configuration(_)));

        assert!(matches!(
            PipelineConfig::from_json_str("{not json"),
            Err(AttractorError::Serialization(_))
        ));
    }

    #[test]
    fn components_beyond_dimension_rejected() {
        let seq = small_manifold();
        let config = PipelineConfig {
            reduction: ReductionTarget::Components(65),
            ..PipelineConfig::default()
        };
        assert!(matches!(run(&seq, &config), Err(AttractorError::Configuration(_))));
    }

    #[test]
    fn component_count_checked_before_similarity() {
        // A zero vector would fail the similarity stage; the config error wins.
        let mut vectors = small_manifold().to_vecs();
        vectors[5] = vec![0.0; 64];
        let seq = VectorSequence::new(vectors).unwrap();
        let config = PipelineConfig {
            reduction: ReductionTarget::Components(65),
            ..PipelineConfig::default()
        };
        assert!(matches!(run(&seq, &config), Err(AttractorError::Configuration(_))));
        assert!(matches!(compress(&seq, &config), Err(AttractorError::Configuration(_))));
    }

    #[test]
    fn per_vector_params_outweigh_tiny_vectors() {
        // D = 2, K = 1, 8 bits: 8 + 64 bits per vector against 64 bits of f32.
        let seq = VectorSequence::new(
            (0..20)
                .map(|i| {
                    let t = i as f32 * 0.1;
                    vec![t, 2.0 * t + 1.0]
                })
                .collect(),
        )
        .unwrap();
        let config = PipelineConfig {
            reduction: ReductionTarget::Components(1),
            ..PipelineConfig::default()
        };
        let compressed = compress(&seq, &config).unwrap();
        assert_eq!(compressed.payload_bytes(), 20 + 20 * 8);
        assert!(compressed.payload_bytes() > seq.byte_size(4));
    }

    #[test]
    fn decompress_uses_stored_precision() {
        let seq = small_manifold();
        let config = PipelineConfig {
            reduction: ReductionTarget::Components(4),
            ..PipelineConfig::default()
        };
        let compressed = compress(&seq, &config).unwrap();
        let narrow_basis = compressed.reduced.basis.to_stored_precision();
        let narrow_deltas = compressed.quantized.to_stored_precision().dequantize();
        let expected = pca::reconstruct_all(&narrow_basis, &narrow_deltas.decode()).unwrap();
        assert_eq!(compressed.decompress().unwrap(), expected);
    }

    #[test]
    fn baselines_follow_quantizer_settings() {
        let seq = small_manifold();
        let config = PipelineConfig {
            reduction: ReductionTarget::Components(4),
            ..PipelineConfig::default()
        };
        let report = run(&seq, &config).unwrap();
        assert_eq!(report.baselines.len(), 2);
        assert_eq!(report.baselines[0].method, BaselineMethod::Quantize);
        assert_eq!(report.baselines[1].method, BaselineMethod::DeltaQuantize);
        for b in &report.baselines {
            // 60 vectors × 64 one-byte codes, plus 60 parameter pairs.
            assert_eq!(b.payload_bytes, 60 * 64 + 60 * 8);
            assert!(b.reconstruction_error < 0.01, "{:?}", b);
            assert!(b.compression_ratio < report.payload_ratio);
        }

        let direct = baseline(&seq, BaselineMethod::Quantize, &config).unwrap();
        assert_eq!(direct, report.baselines[0]);

        let skipped = run(
            &seq,
            &PipelineConfig {
                compare_baselines: false,
                ..config
            },
        )
        .unwrap();
        assert!(skipped.baselines.is_empty());
    }

    #[test]
    fn report_json_round_trip() {
        let report = run(&small_manifold(), &PipelineConfig::default()).unwrap();
        let json = report.to_json().unwrap();
        assert!(json.contains("\"compression_ratio\""));
        assert_eq!(PipelineReport::from_json(&json).unwrap(), report);
    }
}

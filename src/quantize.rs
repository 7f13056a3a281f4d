//! Fixed-point scalar quantization of delta vectors.
//!
//! Each component is mapped to an unsigned integer code with an affine
//! scale/offset:
//!
//! ```text
//! scale  = (max - min) / (2^bits - 1)
//! offset = min
//! code   = clamp(round((x - offset) / scale), 0, 2^bits - 1)
//! x̂      = code * scale + offset
//! ```
//!
//! For unclamped components the rounding error is at most `scale / 2`.
//!
//! ## Scope
//!
//! | Scope | Params stored | Trade-off |
//! |-------|---------------|-----------|
//! | `PerVector` | N (scale, offset) pairs | tight ranges, more overhead |
//! | `PerSequence` | 1 pair | cheapest, but the baseline row widens the range |
//!
//! ## Saturation
//!
//! With [`QuantRange::MinMax`] the range covers every value, so clamping only
//! absorbs rounding at the edges. [`QuantRange::Fixed`] imposes a caller
//! range (a fixed step size, like a plain `i16` cast of scaled deltas); values
//! outside it saturate. Saturation is a defined policy, not an error: clamped
//! components are counted and their error flows into every error metric.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::delta::DeltaSequence;
use crate::error::{AttractorError, Result};

/// Bytes per stored scale or offset (f32).
pub const PARAM_BYTES: usize = 4;

/// Largest supported code width.
pub const MAX_BITS: u8 = 16;

/// Which values share one (scale, offset) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QuantScope {
    /// One pair per delta vector.
    #[default]
    PerVector,
    /// One pair for the whole sequence.
    PerSequence,
}

/// How the quantization range is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum QuantRange {
    /// Min and max of the covered values.
    #[default]
    MinMax,
    /// Fixed caller range; values outside saturate.
    Fixed { min: f64, max: f64 },
}

/// Quantizer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantizerConfig {
    /// Bits per code, 1..=16 (default: 8).
    pub bits: u8,
    /// Parameter sharing (default: per vector).
    pub scope: QuantScope,
    /// Range selection (default: min/max).
    pub range: QuantRange,
}

impl Default for QuantizerConfig {
    fn default() -> Self {
        Self {
            bits: 8,
            scope: QuantScope::PerVector,
            range: QuantRange::MinMax,
        }
    }
}

impl QuantizerConfig {
    /// Reject invalid parameters.
    pub fn validate(&self) -> Result<()> {
        if self.bits == 0 || self.bits > MAX_BITS {
            return Err(AttractorError::config(format!(
                "bit width must be in 1..={MAX_BITS}, got {}",
                self.bits
            )));
        }
        if let QuantRange::Fixed { min, max } = self.range {
            if !(min.is_finite() && max.is_finite()) || min >= max {
                return Err(AttractorError::config(format!(
                    "fixed quantization range must satisfy min < max, got [{min}, {max}]"
                )));
            }
        }
        Ok(())
    }

    /// Largest representable code, `2^bits - 1`.
    #[inline]
    pub fn max_code(&self) -> u16 {
        ((1u32 << self.bits) - 1) as u16
    }
}

/// Affine dequantization parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantParams {
    pub scale: f64,
    pub offset: f64,
}

impl QuantParams {
    /// Parameters covering `[min, max]` with `max_code + 1` levels.
    ///
    /// A constant signal (`min == max`) gets scale 1 so every value encodes to
    /// code 0 and decodes back to exactly `min`.
    pub fn from_range(min: f64, max: f64, max_code: u16) -> Self {
        let span = max - min;
        let scale = if span > 0.0 {
            span / f64::from(max_code)
        } else {
            1.0
        };
        Self { scale, offset: min }
    }

    /// Encode one value; the flag is set when the code saturated.
    #[inline]
    pub fn encode(&self, x: f64, max_code: u16) -> (u16, bool) {
        let level = ((x - self.offset) / self.scale).round();
        if level < 0.0 {
            (0, true)
        } else if level > f64::from(max_code) {
            (max_code, true)
        } else {
            (level as u16, false)
        }
    }

    /// Decode one code.
    #[inline]
    pub fn decode(&self, code: u16) -> f64 {
        f64::from(code) * self.scale + self.offset
    }

    /// The parameters as they are stored: rounded to f32.
    pub fn stored(&self) -> Self {
        Self {
            scale: f64::from(self.scale as f32),
            offset: f64::from(self.offset as f32),
        }
    }
}

/// Codes and parameters for one delta vector.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedRecord {
    /// One code per component.
    pub codes: Vec<u16>,
    /// Parameters used for this record (shared across records for
    /// [`QuantScope::PerSequence`]).
    pub params: QuantParams,
}

impl QuantizedRecord {
    /// Approximate delta vector.
    pub fn dequantize(&self) -> Vec<f64> {
        self.codes.iter().map(|&c| self.params.decode(c)).collect()
    }
}

/// Error of dequantized deltas against the originals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantizationError {
    /// Mean |x̂ - x|.
    pub mean_abs: f64,
    /// Mean (x̂ - x)².
    pub mean_squared: f64,
    /// Largest |x̂ - x|.
    pub max_abs: f64,
    /// Components that saturated.
    pub clamped: usize,
}

/// A fully quantized delta sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedSequence {
    /// One record per delta vector, in order.
    pub records: Vec<QuantizedRecord>,
    /// Code width.
    pub bits: u8,
    /// Parameter sharing used.
    pub scope: QuantScope,
    /// Components that saturated during encoding.
    pub clamped: usize,
}

impl QuantizedSequence {
    /// Number of records (N).
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when there are no records.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Components per record (K).
    #[inline]
    pub fn dimension(&self) -> usize {
        self.records.first().map(|r| r.codes.len()).unwrap_or(0)
    }

    /// Stored (scale, offset) pairs: N for per-vector scope, 1 otherwise.
    #[inline]
    pub fn param_pairs(&self) -> usize {
        match self.scope {
            QuantScope::PerVector => self.records.len(),
            QuantScope::PerSequence => 1,
        }
    }

    /// Bytes for the packed codes plus the stored parameters.
    pub fn payload_bytes(&self) -> usize {
        let code_bits = self.len() * self.dimension() * usize::from(self.bits);
        code_bits.div_ceil(8) + self.param_pairs() * 2 * PARAM_BYTES
    }

    /// Copy with every (scale, offset) pair rounded to its stored f32 width,
    /// so decoding matches what [`payload_bytes`](Self::payload_bytes) pays for.
    pub fn to_stored_precision(&self) -> Self {
        Self {
            records: self
                .records
                .iter()
                .map(|r| QuantizedRecord {
                    codes: r.codes.clone(),
                    params: r.params.stored(),
                })
                .collect(),
            ..self.clone()
        }
    }

    /// Reconstruct approximate deltas.
    pub fn dequantize(&self) -> DeltaSequence {
        DeltaSequence {
            deltas: self.records.iter().map(QuantizedRecord::dequantize).collect(),
        }
    }

    /// Compare dequantized deltas against `original`.
    pub fn error_against(&self, original: &DeltaSequence) -> QuantizationError {
        let mut sum_abs = 0.0;
        let mut sum_sq = 0.0;
        let mut max_abs = 0.0f64;
        let mut count = 0usize;
        for (record, delta) in self.records.iter().zip(&original.deltas) {
            for (&code, &x) in record.codes.iter().zip(delta) {
                let err = (record.params.decode(code) - x).abs();
                sum_abs += err;
                sum_sq += err * err;
                max_abs = max_abs.max(err);
                count += 1;
            }
        }
        let denom = count.max(1) as f64;
        QuantizationError {
            mean_abs: sum_abs / denom,
            mean_squared: sum_sq / denom,
            max_abs,
            clamped: self.clamped,
        }
    }

    /// Shannon entropy of the code histogram, in bits per code.
    ///
    /// A lower bound on what an entropy coder could spend per component.
    pub fn code_entropy_bits(&self) -> f64 {
        let mut histogram: HashMap<u16, usize> = HashMap::new();
        let mut total = 0usize;
        for record in &self.records {
            for &code in &record.codes {
                *histogram.entry(code).or_insert(0) += 1;
                total += 1;
            }
        }
        if total == 0 {
            return 0.0;
        }
        let total = total as f64;
        histogram
            .values()
            .map(|&c| {
                let p = c as f64 / total;
                -p * p.log2()
            })
            .sum()
    }
}

fn min_max<'a>(values: impl IntoIterator<Item = &'a f64>) -> (f64, f64) {
    values
        .into_iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| (lo.min(x), hi.max(x)))
}

/// Quantize every delta vector.
///
/// # Errors
///
/// [`AttractorError::Configuration`] for an invalid config.
pub fn quantize(deltas: &DeltaSequence, config: &QuantizerConfig) -> Result<QuantizedSequence> {
    config.validate()?;
    let max_code = config.max_code();

    let params_for = |values: &[f64]| -> QuantParams {
        let (min, max) = match config.range {
            QuantRange::Fixed { min, max } => (min, max),
            QuantRange::MinMax => min_max(values),
        };
        QuantParams::from_range(min, max, max_code)
    };

    let shared = match config.scope {
        QuantScope::PerSequence => {
            let (min, max) = match config.range {
                QuantRange::Fixed { min, max } => (min, max),
                QuantRange::MinMax => min_max(deltas.deltas.iter().flatten()),
            };
            Some(QuantParams::from_range(min, max, max_code))
        }
        QuantScope::PerVector => None,
    };

    let mut clamped = 0usize;
    let records: Vec<QuantizedRecord> = deltas
        .deltas
        .iter()
        .map(|delta| {
            let params = shared.unwrap_or_else(|| params_for(delta));
            let codes = delta
                .iter()
                .map(|&x| {
                    let (code, saturated) = params.encode(x, max_code);
                    clamped += usize::from(saturated);
                    code
                })
                .collect();
            QuantizedRecord { codes, params }
        })
        .collect();

    if clamped > 0 {
        warn!(clamped, bits = config.bits, "quantization saturated");
    }
    debug!(
        records = records.len(),
        bits = config.bits,
        scope = ?config.scope,
        "quantized deltas"
    );

    Ok(QuantizedSequence {
        records,
        bits: config.bits,
        scope: config.scope,
        clamped,
    })
}

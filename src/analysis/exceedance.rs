//! Exceedance reduction.
//!
//! Callers pass only the values that survived extraction; skipped years are
//! already gone from both numerator and denominator.

/// Decimal places kept in a reported probability.
pub const PROBABILITY_DECIMALS: i32 = 4;

/// Fraction of `values` strictly greater than `threshold`.
///
/// An empty series yields exactly 0.0.
pub fn exceedance_ratio(values: &[f64], threshold: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let exceeding = values.iter().filter(|&&v| v > threshold).count();
    exceeding as f64 / values.len() as f64
}

/// Rounds a probability to [`PROBABILITY_DECIMALS`] places.
pub fn round_probability(probability: f64) -> f64 {
    let scale = 10f64.powi(PROBABILITY_DECIMALS);
    (probability * scale).round() / scale
}

/// Descriptive statistics of a value series, logged alongside each ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Population standard deviation.
    pub std_dev: f64,
}

impl SampleSummary {
    /// Returns `None` for an empty series.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let count = values.len();
        let n = count as f64;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

        Some(Self {
            count,
            min,
            max,
            mean,
            std_dev: variance.sqrt(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

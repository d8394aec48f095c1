//! Sketch configuration.

use snafu::Snafu;

const MAX_KEY: i16 = i16::MAX;

const DEFAULT_RELATIVE_ACCURACY: f64 = 1.0 / 128.0;
const DEFAULT_BIN_LIMIT: u16 = 4096;
const DEFAULT_MIN_VALUE: f64 = 1.0e-9;

/// Sketch configuration error.
#[derive(Debug, Snafu, PartialEq)]
#[snafu(context(suffix(false)))]
pub enum SketchConfigError {
    /// Relative accuracy was outside of `(0, 1)`.
    #[snafu(display("relative accuracy must be between 0.0 and 1.0 (exclusive), got {}", value))]
    InvalidRelativeAccuracy {
        /// The rejected value.
        value: f64,
    },

    /// Minimum value was not strictly positive.
    #[snafu(display("minimum value must be greater than 0.0, got {}", value))]
    InvalidMinValue {
        /// The rejected value.
        value: f64,
    },

    /// Bin limit was zero.
    #[snafu(display("bin limit must be greater than 0"))]
    InvalidBinLimit,

    /// The derived key bias does not fit the bin key type.
    #[snafu(display("minimum value {} is too small to be represented with relative accuracy {}", min_value, rel_accuracy))]
    UnrepresentableMinValue {
        /// Requested minimum value.
        min_value: f64,

        /// Requested relative accuracy.
        rel_accuracy: f64,
    },
}

/// Sketch configuration.
///
/// Describes the logarithmic mapping from values to bin keys, and how many bins a sketch may hold. Bin `k` holds values
/// `v` such that `γ^(k - bias) <= v < γ^(k + 1 - bias)`, where `γ = 1 + 2α` for a relative accuracy of `α`.
///
/// # Accuracy
///
/// As long as no bins have been collapsed (see [`bin_limit`][Self::bin_limit]), a quantile estimate for a sample set
/// of non-negative values at or above [`min_value`][Self::min_value] lies within a factor of `γ` of the sample at the
/// requested rank: the relative error is at most `2α`. With the default configuration, that is 1/64, or ~1.6%.
///
/// Values below the minimum value, including zero and negative values, all share bin zero.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SketchConfig {
    rel_accuracy: f64,
    bin_limit: u16,
    min_value: f64,

    // gamma_ln is the natural log of gamma_v, used to speed up calculating log base gamma.
    gamma_v: f64,
    gamma_ln: f64,

    // Smallest value mapped to a non-zero key.
    norm_min: f64,

    // Bias of the exponent, used to ensure key(x) >= 1 for x >= norm_min.
    norm_bias: i32,
}

impl SketchConfig {
    /// Creates a new `SketchConfig` from the given relative accuracy, bin limit, and minimum value.
    ///
    /// # Errors
    ///
    /// If the relative accuracy is not within `(0, 1)`, the bin limit is zero, or the minimum value is not positive (or
    /// is too small to be represented with the given relative accuracy), an error is returned.
    pub fn new(rel_accuracy: f64, bin_limit: u16, min_value: f64) -> Result<Self, SketchConfigError> {
        if rel_accuracy.is_nan() || rel_accuracy <= 0.0 || rel_accuracy >= 1.0 {
            return Err(SketchConfigError::InvalidRelativeAccuracy { value: rel_accuracy });
        }
        if min_value.is_nan() || min_value <= 0.0 || min_value.is_infinite() {
            return Err(SketchConfigError::InvalidMinValue { value: min_value });
        }
        if bin_limit == 0 {
            return Err(SketchConfigError::InvalidBinLimit);
        }

        let two_rel_accuracy = rel_accuracy * 2.0;
        let gamma_v = 1.0 + two_rel_accuracy;
        let gamma_ln = two_rel_accuracy.ln_1p();

        // The bias must leave room for keys above it, so keep it well inside of the key type.
        let raw_norm_eff_min = (min_value.ln() / gamma_ln).floor();
        if raw_norm_eff_min <= -f64::from(MAX_KEY / 2) {
            return Err(SketchConfigError::UnrepresentableMinValue {
                min_value,
                rel_accuracy,
            });
        }

        #[allow(clippy::cast_possible_truncation)]
        let norm_bias = -(raw_norm_eff_min as i32) + 1;
        let norm_min = gamma_v.powf(f64::from(1 - norm_bias));

        Ok(Self {
            rel_accuracy,
            bin_limit,
            min_value,
            gamma_v,
            gamma_ln,
            norm_min,
            norm_bias,
        })
    }

    /// Returns the relative accuracy, `α`.
    pub fn relative_accuracy(&self) -> f64 {
        self.rel_accuracy
    }

    /// Returns the maximum number of bins a sketch will hold before collapsing its lowest bins.
    pub fn bin_limit(&self) -> u16 {
        self.bin_limit
    }

    /// Returns the smallest value that is tracked with the configured relative accuracy.
    pub fn min_value(&self) -> f64 {
        self.min_value
    }

    /// Returns the ratio between the bounds of adjacent bins, `γ`.
    pub fn gamma(&self) -> f64 {
        self.gamma_v
    }

    /// Gets the value lower bound of the bin at the given key.
    #[inline]
    pub(crate) fn bin_lower_bound(&self, k: i16) -> f64 {
        if k <= 0 {
            return 0.0;
        }

        if k == MAX_KEY {
            return f64::INFINITY;
        }

        self.gamma_v.powf(f64::from(i32::from(k) - self.norm_bias))
    }

    /// Gets the value upper bound (exclusive) of the bin at the given key.
    #[inline]
    pub(crate) fn bin_upper_bound(&self, k: i16) -> f64 {
        if k <= 0 {
            return self.norm_min;
        }

        self.bin_lower_bound(k.saturating_add(1))
    }

    /// Gets the key for the given value.
    ///
    /// The key corresponds to the bin where this value would be represented, such that `γ^k <= v < γ^(k+1)` once the
    /// bias is removed.
    #[allow(clippy::cast_possible_truncation)]
    #[inline]
    pub(crate) fn key(&self, v: f64) -> i16 {
        if v.is_nan() || v < self.norm_min {
            return 0;
        }

        if v.is_infinite() {
            return MAX_KEY;
        }

        // `log_gamma` of any finite f64 is well within i32 for any valid gamma, so the truncation is safe.
        let floored = self.log_gamma(v).floor() as i32;
        let key = floored.saturating_add(self.norm_bias);

        key.clamp(1, i32::from(MAX_KEY)) as i16
    }

    #[inline]
    fn log_gamma(&self, v: f64) -> f64 {
        v.ln() / self.gamma_ln
    }
}

impl Default for SketchConfig {
    fn default() -> Self {
        // Inlined rather than going through `new`, which cannot fail for these values.
        let two_rel_accuracy = DEFAULT_RELATIVE_ACCURACY * 2.0;
        let gamma_v = 1.0 + two_rel_accuracy;
        let gamma_ln = two_rel_accuracy.ln_1p();

        #[allow(clippy::cast_possible_truncation)]
        let norm_bias = -((DEFAULT_MIN_VALUE.ln() / gamma_ln).floor() as i32) + 1;

        Self {
            rel_accuracy: DEFAULT_RELATIVE_ACCURACY,
            bin_limit: DEFAULT_BIN_LIMIT,
            min_value: DEFAULT_MIN_VALUE,
            gamma_v,
            gamma_ln,
            norm_min: gamma_v.powf(f64::from(1 - norm_bias)),
            norm_bias,
        }
    }
}

//! Streaming quantile sketch.

use std::cmp::Ordering;

use smallvec::SmallVec;
use snafu::Snafu;

use crate::bin::Bin;
use crate::common::float_eq;
use crate::config::SketchConfig;

/// Merge error.
#[derive(Debug, Snafu, Eq, PartialEq)]
#[snafu(context(suffix(false)))]
pub enum MergeError {
    /// The sketches were built with different configurations, so their bins do not line up.
    #[snafu(display("cannot merge sketches with different configurations"))]
    ConfigurationMismatch,
}

/// [DDSketch][ddsketch] streaming quantile estimator.
///
/// Samples are inserted one at a time (or `n` at a time, for repeated values), and quantiles can be queried at any
/// point, including between insertions. Alongside the bins, the sketch tracks exact count, minimum, maximum, and sum.
///
/// # Memory
///
/// The sketch holds at most [`SketchConfig::bin_limit`] bins. When an insertion would exceed that, the lowest bins are
/// collapsed into the lowest remaining bin, so the sketch never grows beyond the limit no matter how many samples it
/// sees.
///
/// # Querying
///
/// A quantile `q` is resolved to the rank `round(q * (count - 1))`. The bin holding that rank is located by walking
/// the cumulative bin counts, and the estimate is linearly interpolated between the bounds of that bin by the rank's
/// position within it. The bounds of the first and last bins are tightened to the exact minimum and maximum, and every
/// estimate is clamped to `[min, max]`. See [`SketchConfig`] for the accuracy contract.
///
/// # Merging
///
/// Two sketches with identical configuration merge without any loss of accuracy: bins with equal keys have their
/// counts summed, the summary statistics are combined, and the bin limit is then re-applied.
///
/// [ddsketch]: https://www.vldb.org/pvldb/vol12/p2195-masson.pdf
#[derive(Clone, Debug)]
pub struct DDSketch {
    config: SketchConfig,

    /// The bins within the sketch, sorted by key.
    bins: SmallVec<[Bin; 4]>,

    /// The number of observations within the sketch.
    count: u64,

    /// The minimum value of all observations within the sketch.
    min: f64,

    /// The maximum value of all observations within the sketch.
    max: f64,

    /// The sum of all observations within the sketch.
    sum: f64,
}

impl DDSketch {
    /// Creates an empty sketch with the given configuration.
    pub fn new(config: SketchConfig) -> Self {
        Self {
            config,
            bins: SmallVec::new(),
            count: 0,
            min: f64::MAX,
            max: f64::MIN,
            sum: 0.0,
        }
    }

    /// Returns the configuration of this sketch.
    pub fn config(&self) -> &SketchConfig {
        &self.config
    }

    /// Returns the number of bins in the sketch.
    pub fn bin_count(&self) -> usize {
        self.bins.len()
    }

    /// Whether or not this sketch is empty.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of samples currently represented by this sketch.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Minimum value seen by this sketch.
    ///
    /// Returns `None` if the sketch is empty.
    pub fn min(&self) -> Option<f64> {
        if self.is_empty() {
            None
        } else {
            Some(self.min)
        }
    }

    /// Maximum value seen by this sketch.
    ///
    /// Returns `None` if the sketch is empty.
    pub fn max(&self) -> Option<f64> {
        if self.is_empty() {
            None
        } else {
            Some(self.max)
        }
    }

    /// Sum of all values seen by this sketch.
    ///
    /// Returns `None` if the sketch is empty.
    pub fn sum(&self) -> Option<f64> {
        if self.is_empty() {
            None
        } else {
            Some(self.sum)
        }
    }

    /// Average value seen by this sketch.
    ///
    /// Returns `None` if the sketch is empty.
    pub fn avg(&self) -> Option<f64> {
        if self.is_empty() {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }

    /// Returns the current bins of this sketch.
    pub fn bins(&self) -> &[Bin] {
        &self.bins
    }

    /// Clears the sketch, removing all bins and resetting all statistics.
    pub fn clear(&mut self) {
        self.count = 0;
        self.min = f64::MAX;
        self.max = f64::MIN;
        self.sum = 0.0;
        self.bins.clear();
    }

    fn adjust_basic_stats(&mut self, v: f64, n: u64) {
        if v < self.min {
            self.min = v;
        }

        if v > self.max {
            self.max = v;
        }

        self.count += n;
        self.sum += v * n as f64;
    }

    /// Inserts a single value into the sketch.
    pub fn insert(&mut self, v: f64) {
        self.insert_n(v, 1);
    }

    /// Inserts many values into the sketch.
    pub fn insert_many(&mut self, vs: &[f64]) {
        for v in vs {
            self.insert_n(*v, 1);
        }
    }

    /// Inserts a single value into the sketch `n` times.
    pub fn insert_n(&mut self, v: f64, n: u64) {
        if n == 0 || v.is_nan() {
            return;
        }

        self.adjust_basic_stats(v, n);

        let key = self.config.key(v);
        match self.bins.binary_search_by(|b| b.k.cmp(&key)) {
            // Fast path for adding to an existing bin.
            Ok(bin_idx) => self.bins[bin_idx].increment(n),
            Err(bin_idx) => {
                self.bins.insert(bin_idx, Bin { k: key, n });
                trim_left(&mut self.bins, self.config.bin_limit());
            }
        }
    }

    /// Gets the value at a given quantile.
    ///
    /// Quantiles at or below zero return the minimum, and quantiles at or above one return the maximum.
    ///
    /// Returns `None` if the sketch is empty.
    pub fn quantile(&self, q: f64) -> Option<f64> {
        if self.count == 0 {
            return None;
        }

        if q <= 0.0 {
            return Some(self.min);
        }

        if q >= 1.0 {
            return Some(self.max);
        }

        let wanted_rank = rank(self.count, q);
        let last_idx = self.bins.len() - 1;
        let mut n = 0.0;

        for (i, bin) in self.bins.iter().enumerate() {
            n += bin.n as f64;
            if n <= wanted_rank {
                continue;
            }

            let weight = (n - wanted_rank) / bin.n as f64;
            let mut v_low = self.config.bin_lower_bound(bin.k);
            let mut v_high = self.config.bin_upper_bound(bin.k);

            if i == 0 {
                v_low = self.min;
            }
            if i == last_idx {
                v_high = self.max;
            }

            let estimated = v_low * weight + v_high * (1.0 - weight);
            return Some(estimated.clamp(self.min, self.max));
        }

        Some(self.max)
    }

    /// Merges another sketch into this sketch, without a loss of accuracy.
    ///
    /// All samples present in the other sketch will be correctly represented in this sketch, and summary statistics
    /// such as the sum, average, count, min, and max, will represent the sum of samples from both sketches.
    ///
    /// # Errors
    ///
    /// If the other sketch was built with a different configuration, an error is returned and this sketch is left
    /// unchanged.
    pub fn merge(&mut self, other: &DDSketch) -> Result<(), MergeError> {
        if self.config != other.config {
            return Err(MergeError::ConfigurationMismatch);
        }

        if other.is_empty() {
            return Ok(());
        }

        self.count += other.count;
        if other.max > self.max {
            self.max = other.max;
        }
        if other.min < self.min {
            self.min = other.min;
        }
        self.sum += other.sum;

        let mut temp = SmallVec::<[Bin; 4]>::with_capacity(self.bins.len() + other.bins.len());
        let mut ours = self.bins.iter().peekable();
        let mut theirs = other.bins.iter().peekable();

        loop {
            let next = match (ours.peek(), theirs.peek()) {
                (Some(a), Some(b)) => match a.k.cmp(&b.k) {
                    Ordering::Less => ours.next().copied(),
                    Ordering::Greater => theirs.next().copied(),
                    Ordering::Equal => {
                        let mut merged = **a;
                        merged.increment(b.n);
                        ours.next();
                        theirs.next();
                        Some(merged)
                    }
                },
                (Some(_), None) => ours.next().copied(),
                (None, Some(_)) => theirs.next().copied(),
                (None, None) => None,
            };

            match next {
                Some(bin) => temp.push(bin),
                None => break,
            }
        }

        trim_left(&mut temp, self.config.bin_limit());
        self.bins = temp;

        Ok(())
    }
}

impl PartialEq for DDSketch {
    fn eq(&self, other: &Self) -> bool {
        // Sums can differ minimally purely due to floating-point accumulation order, despite being fed the same exact
        // samples, so they're compared by ratio.
        self.config == other.config
            && self.count == other.count
            && float_eq(self.min, other.min)
            && float_eq(self.max, other.max)
            && float_eq(self.sum, other.sum)
            && self.bins == other.bins
    }
}

impl Default for DDSketch {
    fn default() -> Self {
        Self::new(SketchConfig::default())
    }
}

fn rank(count: u64, q: f64) -> f64 {
    let rank = q * (count - 1) as f64;
    rank.round_ties_even()
}

fn trim_left(bins: &mut SmallVec<[Bin; 4]>, bin_limit: u16) {
    let bin_limit = usize::from(bin_limit);
    if bin_limit == 0 || bins.len() <= bin_limit {
        return;
    }

    // Fold the counts of the lowest bins into the lowest bin we keep.
    let num_to_remove = bins.len() - bin_limit;
    let collapsed = bins[..num_to_remove].iter().fold(0u64, |acc, bin| acc.saturating_add(bin.n));
    bins[num_to_remove].increment(collapsed);
    bins.drain(..num_to_remove);
}

//! Memory and billing ladders.
//!
//! Both ladders are immutable once built, and are meant to be constructed once at startup and shared by reference.

use snafu::Snafu;

const DEFAULT_MEMORY_MIN_MB: u32 = 128;
const DEFAULT_MEMORY_MAX_MB: u32 = 3008;
const DEFAULT_MEMORY_STEP_MB: u32 = 64;

const DEFAULT_BILLING_GRANULARITY_MS: u32 = 100;
const DEFAULT_BILLING_MAX_DURATION_MS: u32 = 900_000;

/// Ladder construction error.
#[derive(Debug, Snafu, Eq, PartialEq)]
#[snafu(context(suffix(false)))]
pub enum LadderError {
    /// The ladder range is empty.
    #[snafu(display("invalid ladder range: lower bound {} must be non-zero and not exceed upper bound {}", min, max))]
    InvalidRange {
        /// Lower bound of the range.
        min: u32,

        /// Upper bound of the range.
        max: u32,
    },

    /// The ladder step is zero.
    #[snafu(display("ladder step must be greater than zero"))]
    InvalidStep,
}

/// The memory sizes a function can be configured with, in ascending order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MemoryLadder {
    sizes: Vec<u32>,
}

impl MemoryLadder {
    /// Builds the ladder from `min_mb` up to and including `max_mb`, with a fixed stride of `step_mb`.
    ///
    /// If the range isn't a multiple of the stride, the last entry is the largest step not exceeding `max_mb`.
    ///
    /// # Errors
    ///
    /// If `min_mb` is zero or greater than `max_mb`, or if `step_mb` is zero, an error is returned.
    pub fn new(min_mb: u32, max_mb: u32, step_mb: u32) -> Result<Self, LadderError> {
        if step_mb == 0 {
            return Err(LadderError::InvalidStep);
        }
        if min_mb == 0 || min_mb > max_mb {
            return Err(LadderError::InvalidRange { min: min_mb, max: max_mb });
        }

        let sizes = (min_mb..=max_mb).step_by(step_mb as usize).collect();
        Ok(Self { sizes })
    }

    /// Returns all sizes on the ladder, in ascending order.
    pub fn sizes(&self) -> &[u32] {
        &self.sizes
    }

    /// Returns the number of sizes on the ladder.
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    /// Returns `true` if the ladder has no sizes.
    ///
    /// A successfully constructed ladder always has at least one size.
    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// Returns the smallest size on the ladder.
    pub fn smallest(&self) -> u32 {
        self.sizes[0]
    }

    /// Returns the largest size on the ladder.
    pub fn largest(&self) -> u32 {
        self.sizes[self.sizes.len() - 1]
    }

    /// Returns the size at the given index, clamping the index to the last entry of the ladder.
    pub fn clamped(&self, index: usize) -> u32 {
        self.sizes[index.min(self.sizes.len() - 1)]
    }

    /// Returns the zero-based index of the given size, if it is exactly on the ladder.
    pub fn index_of(&self, size_mb: u32) -> Option<usize> {
        self.sizes.binary_search(&size_mb).ok()
    }

    /// Locates a configured memory size on the ladder.
    ///
    /// Returns the one-based position of the first ladder entry at or above `size_mb`, along with that entry. Sizes
    /// beyond the top of the ladder resolve to position zero and the smallest size.
    pub fn locate(&self, size_mb: u32) -> (usize, u32) {
        match self.sizes.iter().position(|&size| size >= size_mb) {
            Some(idx) => (idx + 1, self.sizes[idx]),
            None => (0, self.smallest()),
        }
    }
}

impl Default for MemoryLadder {
    fn default() -> Self {
        let sizes = (DEFAULT_MEMORY_MIN_MB..=DEFAULT_MEMORY_MAX_MB)
            .step_by(DEFAULT_MEMORY_STEP_MB as usize)
            .collect();
        Self { sizes }
    }
}

/// The step function mapping an execution duration to its billed duration.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BillingLadder {
    granularity_ms: u32,
    max_duration_ms: u32,
}

impl BillingLadder {
    /// Creates a billing ladder with steps of `granularity_ms`, up to and including `max_duration_ms`.
    ///
    /// # Errors
    ///
    /// If `granularity_ms` is zero, or `max_duration_ms` is smaller than a single step, an error is returned.
    pub fn new(granularity_ms: u32, max_duration_ms: u32) -> Result<Self, LadderError> {
        if granularity_ms == 0 {
            return Err(LadderError::InvalidStep);
        }
        if max_duration_ms < granularity_ms {
            return Err(LadderError::InvalidRange {
                min: granularity_ms,
                max: max_duration_ms,
            });
        }

        Ok(Self {
            granularity_ms,
            max_duration_ms,
        })
    }

    /// Returns the billing granularity, in milliseconds.
    pub fn granularity_ms(&self) -> u32 {
        self.granularity_ms
    }

    /// Returns the maximum billable duration, in milliseconds.
    pub fn max_duration_ms(&self) -> u32 {
        self.max_duration_ms
    }

    /// Returns the number of steps on the ladder.
    pub fn steps(&self) -> usize {
        (self.max_duration_ms / self.granularity_ms) as usize
    }

    /// Maps a duration to its step on the ladder.
    ///
    /// The duration is rounded up to the next whole millisecond, and the result is the index and value of the smallest
    /// step _strictly_ greater than it: a duration landing exactly on a step boundary is billed at the next step.
    /// Durations that would be billed beyond the top of the ladder saturate to the top step.
    pub fn bill(&self, duration_ms: f64) -> (usize, u32) {
        let granularity = u64::from(self.granularity_ms);

        // Negative and NaN durations saturate to zero.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let rounded = duration_ms.ceil().max(0.0) as u64;

        let index = rounded / granularity;
        let billed = index.saturating_add(1).saturating_mul(granularity);
        if billed > u64::from(self.max_duration_ms) {
            let top = self.steps() - 1;
            return (top, (top as u32 + 1) * self.granularity_ms);
        }

        // `billed` is bounded by `max_duration_ms`, so both conversions are lossless.
        (index as usize, billed as u32)
    }
}

impl Default for BillingLadder {
    fn default() -> Self {
        Self {
            granularity_ms: DEFAULT_BILLING_GRANULARITY_MS,
            max_duration_ms: DEFAULT_BILLING_MAX_DURATION_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn default_memory_ladder() {
        let ladder = MemoryLadder::default();
        assert_eq!(ladder.smallest(), 128);
        assert_eq!(ladder.largest(), 3008);
        assert_eq!(ladder.len(), 46);
        assert_eq!(ladder, MemoryLadder::new(128, 3008, 64).unwrap());
    }

    #[test]
    fn memory_ladder_rejects_bad_parameters() {
        assert_eq!(MemoryLadder::new(128, 3008, 0), Err(LadderError::InvalidStep));
        assert_eq!(
            MemoryLadder::new(4096, 128, 64),
            Err(LadderError::InvalidRange { min: 4096, max: 128 })
        );
        assert_eq!(
            MemoryLadder::new(0, 128, 64),
            Err(LadderError::InvalidRange { min: 0, max: 128 })
        );
    }

    #[test]
    fn memory_ladder_uneven_range() {
        let ladder = MemoryLadder::new(128, 300, 64).unwrap();
        assert_eq!(ladder.sizes(), &[128, 192, 256]);
    }

    #[test]
    fn locate_memory_size() {
        let ladder = MemoryLadder::default();
        assert_eq!(ladder.locate(128), (1, 128));
        assert_eq!(ladder.locate(130), (2, 192));
        assert_eq!(ladder.locate(1024), (15, 1024));
        assert_eq!(ladder.locate(3008), (46, 3008));
        assert_eq!(ladder.locate(10240), (0, 128));
    }

    #[test]
    fn clamped_index() {
        let ladder = MemoryLadder::default();
        assert_eq!(ladder.clamped(0), 128);
        assert_eq!(ladder.clamped(45), 3008);
        assert_eq!(ladder.clamped(1000), 3008);
    }

    #[test]
    fn index_of_exact_sizes_only() {
        let ladder = MemoryLadder::default();
        assert_eq!(ladder.index_of(128), Some(0));
        assert_eq!(ladder.index_of(3008), Some(45));
        assert_eq!(ladder.index_of(129), None);
    }

    #[test]
    fn billing_steps() {
        let ladder = BillingLadder::default();
        assert_eq!(ladder.bill(50.0), (0, 100));
        assert_eq!(ladder.bill(150.0), (1, 200));
        assert_eq!(ladder.bill(98.5), (0, 100));
        assert_eq!(ladder.bill(99.01), (1, 200));
        assert_eq!(ladder.bill(274.08), (2, 300));
        assert_eq!(ladder.bill(2337.93), (23, 2400));
    }

    #[test]
    fn billing_boundary_maps_to_next_step() {
        let ladder = BillingLadder::default();
        assert_eq!(ladder.bill(0.0), (0, 100));
        assert_eq!(ladder.bill(100.0), (1, 200));
        assert_eq!(ladder.bill(200.0), (2, 300));
    }

    #[test]
    fn billing_beyond_cap_saturates() {
        let ladder = BillingLadder::default();
        assert_eq!(ladder.steps(), 9000);
        assert_eq!(ladder.bill(899_899.0), (8998, 899_900));
        assert_eq!(ladder.bill(899_900.0), (8999, 900_000));
        assert_eq!(ladder.bill(899_999.5), (8999, 900_000));
        assert_eq!(ladder.bill(900_000.0), (8999, 900_000));
        assert_eq!(ladder.bill(1_200_000.0), (8999, 900_000));
        assert_eq!(ladder.bill(f64::INFINITY), (8999, 900_000));
    }

    #[test]
    fn billing_top_step_with_uneven_cap() {
        let ladder = BillingLadder::new(100, 950).unwrap();
        assert_eq!(ladder.steps(), 9);
        assert_eq!(ladder.bill(850.0), (8, 900));
        assert_eq!(ladder.bill(900.0), (8, 900));
    }

    #[test]
    fn billing_degenerate_durations() {
        let ladder = BillingLadder::default();
        assert_eq!(ladder.bill(-5.0), (0, 100));
        assert_eq!(ladder.bill(f64::NAN), (0, 100));
    }

    #[test]
    fn billing_ladder_rejects_bad_parameters() {
        assert_eq!(BillingLadder::new(0, 900_000), Err(LadderError::InvalidStep));
        assert_eq!(
            BillingLadder::new(100, 50),
            Err(LadderError::InvalidRange { min: 100, max: 50 })
        );
        assert_eq!(BillingLadder::new(1, 900_000).unwrap().bill(12.3), (13, 14));
    }

    proptest! {
        #[test]
        fn property_test_billed_strictly_greater(duration in 0.0f64..899_900.0) {
            let ladder = BillingLadder::default();
            let (index, billed) = ladder.bill(duration);

            prop_assert!(f64::from(billed) > duration.ceil());
            prop_assert!(f64::from(billed) - f64::from(ladder.granularity_ms()) <= duration.ceil());
            prop_assert_eq!(billed, (index as u32 + 1) * ladder.granularity_ms());
        }

        #[test]
        fn property_test_billing_is_monotonic(a in 0.0f64..2_000_000.0, b in 0.0f64..2_000_000.0) {
            let ladder = BillingLadder::default();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let (lo_index, lo_billed) = ladder.bill(lo);
            let (hi_index, hi_billed) = ladder.bill(hi);

            prop_assert!(lo_index <= hi_index);
            prop_assert!(lo_billed <= hi_billed);
            prop_assert!(hi_billed <= ladder.max_duration_ms());
        }
    }
}

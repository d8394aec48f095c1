//! Memory size suggestions.

use crate::{
    bucket::Bucket,
    ladder::{BillingLadder, MemoryLadder},
};

/// Suggests memory sizes based on a bucket's observed durations.
///
/// Duration is treated as roughly inversely proportional to the compute allocated to a function, which itself scales
/// with memory. The billing step of the duration at a given percentile is averaged with the bucket's current position
/// on the memory ladder, giving a damped adjustment towards the size implied by the duration alone:
///
/// ```text
/// suggested = memory_ladder[min((billing_index(duration(p)) + memory_position(size)) / 2, len - 1)]
/// ```
///
/// where the division is integer division.
#[derive(Clone, Copy, Debug)]
pub struct SuggestionEngine<'a> {
    memory: &'a MemoryLadder,
    billing: &'a BillingLadder,
}

impl<'a> SuggestionEngine<'a> {
    /// Creates a new `SuggestionEngine` over the given ladders.
    pub fn new(memory: &'a MemoryLadder, billing: &'a BillingLadder) -> Self {
        Self { memory, billing }
    }

    /// Returns the suggested memory size for the given bucket at the given percentile.
    ///
    /// The result is always a size on the memory ladder. Empty buckets are treated as having a duration of zero.
    pub fn suggest_memory(&self, bucket: &Bucket, percentile: f64) -> u32 {
        let target_duration = bucket.duration_quantile(percentile).unwrap_or(0.0);
        let (target_index, _) = self.billing.bill(target_duration);
        let (current_index, _) = self.memory.locate(bucket.size_mb());

        self.memory.clamped((target_index + current_index) / 2)
    }
}

//! Per-memory-size invocation statistics.

use std::collections::BTreeMap;

use ddsketch::{DDSketch, SketchConfig};

/// Running statistics for every invocation observed at a single configured memory size.
///
/// Durations and memory usage are tracked with bounded-memory sketches, so a bucket's footprint doesn't grow with the
/// number of invocations. Billed durations are tallied exactly, since their domain is bounded by the billing ladder.
#[derive(Clone, Debug)]
pub struct Bucket {
    size_mb: u32,
    count: u64,
    durations: DDSketch,
    memory_used: DDSketch,
    billed_durations: BTreeMap<u32, u64>,
}

impl Bucket {
    /// Creates an empty bucket for the given memory size.
    pub fn new(size_mb: u32, sketch_config: SketchConfig) -> Self {
        Self {
            size_mb,
            count: 0,
            durations: DDSketch::new(sketch_config),
            memory_used: DDSketch::new(sketch_config),
            billed_durations: BTreeMap::new(),
        }
    }

    /// Records a single invocation.
    pub fn update(&mut self, duration_ms: f64, memory_used_mb: f64, billed_duration_ms: u32) {
        self.count += 1;
        self.durations.insert(duration_ms);
        self.memory_used.insert(memory_used_mb);
        *self.billed_durations.entry(billed_duration_ms).or_default() += 1;
    }

    /// Returns the configured memory size of this bucket, in megabytes.
    pub fn size_mb(&self) -> u32 {
        self.size_mb
    }

    /// Returns the number of invocations recorded.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Returns `true` if no invocations have been recorded.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Returns the sketch of execution durations.
    pub fn durations(&self) -> &DDSketch {
        &self.durations
    }

    /// Returns the sketch of maximum memory used.
    pub fn memory_used(&self) -> &DDSketch {
        &self.memory_used
    }

    /// Returns the approximate duration at the given quantile, or `None` if the bucket is empty.
    pub fn duration_quantile(&self, q: f64) -> Option<f64> {
        self.durations.quantile(q)
    }

    /// Returns the approximate memory usage at the given quantile, or `None` if the bucket is empty.
    pub fn memory_used_quantile(&self, q: f64) -> Option<f64> {
        self.memory_used.quantile(q)
    }

    /// Returns the number of invocations per billed duration, in ascending order of billed duration.
    pub fn billed_durations(&self) -> impl Iterator<Item = (u32, u64)> + '_ {
        self.billed_durations.iter().map(|(billed, count)| (*billed, *count))
    }
}

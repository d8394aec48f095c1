//! Buckets keyed by configured memory size.

use std::collections::HashMap;

use ddsketch::SketchConfig;
use tracing::{debug, warn};

use crate::{
    bucket::Bucket,
    parser::{LineParser, ParseError},
};

/// Line ingestion statistics.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ParseStats {
    /// Lines parsed as invocation reports and recorded.
    pub matched: u64,

    /// Lines that were not invocation reports.
    pub skipped: u64,

    /// Invocation reports with a numeric field that could not be converted.
    pub malformed: u64,
}

impl ParseStats {
    /// Returns the total number of lines seen.
    pub fn total(&self) -> u64 {
        self.matched + self.skipped + self.malformed
    }
}

/// Mapping from configured memory size to the bucket holding its statistics.
///
/// Buckets are created the first time a memory size is seen, and live as long as the store.
#[derive(Clone, Debug)]
pub struct BucketStore {
    sketch_config: SketchConfig,
    buckets: HashMap<u32, Bucket>,
    stats: ParseStats,
}

impl BucketStore {
    /// Creates an empty store whose buckets use the given sketch configuration.
    pub fn new(sketch_config: SketchConfig) -> Self {
        Self {
            sketch_config,
            buckets: HashMap::new(),
            stats: ParseStats::default(),
        }
    }

    /// Returns the number of buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Returns `true` if the store has no buckets.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Returns the line ingestion statistics.
    pub fn stats(&self) -> ParseStats {
        self.stats
    }

    /// Returns the bucket for the given memory size, if any invocations at that size have been recorded.
    pub fn get(&self, size_mb: u32) -> Option<&Bucket> {
        self.buckets.get(&size_mb)
    }

    /// Returns the bucket for the given memory size, creating it if it doesn't yet exist.
    pub fn get_or_create(&mut self, size_mb: u32) -> &mut Bucket {
        let sketch_config = self.sketch_config;
        self.buckets
            .entry(size_mb)
            .or_insert_with(|| Bucket::new(size_mb, sketch_config))
    }

    /// Returns all buckets in ascending order of memory size.
    pub fn sorted(&self) -> Vec<&Bucket> {
        let mut buckets = self.buckets.values().collect::<Vec<_>>();
        buckets.sort_unstable_by_key(|bucket| bucket.size_mb());
        buckets
    }

    /// Parses a single raw log line and records it in the bucket for its memory size.
    ///
    /// Lines that aren't invocation reports, or that have malformed numeric fields, are counted and otherwise ignored.
    pub fn ingest_line(&mut self, parser: &LineParser, line: &str) {
        match parser.parse(line) {
            Ok(record) => {
                self.stats.matched += 1;
                self.get_or_create(record.memory_size_mb).update(
                    record.duration_ms,
                    record.max_memory_used_mb,
                    record.billed_duration_ms,
                );
            }
            Err(ParseError::NoMatch) => {
                self.stats.skipped += 1;
                debug!(line, "Skipping line that is not an invocation report.");
            }
            Err(e) => {
                self.stats.malformed += 1;
                warn!(error = %e, line, "Skipping malformed invocation report.");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn report_line(duration: f64, billed: u32, memory_size: u32, memory_used: u32) -> String {
        format!(
            "REPORT RequestId: 00000000-0000-0000-0000-000000000000\tDuration: {:.2} ms\tBilled Duration: {} ms\tMemory Size: {} MB\tMax Memory Used: {} MB\t",
            duration, billed, memory_size, memory_used
        )
    }

    #[test]
    fn buckets_created_per_memory_size() {
        let parser = LineParser::new().unwrap();
        let mut store = BucketStore::new(SketchConfig::default());

        store.ingest_line(&parser, &report_line(10.5, 100, 512, 80));
        store.ingest_line(&parser, &report_line(20.5, 100, 128, 60));
        store.ingest_line(&parser, &report_line(120.0, 200, 512, 81));

        assert_eq!(store.len(), 2);
        assert_eq!(store.get(512).map(Bucket::count), Some(2));
        assert_eq!(store.get(128).map(Bucket::count), Some(1));
        assert!(store.get(1024).is_none());

        let sizes = store.sorted().iter().map(|bucket| bucket.size_mb()).collect::<Vec<_>>();
        assert_eq!(sizes, vec![128, 512]);
    }

    #[test]
    fn unparseable_lines_are_counted() {
        let parser = LineParser::new().unwrap();
        let mut store = BucketStore::new(SketchConfig::default());

        store.ingest_line(&parser, "START RequestId: abc Version: $LATEST");
        store.ingest_line(&parser, &report_line(10.5, 100, 128, 60));
        store.ingest_line(
            &parser,
            "REPORT RequestId: abc\tDuration: 1.0 ms\tBilled Duration: 99999999999 ms\tMemory Size: 128 MB\tMax Memory Used: 1 MB",
        );

        assert_eq!(
            store.stats(),
            ParseStats {
                matched: 1,
                skipped: 1,
                malformed: 1,
            }
        );
        assert_eq!(store.stats().total(), 3);
        assert_eq!(store.get(128).map(Bucket::count), Some(1));
    }

    proptest! {
        #[test]
        fn property_test_noise_does_not_affect_buckets(
            records in proptest::collection::vec((0.0f64..5000.0, 64u32..256), 1..50),
            noise_every in 1usize..5,
        ) {
            let parser = LineParser::new().unwrap();
            let mut clean = BucketStore::new(SketchConfig::default());
            let mut noisy = BucketStore::new(SketchConfig::default());

            for (i, (duration, memory_used)) in records.iter().enumerate() {
                let line = report_line(*duration, 100, 1024, *memory_used);
                clean.ingest_line(&parser, &line);

                if i % noise_every == 0 {
                    noisy.ingest_line(&parser, "END RequestId: 00000000-0000-0000-0000-000000000000");
                }
                noisy.ingest_line(&parser, &line);
            }

            let clean_bucket = clean.get(1024).unwrap();
            let noisy_bucket = noisy.get(1024).unwrap();
            prop_assert_eq!(clean_bucket.count(), records.len() as u64);
            prop_assert_eq!(noisy_bucket.count(), clean_bucket.count());
            prop_assert_eq!(noisy_bucket.durations(), clean_bucket.durations());
            prop_assert_eq!(noisy_bucket.memory_used(), clean_bucket.memory_used());
            prop_assert!(noisy.stats().skipped > 0);
        }
    }
}

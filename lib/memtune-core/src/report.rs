//! Human-readable analysis reports.

use std::io::{self, Write};

use snafu::Snafu;

use crate::{
    bucket::Bucket,
    cost::PricingTable,
    fetch::FetchOutcome,
    ladder::{BillingLadder, MemoryLadder},
    suggest::SuggestionEngine,
};

const DEFAULT_PERCENTILES: [f64; 5] = [0.01, 0.25, 0.5, 0.75, 0.99];

/// Report configuration error.
#[derive(Debug, Snafu, PartialEq)]
#[snafu(context(suffix(false)))]
pub enum ReportConfigurationError {
    /// No percentiles were given.
    #[snafu(display("at least one percentile must be reported"))]
    NoPercentiles,

    /// A percentile is outside of [0, 1].
    #[snafu(display("percentile {} must be between 0 and 1", percentile))]
    InvalidPercentile {
        /// The invalid percentile.
        percentile: f64,
    },
}

/// Report configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct ReportConfiguration {
    percentiles: Vec<f64>,
}

impl ReportConfiguration {
    /// Creates a report configuration for the given percentiles.
    ///
    /// Percentiles are reported in ascending order, regardless of the order given.
    ///
    /// # Errors
    ///
    /// If no percentiles are given, or any percentile is outside of [0, 1], an error is returned.
    pub fn new(mut percentiles: Vec<f64>) -> Result<Self, ReportConfigurationError> {
        if percentiles.is_empty() {
            return Err(ReportConfigurationError::NoPercentiles);
        }
        if let Some(percentile) = percentiles.iter().find(|p| !(0.0..=1.0).contains(*p)) {
            return Err(ReportConfigurationError::InvalidPercentile {
                percentile: *percentile,
            });
        }

        percentiles.sort_by(f64::total_cmp);
        percentiles.dedup();
        Ok(Self { percentiles })
    }

    /// Returns the reported percentiles, in ascending order.
    pub fn percentiles(&self) -> &[f64] {
        &self.percentiles
    }
}

impl Default for ReportConfiguration {
    fn default() -> Self {
        Self {
            percentiles: DEFAULT_PERCENTILES.to_vec(),
        }
    }
}

/// Writes analysis reports.
pub struct Reporter<'a> {
    memory: &'a MemoryLadder,
    billing: &'a BillingLadder,
    pricing: &'a PricingTable,
    config: &'a ReportConfiguration,
}

impl<'a> Reporter<'a> {
    /// Creates a new `Reporter`.
    pub fn new(
        memory: &'a MemoryLadder, billing: &'a BillingLadder, pricing: &'a PricingTable, config: &'a ReportConfiguration,
    ) -> Self {
        Self {
            memory,
            billing,
            pricing,
            config,
        }
    }

    /// Writes the full report for a fetch: every bucket in ascending order of memory size, followed by a summary.
    ///
    /// # Errors
    ///
    /// If writing to `out` fails, an error is returned.
    pub fn write_report<W: Write>(&self, out: &mut W, outcome: &FetchOutcome) -> io::Result<()> {
        let buckets = outcome.store.sorted();
        if buckets.is_empty() {
            writeln!(out, "No invocation reports found.")?;
        }

        for bucket in buckets {
            self.write_bucket(out, bucket)?;
            writeln!(out)?;
        }

        let stats = outcome.store.stats();
        writeln!(
            out,
            "Processed {} lines ({} reports, {} skipped, {} malformed) from {} pages, throttled {} times: {}.",
            stats.total(),
            stats.matched,
            stats.skipped,
            stats.malformed,
            outcome.pages,
            outcome.throttled,
            outcome.stop_reason
        )
    }

    /// Writes the report for a single bucket.
    ///
    /// # Errors
    ///
    /// If writing to `out` fails, an error is returned.
    pub fn write_bucket<W: Write>(&self, out: &mut W, bucket: &Bucket) -> io::Result<()> {
        writeln!(
            out,
            ">> Analyzing stats for memory bucket: {} MB (total requests: {})",
            bucket.size_mb(),
            bucket.count()
        )?;

        // Only billed durations making up a meaningful share of the most common one are listed.
        writeln!(out, "> Top requests per billed duration")?;
        let max_count = bucket.billed_durations().map(|(_, count)| count).max().unwrap_or(0);
        let total = bucket.count().max(1) as f64;
        for (billed, count) in bucket.billed_durations() {
            if count * 10 > max_count {
                let pct = count as f64 * 100.0 / total;
                writeln!(out, "{} ms: {} ({:.2}%)", billed, count, pct)?;
            }
        }
        writeln!(
            out,
            "Estimated cost per million requests: {:.4}$",
            self.pricing.estimate_per_million(bucket, self.billing)
        )?;

        writeln!(out, "> Distribution for durations")?;
        for p in self.config.percentiles() {
            let duration = bucket.duration_quantile(*p).unwrap_or(0.0);
            let (_, billed) = self.billing.bill(duration);
            writeln!(
                out,
                "{} percentile: {:.2} ms (billed: {} ms)",
                percentile_label(*p),
                duration,
                billed
            )?;
        }

        writeln!(out, "> Distribution for used memory")?;
        for p in self.config.percentiles() {
            let memory_used = bucket.memory_used_quantile(*p).unwrap_or(0.0);
            writeln!(out, "{} percentile: {:.2} MB", percentile_label(*p), memory_used)?;
        }

        writeln!(out, "> Suggested memory based on your usage")?;
        let engine = SuggestionEngine::new(self.memory, self.billing);
        for p in self.config.percentiles() {
            writeln!(
                out,
                "Suggestion for {} percentile: {} MB",
                percentile_label(*p),
                engine.suggest_memory(bucket, *p)
            )?;
        }

        Ok(())
    }
}

/// Formats a percentile given as a fraction (`0.25`) as an ordinal (`25th`).
fn percentile_label(p: f64) -> String {
    let pct = p * 100.0;
    let rounded = pct.round();
    if (pct - rounded).abs() > 1e-9 {
        let fractional = format!("{:.3}", pct);
        return format!("{}th", fractional.trim_end_matches('0').trim_end_matches('.'));
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let whole = rounded as u64;
    let suffix = match (whole % 10, whole % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{}{}", whole, suffix)
}

//! Analyzer configuration.

use std::time::Duration;

use ddsketch::SketchConfig;
use memtune_config::GenericConfiguration;
use memtune_error::{ErrorContext as _, GenericError};
use serde::de::DeserializeOwned;

use crate::{
    cost::PricingTable,
    fetch::FetchConfiguration,
    ladder::{BillingLadder, MemoryLadder},
    report::ReportConfiguration,
};

/// Everything needed to fetch, analyze, and report on invocation logs.
///
/// Built once at startup, and then handed out by reference.
#[derive(Clone, Debug)]
pub struct AnalyzerConfiguration {
    /// Memory sizes a function can be configured with.
    pub memory: MemoryLadder,

    /// Billing step function.
    pub billing: BillingLadder,

    /// Fetch loop settings.
    pub fetch: FetchConfiguration,

    /// Rough pricing used for cost estimates.
    pub pricing: PricingTable,

    /// Report settings.
    pub report: ReportConfiguration,

    /// Sketch settings used for every bucket.
    pub sketch: SketchConfig,
}

impl AnalyzerConfiguration {
    /// Builds the analyzer configuration, using defaults for any setting that isn't present.
    ///
    /// # Errors
    ///
    /// If a setting is present but has the wrong type, or describes an invalid ladder, percentile, or sketch, an error
    /// is returned.
    pub fn from_configuration(config: &GenericConfiguration) -> Result<Self, GenericError> {
        let default_memory = MemoryLadder::default();
        let memory_min_mb = get_or(config, "ladder.memory_min_mb", default_memory.smallest())?;
        let memory_max_mb = get_or(config, "ladder.memory_max_mb", default_memory.largest())?;
        let memory_step_mb = get_or(config, "ladder.memory_step_mb", 64u32)?;
        let memory = MemoryLadder::new(memory_min_mb, memory_max_mb, memory_step_mb)
            .error_context("Invalid memory ladder configuration.")?;

        let default_billing = BillingLadder::default();
        let granularity_ms = get_or(config, "billing.granularity_ms", default_billing.granularity_ms())?;
        let max_duration_ms = get_or(config, "billing.max_duration_ms", default_billing.max_duration_ms())?;
        let billing = BillingLadder::new(granularity_ms, max_duration_ms)
            .error_context("Invalid billing ladder configuration.")?;

        let default_fetch = FetchConfiguration::default();
        let max_iterations = get_or(config, "fetch.max_iterations", default_fetch.max_iterations())?;
        let throttle_backoff_ms = get_or(config, "fetch.throttle_backoff_ms", 1000u64)?;
        // Zero disables the timeout.
        let timeout_secs = get_or(config, "fetch.timeout_secs", 300u64)?;
        let filter_pattern = get_or(config, "fetch.filter_pattern", default_fetch.filter_pattern().to_string())?;
        let fetch = default_fetch
            .with_max_iterations(max_iterations)
            .with_throttle_backoff(Duration::from_millis(throttle_backoff_ms))
            .with_timeout((timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)))
            .with_filter_pattern(filter_pattern);

        let request_base_per_million = get_or(config, "pricing.request_base_per_million", 0.20f64)?;
        let unit_price_step = get_or(config, "pricing.unit_price_step", 0.000_000_208f64)?;
        let pricing = PricingTable::new(&memory, request_base_per_million, unit_price_step);

        let report = match config.try_get_typed::<Vec<f64>>("report.percentiles")? {
            Some(percentiles) => {
                ReportConfiguration::new(percentiles).error_context("Invalid report percentiles configuration.")?
            }
            None => ReportConfiguration::default(),
        };

        let default_sketch = SketchConfig::default();
        let relative_accuracy = get_or(config, "sketch.relative_accuracy", default_sketch.relative_accuracy())?;
        let bin_limit = get_or(config, "sketch.bin_limit", default_sketch.bin_limit())?;
        let sketch = SketchConfig::new(relative_accuracy, bin_limit, default_sketch.min_value())
            .error_context("Invalid sketch configuration.")?;

        Ok(Self {
            memory,
            billing,
            fetch,
            pricing,
            report,
            sketch,
        })
    }
}

impl Default for AnalyzerConfiguration {
    fn default() -> Self {
        let memory = MemoryLadder::default();
        let pricing = PricingTable::with_defaults(&memory);
        Self {
            memory,
            billing: BillingLadder::default(),
            fetch: FetchConfiguration::default(),
            pricing,
            report: ReportConfiguration::default(),
            sketch: SketchConfig::default(),
        }
    }
}

fn get_or<T>(config: &GenericConfiguration, key: &str, default: T) -> Result<T, GenericError>
where
    T: DeserializeOwned,
{
    Ok(config.try_get_typed(key)?.unwrap_or(default))
}

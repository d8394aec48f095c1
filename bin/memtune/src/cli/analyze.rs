use std::{
    io::{self, Write as _},
    path::PathBuf,
};

use chrono::{DateTime, TimeDelta, Utc};
use clap::Args;
use memtune_config::GenericConfiguration;
use memtune_core::{log_group_for, AnalyzerConfiguration, Fetcher, LineParser, Reporter};
use memtune_error::{generic_error, ErrorContext as _, GenericError};
use tracing::{info, warn};

use crate::source::FileLogSource;

const DEFAULT_PAGE_SIZE: usize = 10_000;
const DEFAULT_LOOKBACK_MINUTES: i64 = 30;

/// Analyzes invocation reports for a function.
#[derive(Args, Debug)]
pub struct AnalyzeCommand {
    /// Name of the function to analyze.
    pub function_name: String,

    /// Path to an exported log file containing the function's invocation reports.
    #[arg(short = 'f', long = "log-file")]
    pub log_file: PathBuf,

    /// Start of the analysis window, as an RFC 3339 timestamp or a relative duration such as `90m`, `2h`, or `3d`.
    ///
    /// Defaults to 30 minutes ago.
    #[arg(short = 's', long = "since")]
    pub since: Option<String>,
}

/// Entrypoint for the `analyze` command.
pub async fn handle_analyze_command(command: AnalyzeCommand, config: &GenericConfiguration) -> Result<(), GenericError> {
    let analyzer_config = AnalyzerConfiguration::from_configuration(config)?;
    let page_size = page_size(config)?;

    let now = Utc::now();
    let start_time = match command.since.as_deref() {
        Some(since) => parse_since(since, now)?,
        None => now - TimeDelta::minutes(DEFAULT_LOOKBACK_MINUTES),
    };

    let log_group = log_group_for(&command.function_name);
    info!(
        function = %command.function_name,
        %log_group,
        log_file = %command.log_file.display(),
        %start_time,
        "Fetching invocation reports..."
    );

    let source = FileLogSource::open(&command.log_file, page_size).await?;
    let parser = LineParser::new().error_context("Failed to compile invocation report pattern.")?;
    let fetcher = Fetcher::new(source, &analyzer_config.fetch, parser, analyzer_config.sketch);
    let outcome = fetcher
        .fetch_buckets(&log_group, start_time)
        .await
        .with_error_context(|| format!("Failed to fetch invocation reports for '{}'.", command.function_name))?;

    let stats = outcome.store.stats();
    info!(
        buckets = outcome.store.len(),
        reports = stats.matched,
        skipped = stats.skipped,
        malformed = stats.malformed,
        pages = outcome.pages,
        "Finished fetching invocation reports."
    );
    if stats.malformed > 0 {
        warn!(
            malformed = stats.malformed,
            "Some invocation reports had malformed fields and were ignored."
        );
    }

    let reporter = Reporter::new(
        &analyzer_config.memory,
        &analyzer_config.billing,
        &analyzer_config.pricing,
        &analyzer_config.report,
    );
    let mut stdout = io::stdout().lock();
    reporter
        .write_report(&mut stdout, &outcome)
        .and_then(|()| stdout.flush())
        .error_context("Failed to write report.")
}

fn page_size(config: &GenericConfiguration) -> Result<usize, GenericError> {
    Ok(config
        .try_get_typed::<usize>("fetch.page_size")?
        .unwrap_or(DEFAULT_PAGE_SIZE))
}

/// Parses the start of the analysis window.
///
/// Accepts either an RFC 3339 timestamp, or a relative duration before `now` made of a whole number and a unit of
/// `s`, `m`, `h`, `d`, or `w`.
fn parse_since(value: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, GenericError> {
    let value = value.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Ok(timestamp.with_timezone(&Utc));
    }

    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| generic_error!("Missing unit in relative time '{}'.", value))?;
    let (amount, unit) = value.split_at(split);
    let amount = amount
        .parse::<i64>()
        .map_err(|_| generic_error!("Invalid start time '{}': expected RFC 3339 or a relative duration.", value))?;

    let seconds_per_unit = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        "w" => 7 * 24 * 60 * 60,
        _ => return Err(generic_error!("Unknown unit '{}' in relative time '{}'.", unit, value)),
    };

    amount
        .checked_mul(seconds_per_unit)
        .and_then(TimeDelta::try_seconds)
        .and_then(|delta| now.checked_sub_signed(delta))
        .ok_or_else(|| generic_error!("Relative time '{}' is out of range.", value))
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use memtune_config::ConfigurationLoader;
    use memtune_core::StopReason;

    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn since_rfc3339() {
        let start = parse_since("2024-03-01T10:30:00+01:00", now()).unwrap();
        assert_eq!(start.to_rfc3339(), "2024-03-01T09:30:00+00:00");
    }

    #[test]
    fn since_relative() {
        assert_eq!(parse_since("90m", now()).unwrap(), now() - TimeDelta::minutes(90));
        assert_eq!(parse_since("2h", now()).unwrap(), now() - TimeDelta::hours(2));
        assert_eq!(parse_since(" 3d ", now()).unwrap(), now() - TimeDelta::days(3));
        assert_eq!(parse_since("1w", now()).unwrap(), now() - TimeDelta::weeks(1));
        assert_eq!(parse_since("45s", now()).unwrap(), now() - TimeDelta::seconds(45));
    }

    #[test]
    fn since_invalid() {
        for value in ["", "yesterday", "15", "10y", "h", "99999999999999999999d"] {
            assert!(parse_since(value, now()).is_err(), "value: {:?}", value);
        }
    }

    #[test]
    fn page_size_default_and_override() {
        let empty = ConfigurationLoader::default().into_generic();
        assert_eq!(page_size(&empty).unwrap(), 10_000);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"fetch:\n  page_size: 250\n").unwrap();
        let config = ConfigurationLoader::default()
            .from_yaml(file.path())
            .unwrap()
            .into_generic();
        assert_eq!(page_size(&config).unwrap(), 250);
    }

    #[tokio::test(start_paused = true)]
    async fn default_page_size_fits_large_export_within_iteration_cap() {
        let lines = (0..6000)
            .map(|i| {
                format!(
                    "REPORT RequestId: req-{}\tDuration: 12.5 ms\tBilled Duration: 100 ms\tMemory Size: 128 MB\tMax Memory Used: 60 MB",
                    i
                )
            })
            .collect();
        let source = FileLogSource::from_lines(lines, DEFAULT_PAGE_SIZE);
        let analyzer_config = AnalyzerConfiguration::default();
        let fetcher = Fetcher::new(
            source,
            &analyzer_config.fetch,
            LineParser::new().unwrap(),
            analyzer_config.sketch,
        );

        let outcome = fetcher.fetch_buckets("/aws/lambda/checkout", now()).await.unwrap();
        assert_eq!(outcome.stop_reason, StopReason::Exhausted);
        assert_eq!(outcome.store.stats().matched, 6000);
    }
}

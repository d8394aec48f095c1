//! Paginated log retrieval.

use std::{fmt, time::Duration};

use backon::{ConstantBuilder, Retryable as _};
use chrono::{DateTime, Utc};
use ddsketch::SketchConfig;
use memtune_error::GenericError;
use snafu::Snafu;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::{
    parser::LineParser,
    source::{LogQuery, LogSource, LogSourceError},
    store::BucketStore,
};

const DEFAULT_MAX_ITERATIONS: usize = 100;
const DEFAULT_THROTTLE_BACKOFF: Duration = Duration::from_secs(1);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_FILTER_PATTERN: &str = "REPORT RequestId";

/// Fetch error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum FetchError {
    /// The log source failed with a non-recoverable error.
    ///
    /// Any buckets accumulated before the failure are discarded.
    #[snafu(display("failed to fetch logs for '{}' (iteration {})", log_group, iteration))]
    Transport {
        /// Log group being fetched.
        log_group: String,

        /// Iteration at which the failure occurred.
        iteration: usize,

        /// Underlying error.
        source: GenericError,
    },
}

/// Fetch loop configuration.
#[derive(Clone, Debug)]
pub struct FetchConfiguration {
    max_iterations: usize,
    throttle_backoff: Duration,
    timeout: Option<Duration>,
    filter_pattern: String,
}

impl FetchConfiguration {
    /// Sets the maximum number of queries issued, including throttled ones.
    ///
    /// Defaults to 100.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the fixed pause after the log source throttles a query.
    ///
    /// Defaults to 1 second.
    pub fn with_throttle_backoff(mut self, throttle_backoff: Duration) -> Self {
        self.throttle_backoff = throttle_backoff;
        self
    }

    /// Sets how long the fetch loop may run before stopping early, or `None` to run until another stop condition.
    ///
    /// Defaults to 5 minutes.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the pattern that log lines must contain.
    ///
    /// Defaults to `REPORT RequestId`.
    pub fn with_filter_pattern<S: Into<String>>(mut self, filter_pattern: S) -> Self {
        self.filter_pattern = filter_pattern.into();
        self
    }

    /// Returns the maximum number of queries issued.
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Returns the pause after a throttled query.
    pub fn throttle_backoff(&self) -> Duration {
        self.throttle_backoff
    }

    /// Returns the fetch timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Returns the filter pattern.
    pub fn filter_pattern(&self) -> &str {
        &self.filter_pattern
    }
}

impl Default for FetchConfiguration {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            throttle_backoff: DEFAULT_THROTTLE_BACKOFF,
            timeout: Some(DEFAULT_TIMEOUT),
            filter_pattern: DEFAULT_FILTER_PATTERN.to_string(),
        }
    }
}

/// Why the fetch loop stopped.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StopReason {
    /// The log source had no further pages.
    Exhausted,

    /// The timeout elapsed.
    DeadlineElapsed,

    /// The maximum number of iterations was reached.
    IterationCap,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => write!(f, "all pages retrieved"),
            Self::DeadlineElapsed => write!(f, "deadline elapsed"),
            Self::IterationCap => write!(f, "iteration limit reached"),
        }
    }
}

/// Result of a successful fetch.
#[derive(Debug)]
pub struct FetchOutcome {
    /// Buckets built from every retrieved line.
    pub store: BucketStore,

    /// Number of pages retrieved.
    pub pages: usize,

    /// Number of queries the log source throttled.
    pub throttled: usize,

    /// Why the loop stopped.
    pub stop_reason: StopReason,
}

impl FetchOutcome {
    /// Returns `true` if the fetch stopped before the log source ran out of pages.
    pub fn is_partial(&self) -> bool {
        self.stop_reason != StopReason::Exhausted
    }
}

/// Retrieves invocation reports from a log source and aggregates them into buckets.
///
/// Queries are issued one at a time. Throttled queries are retried unchanged after a fixed pause, and count against
/// the iteration limit just like successful ones. A retry that would start after the timeout is not attempted.
/// Reaching the iteration limit or the timeout stops the loop early with whatever was gathered so far, while any other
/// log source error aborts the fetch entirely.
pub struct Fetcher<'a, S> {
    source: S,
    config: &'a FetchConfiguration,
    parser: LineParser,
    sketch_config: SketchConfig,
}

impl<'a, S> Fetcher<'a, S>
where
    S: LogSource,
{
    /// Creates a new `Fetcher`.
    pub fn new(source: S, config: &'a FetchConfiguration, parser: LineParser, sketch_config: SketchConfig) -> Self {
        Self {
            source,
            config,
            parser,
            sketch_config,
        }
    }

    /// Fetches all invocation reports for the given log group, starting at `start_time`.
    ///
    /// # Errors
    ///
    /// If the log source fails with anything other than throttling, an error is returned and all buckets accumulated
    /// so far are discarded.
    pub async fn fetch_buckets(&self, log_group: &str, start_time: DateTime<Utc>) -> Result<FetchOutcome, FetchError> {
        let deadline = self.config.timeout.map(|timeout| Instant::now() + timeout);
        let mut query = LogQuery {
            log_group: log_group.to_string(),
            start_time,
            filter_pattern: self.config.filter_pattern.clone(),
            cursor: None,
        };

        let mut store = BucketStore::new(self.sketch_config);
        let mut pages = 0;
        let mut throttled = 0;
        let mut iteration = 0;

        let stop_reason = loop {
            if iteration >= self.config.max_iterations {
                break StopReason::IterationCap;
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                break StopReason::DeadlineElapsed;
            }

            // Throttled queries are retried in place, and every retry spends one iteration.
            let backoff = ConstantBuilder::default()
                .with_delay(self.config.throttle_backoff)
                .with_max_times(self.config.max_iterations - iteration - 1);
            let source = &self.source;
            let current_query = &query;
            let mut retries = 0;

            let result = (move || source.query(current_query))
                .retry(backoff)
                .when(|e| {
                    matches!(e, LogSourceError::Throttled) && retry_fits_deadline(deadline, self.config.throttle_backoff)
                })
                .notify(|_, delay| {
                    debug!(
                        log_group,
                        iteration = iteration + retries,
                        "Log source throttled request. Retrying in {:?}...",
                        delay
                    );
                    retries += 1;
                })
                .await;

            let last_iteration = iteration + retries;
            iteration = last_iteration + 1;
            throttled += retries;

            match result {
                Ok(page) => {
                    pages += 1;
                    debug!(log_group, iteration = last_iteration, lines = page.lines.len(), "Retrieved page.");

                    for line in &page.lines {
                        store.ingest_line(&self.parser, line);
                    }

                    match page.next_cursor {
                        Some(cursor) => query.cursor = Some(cursor),
                        None => break StopReason::Exhausted,
                    }
                }
                Err(LogSourceError::Throttled) => {
                    throttled += 1;
                    debug!(log_group, iteration = last_iteration, "Log source throttled request. Not retrying.");

                    break if iteration >= self.config.max_iterations {
                        StopReason::IterationCap
                    } else {
                        StopReason::DeadlineElapsed
                    };
                }
                Err(LogSourceError::Transport { source }) => {
                    error!(
                        log_group,
                        iteration = last_iteration,
                        discarded_buckets = store.len(),
                        error = %source,
                        "Failed to fetch logs. Discarding partial results."
                    );
                    return Err(FetchError::Transport {
                        log_group: log_group.to_string(),
                        iteration: last_iteration,
                        source,
                    });
                }
            }
        };

        if stop_reason != StopReason::Exhausted {
            warn!(log_group, pages, throttled, reason = %stop_reason, "Stopped fetching logs early. Results are partial.");
        }

        Ok(FetchOutcome {
            store,
            pages,
            throttled,
            stop_reason,
        })
    }
}

/// Returns `true` if a retry issued after `backoff` would still start before the deadline.
fn retry_fits_deadline(deadline: Option<Instant>, backoff: Duration) -> bool {
    match deadline {
        Some(deadline) => Instant::now() + backoff < deadline,
        None => true,
    }
}

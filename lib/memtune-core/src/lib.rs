//! Invocation report analysis.
//!
//! Invocation reports are pulled from a [`LogSource`] by the [`Fetcher`], parsed, and aggregated into a [`Bucket`] per
//! configured memory size. Buckets can then be turned into memory size suggestions, rough cost estimates, and
//! human-readable reports.
#![deny(missing_docs)]

mod bucket;
pub use self::bucket::Bucket;

mod config;
pub use self::config::AnalyzerConfiguration;

mod cost;
pub use self::cost::PricingTable;

mod fetch;
pub use self::fetch::{FetchConfiguration, FetchError, FetchOutcome, Fetcher, StopReason};

mod ladder;
pub use self::ladder::{BillingLadder, LadderError, MemoryLadder};

mod parser;
pub use self::parser::{InvocationRecord, LineParser, ParseError};

mod report;
pub use self::report::{ReportConfiguration, ReportConfigurationError, Reporter};

mod source;
pub use self::source::{LogPage, LogQuery, LogSource, LogSourceError};

mod store;
pub use self::store::{BucketStore, ParseStats};

mod suggest;
pub use self::suggest::SuggestionEngine;

/// Returns the log group identifier for the given function.
pub fn log_group_for(function_name: &str) -> String {
    format!("/aws/lambda/{}", function_name)
}

//! Log source abstraction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use memtune_error::GenericError;
use snafu::Snafu;

/// Log source error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum LogSourceError {
    /// The log source is rate limiting requests, and the same request should be retried later.
    #[snafu(display("log source throttled the request"))]
    Throttled,

    /// The request failed for any other reason.
    #[snafu(display("log source request failed"))]
    Transport {
        /// Underlying error.
        source: GenericError,
    },
}

/// A single paginated log query.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LogQuery {
    /// Identifier of the log group to query.
    pub log_group: String,

    /// Only lines emitted at or after this time are returned.
    pub start_time: DateTime<Utc>,

    /// Only lines containing this pattern are returned.
    pub filter_pattern: String,

    /// Cursor returned by the previous page, or `None` for the first page.
    pub cursor: Option<String>,
}

/// A single page of log lines.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LogPage {
    /// Raw log lines, in the order the log source returned them.
    pub lines: Vec<String>,

    /// Cursor for the next page, or `None` if there are no further pages.
    pub next_cursor: Option<String>,
}

/// A source of raw log lines.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Queries a single page of log lines.
    ///
    /// # Errors
    ///
    /// If the log source is rate limiting requests, `LogSourceError::Throttled` is returned, and the query should be
    /// retried unchanged. Otherwise, `LogSourceError::Transport` is returned.
    async fn query(&self, query: &LogQuery) -> Result<LogPage, LogSourceError>;
}

#[async_trait]
impl<S> LogSource for &S
where
    S: LogSource + ?Sized,
{
    async fn query(&self, query: &LogQuery) -> Result<LogPage, LogSourceError> {
        (**self).query(query).await
    }
}

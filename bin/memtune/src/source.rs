//! File-backed log source.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use memtune_core::{LogPage, LogQuery, LogSource, LogSourceError};
use memtune_error::{generic_error, ErrorContext as _, GenericError};

/// A log source over an exported log file.
///
/// Each line may start with an RFC 3339 timestamp, followed by whitespace. Lines stamped before the query's start time
/// are excluded, while lines without a timestamp are always included. Only lines containing the query's filter pattern
/// are returned, at most `page_size` per page, and the cursor is the offset of the next line to scan.
///
/// The whole file is read up front, and the query's log group is ignored.
pub struct FileLogSource {
    lines: Vec<String>,
    page_size: usize,
}

impl FileLogSource {
    /// Reads the log file at `path`.
    ///
    /// # Errors
    ///
    /// If the file can't be read, an error is returned.
    pub async fn open(path: &Path, page_size: usize) -> Result<Self, GenericError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_error_context(|| format!("Failed to read log file '{}'.", path.display()))?;

        Ok(Self::from_lines(contents.lines().map(str::to_string).collect(), page_size))
    }

    /// Creates a log source over the given lines.
    ///
    /// A page size of zero is treated as one.
    pub fn from_lines(lines: Vec<String>, page_size: usize) -> Self {
        Self {
            lines,
            page_size: page_size.max(1),
        }
    }
}

#[async_trait]
impl LogSource for FileLogSource {
    async fn query(&self, query: &LogQuery) -> Result<LogPage, LogSourceError> {
        let offset = match query.cursor.as_deref() {
            Some(cursor) => parse_cursor(cursor, self.lines.len()).map_err(|source| LogSourceError::Transport { source })?,
            None => 0,
        };

        let mut position = offset;
        let mut lines = Vec::new();
        while position < self.lines.len() && lines.len() < self.page_size {
            let line = &self.lines[position];
            position += 1;

            if line.contains(&query.filter_pattern) && !stamped_before(line, query.start_time) {
                lines.push(line.clone());
            }
        }

        Ok(LogPage {
            lines,
            next_cursor: (position < self.lines.len()).then(|| position.to_string()),
        })
    }
}

fn parse_cursor(cursor: &str, len: usize) -> Result<usize, GenericError> {
    match cursor.parse::<usize>() {
        Ok(offset) if offset <= len => Ok(offset),
        _ => Err(generic_error!("Invalid pagination cursor '{}'.", cursor)),
    }
}

fn stamped_before(line: &str, start_time: DateTime<Utc>) -> bool {
    line.split_whitespace()
        .next()
        .and_then(|token| DateTime::parse_from_rfc3339(token).ok())
        .is_some_and(|timestamp| timestamp < start_time)
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    const REPORT: &str = "REPORT RequestId: 5e1f\tDuration: 12.50 ms\tBilled Duration: 100 ms\tMemory Size: 128 MB\tMax Memory Used: 60 MB";

    fn query(start_time: &str, cursor: Option<&str>) -> LogQuery {
        LogQuery {
            log_group: "/aws/lambda/checkout".to_string(),
            start_time: DateTime::parse_from_rfc3339(start_time).unwrap().with_timezone(&Utc),
            filter_pattern: "REPORT RequestId".to_string(),
            cursor: cursor.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn filters_by_pattern_and_time() {
        let source = FileLogSource::from_lines(
            vec![
                format!("2024-03-01T09:00:00Z {}", REPORT),
                "2024-03-01T10:05:00Z START RequestId: 5e1f Version: $LATEST".to_string(),
                format!("2024-03-01T10:05:01.250Z {}", REPORT),
                REPORT.to_string(),
            ],
            10,
        );

        let page = source.query(&query("2024-03-01T10:00:00Z", None)).await.unwrap();
        assert_eq!(page.lines.len(), 2);
        assert!(page.lines[0].starts_with("2024-03-01T10:05:01.250Z"));
        assert_eq!(page.lines[1], REPORT);
        assert_eq!(page.next_cursor, None);
    }

    #[tokio::test]
    async fn pages_through_lines() {
        let source = FileLogSource::from_lines(vec![REPORT.to_string(); 5], 2);
        let start = "2024-03-01T10:00:00Z";

        let first = source.query(&query(start, None)).await.unwrap();
        assert_eq!(first.lines.len(), 2);
        assert_eq!(first.next_cursor.as_deref(), Some("2"));

        let second = source.query(&query(start, Some("2"))).await.unwrap();
        assert_eq!(second.lines.len(), 2);
        assert_eq!(second.next_cursor.as_deref(), Some("4"));

        let last = source.query(&query(start, Some("4"))).await.unwrap();
        assert_eq!(last.lines.len(), 1);
        assert_eq!(last.next_cursor, None);
    }

    #[tokio::test]
    async fn invalid_cursor_is_transport_error() {
        let source = FileLogSource::from_lines(vec![REPORT.to_string()], 2);

        for cursor in ["abc", "5"] {
            let result = source.query(&query("2024-03-01T10:00:00Z", Some(cursor))).await;
            assert!(matches!(result, Err(LogSourceError::Transport { .. })), "cursor: {}", cursor);
        }
    }

    #[tokio::test]
    async fn open_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", REPORT).unwrap();
        writeln!(file, "END RequestId: 5e1f").unwrap();

        let source = FileLogSource::open(file.path(), 0).await.unwrap();
        let page = source.query(&query("2024-03-01T10:00:00Z", None)).await.unwrap();
        assert_eq!(page.lines, vec![REPORT.to_string()]);
        assert_eq!(page.next_cursor.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn open_missing_file() {
        let err = FileLogSource::open(Path::new("/nonexistent/reports.log"), 10)
            .await
            .err()
            .unwrap();
        assert!(format!("{:#}", err).contains("Failed to read log file"));
    }
}

use async_trait::async_trait;
use chrono::Utc;
use memtune_core::{
    log_group_for, AnalyzerConfiguration, Fetcher, LineParser, LogPage, LogQuery, LogSource, LogSourceError, Reporter,
    StopReason, SuggestionEngine,
};

/// Serves a fixed set of lines, two per page, using the line offset as the cursor.
struct InMemorySource {
    lines: Vec<String>,
}

#[async_trait]
impl LogSource for InMemorySource {
    async fn query(&self, query: &LogQuery) -> Result<LogPage, LogSourceError> {
        let offset = match &query.cursor {
            Some(cursor) => cursor.parse::<usize>().map_err(|e| LogSourceError::Transport { source: e.into() })?,
            None => 0,
        };

        let lines = self
            .lines
            .iter()
            .filter(|line| line.contains(&query.filter_pattern))
            .skip(offset)
            .take(2)
            .cloned()
            .collect::<Vec<_>>();
        let next = offset + lines.len();
        let has_more = self.lines.iter().filter(|line| line.contains(&query.filter_pattern)).count() > next;

        Ok(LogPage {
            lines,
            next_cursor: has_more.then(|| next.to_string()),
        })
    }
}

fn report_line(request_id: &str, duration: &str, billed: u32, memory_size: u32, memory_used: u32) -> String {
    format!(
        "REPORT RequestId: {}\tDuration: {} ms\tBilled Duration: {} ms\tMemory Size: {} MB\tMax Memory Used: {} MB\t",
        request_id, duration, billed, memory_size, memory_used
    )
}

#[tokio::test(start_paused = true)]
async fn reference_sample_end_to_end() {
    let source = InMemorySource {
        lines: vec![
            "START RequestId: a Version: $LATEST".to_string(),
            report_line("a", "2337.93", 2400, 128, 64),
            "END RequestId: a".to_string(),
            report_line("b", "274.08", 300, 128, 65),
            report_line("c", "909.48", 1000, 128, 66),
            report_line("d", "768.76", 800, 128, 66),
        ],
    };
    let config = AnalyzerConfiguration::default();
    let fetcher = Fetcher::new(&source, &config.fetch, LineParser::new().unwrap(), config.sketch);

    let outcome = fetcher
        .fetch_buckets(&log_group_for("checkout"), Utc::now())
        .await
        .unwrap();
    assert_eq!(outcome.stop_reason, StopReason::Exhausted);
    assert_eq!(outcome.pages, 2);
    assert_eq!(outcome.store.len(), 1);
    assert_eq!(outcome.store.stats().matched, 4);

    let bucket = outcome.store.get(128).unwrap();
    assert_eq!(bucket.count(), 4);
    assert_eq!(bucket.billed_durations().map(|(_, count)| count).sum::<u64>(), 4);

    let engine = SuggestionEngine::new(&config.memory, &config.billing);
    assert_eq!(engine.suggest_memory(bucket, 0.01), 192);
    assert_eq!(engine.suggest_memory(bucket, 0.99), 896);

    let reporter = Reporter::new(&config.memory, &config.billing, &config.pricing, &config.report);
    let mut out = Vec::new();
    reporter.write_report(&mut out, &outcome).unwrap();
    let report = String::from_utf8(out).unwrap();

    assert!(report.starts_with(">> Analyzing stats for memory bucket: 128 MB (total requests: 4)\n"));
    assert!(report.contains("Suggestion for 99th percentile: 896 MB"));
    assert!(report.contains("Processed 4 lines (4 reports, 0 skipped, 0 malformed) from 2 pages"));
}

/// Report scheduling
///
/// The pipeline wires a line source through the compiled pattern and
/// filters into the windowed store, and drives reporting in one of two
/// modes: one-shot (ingest everything, report once) or live (ingestion
/// as its own task, reports on an independent timer). The two sides
/// coordinate only through the store's exclusive lock, held briefly per
/// insert and per report.
pub mod sink;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error};

use crate::format::LogPattern;
use crate::record::derive;
use crate::record::filter::Predicate;
use crate::source::filter::LineFilter;
use crate::source::{LineStream, SourceError};
use crate::store::WindowStore;

pub use sink::{NullSink, ReportSink, StdoutSink};

/// Reporting interval when none is configured.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);
/// Finest supported reporting resolution.
pub const MIN_INTERVAL: Duration = Duration::from_millis(100);
/// Delay before the very first live report, so the display initializes
/// promptly instead of waiting a whole interval.
const WARMUP_DELAY: Duration = Duration::from_millis(100);

#[derive(Clone)]
pub struct Pipeline {
    pattern: Arc<LogPattern>,
    line_filter: Option<Arc<LineFilter>>,
    record_filter: Option<Arc<Predicate>>,
    store: Arc<Mutex<WindowStore>>,
}

impl Pipeline {
    pub fn new(pattern: LogPattern, store: WindowStore) -> Self {
        Self {
            pattern: Arc::new(pattern),
            line_filter: None,
            record_filter: None,
            store: Arc::new(Mutex::new(store)),
        }
    }

    /// Raw-line filter applied before format matching.
    pub fn with_line_filter(mut self, filter: LineFilter) -> Self {
        self.line_filter = Some(Arc::new(filter));
        self
    }

    /// Record predicate applied after derivation, before insert.
    pub fn with_record_filter(mut self, predicate: Predicate) -> Self {
        self.record_filter = Some(Arc::new(predicate));
        self
    }

    pub fn store(&self) -> Arc<Mutex<WindowStore>> {
        Arc::clone(&self.store)
    }

    /// One line through the whole pipeline. Unmatched lines and failed
    /// conversions are dropped silently; they are traffic, not errors.
    fn accept(&self, line: &str) {
        if let Some(filter) = &self.line_filter {
            if !filter.matches(line) {
                return;
            }
        }
        let Some(capture) = self.pattern.capture(line) else {
            debug!(line, "no match");
            return;
        };
        let Some(record) = derive(capture) else {
            debug!(line, "conversion failed, record dropped");
            return;
        };
        if let Some(predicate) = &self.record_filter {
            let keep = predicate.eval(|field| record.get(field).cloned());
            if !keep {
                return;
            }
        }
        debug!(record = %serde_json::to_string(&record).unwrap_or_default(), "parsed");
        self.store.lock().insert(&record);
    }

    /// Drain the stream into the store; returns the number of lines
    /// consumed. Read errors end ingestion.
    pub async fn ingest(&self, mut stream: LineStream) -> Result<u64, SourceError> {
        use tokio_stream::StreamExt;

        let mut consumed = 0u64;
        while let Some(item) = stream.next().await {
            let line = item?;
            self.accept(&line);
            consumed += 1;
        }
        Ok(consumed)
    }

    /// One-shot mode: ingest the finite stream to completion, then
    /// report once.
    pub async fn run_once(
        &self,
        stream: LineStream,
        sink: &mut dyn ReportSink,
    ) -> Result<(), SourceError> {
        let consumed = self.ingest(stream).await?;
        debug!(consumed, "ingestion finished");
        let report = self.store.lock().report();
        sink.render(&report);
        Ok(())
    }

    /// Continuous mode: ingestion runs as its own task; the report
    /// timer fires independently until the stream ends or `shutdown`
    /// resolves. Ticks that find no data render the empty idle report.
    pub async fn run_live<S>(
        &self,
        stream: LineStream,
        sink: &mut dyn ReportSink,
        interval: Duration,
        shutdown: S,
    ) -> Result<(), SourceError>
    where
        S: std::future::Future<Output = ()>,
    {
        let worker = self.clone();
        let mut ingest = tokio::spawn(async move { worker.ingest(stream).await });

        let period = interval.max(MIN_INTERVAL);
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + WARMUP_DELAY, period);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    ingest.abort();
                    return Ok(());
                }
                finished = &mut ingest => {
                    match finished {
                        Ok(Ok(consumed)) => debug!(consumed, "ingestion finished"),
                        Ok(Err(e)) => error!("ingestion failed: {e}"),
                        Err(e) => error!("ingestion task aborted: {e}"),
                    }
                    let report = self.store.lock().report();
                    sink.render(&report);
                    return Ok(());
                }
                _ = ticker.tick() => {
                    let report = self.store.lock().report();
                    sink.render(&report);
                }
            }
        }
    }

    /// Count of rows currently aggregated.
    pub fn row_count(&self) -> usize {
        self.store.lock().count()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::sink::CaptureSink;
    use super::*;
    use crate::record::filter::Predicate;
    use crate::source::filter::{FilterMode, LineFilter};
    use crate::store::query::{default_queries, QuerySpec};
    use crate::store::DEFAULT_WINDOW;

    fn lines(items: &[&str]) -> LineStream {
        let owned: Vec<Result<String, SourceError>> =
            items.iter().map(|s| Ok(s.to_string())).collect();
        Box::pin(tokio_stream::iter(owned))
    }

    fn default_pipeline() -> Pipeline {
        let queries = default_queries("request_path", Predicate::True, "count", 10)
            .expect("valid defaults");
        Pipeline::new(
            LogPattern::compile("$remote_addr $status"),
            WindowStore::new(queries, DEFAULT_WINDOW),
        )
    }

    #[tokio::test]
    async fn test_run_once_reports_after_full_ingest() {
        let pipeline = default_pipeline();
        let mut sink = CaptureSink(Vec::new());
        pipeline
            .run_once(lines(&["10.0.0.1 200", "10.0.0.2 404"]), &mut sink)
            .await
            .expect("run succeeds");

        assert_eq!(sink.0.len(), 1);
        assert!(sink.0[0].contains("2 records processed"));
    }

    #[tokio::test]
    async fn test_unmatched_lines_are_dropped_silently() {
        let pipeline = default_pipeline();
        pipeline
            .ingest(lines(&["10.0.0.1 200", "not an access line at all"]))
            .await
            .expect("ingest succeeds");
        assert_eq!(pipeline.row_count(), 1);
    }

    #[tokio::test]
    async fn test_conversion_failure_drops_single_record() {
        let pipeline = default_pipeline();
        pipeline
            .ingest(lines(&["10.0.0.1 banana", "10.0.0.1 200"]))
            .await
            .expect("ingest succeeds");
        assert_eq!(pipeline.row_count(), 1);
    }

    #[tokio::test]
    async fn test_line_filter_runs_before_matching() {
        let filter = LineFilter::new("10\\.0\\.0\\.1", FilterMode::Include).expect("valid filter");
        let pipeline = default_pipeline().with_line_filter(filter);
        pipeline
            .ingest(lines(&["10.0.0.1 200", "192.168.0.9 200"]))
            .await
            .expect("ingest succeeds");
        assert_eq!(pipeline.row_count(), 1);
    }

    #[tokio::test]
    async fn test_record_filter_runs_after_derivation() {
        let predicate = Predicate::parse("status >= 400").expect("valid predicate");
        let pipeline = default_pipeline().with_record_filter(predicate);
        pipeline
            .ingest(lines(&["10.0.0.1 200", "10.0.0.1 404", "10.0.0.1 500"]))
            .await
            .expect("ingest succeeds");
        assert_eq!(pipeline.row_count(), 2);
    }

    #[tokio::test]
    async fn test_scenario_remote_addr_status() {
        // Template "$remote_addr $status", line "10.0.0.1 404".
        let queries = vec![QuerySpec::print(&[
            "remote_addr".to_string(),
            "status".to_string(),
            "status_type".to_string(),
        ])];
        let pipeline = Pipeline::new(
            LogPattern::compile("$remote_addr $status"),
            WindowStore::new(queries, DEFAULT_WINDOW),
        );
        pipeline
            .ingest(lines(&["10.0.0.1 404"]))
            .await
            .expect("ingest succeeds");

        let report = pipeline.store().lock().report_at(Instant::now());
        assert!(report.contains("10.0.0.1"));
        assert!(report.contains("404"));
    }

    #[tokio::test]
    async fn test_combined_malformed_line_leaves_store_unchanged() {
        let queries = default_queries("request_path", Predicate::True, "count", 10)
            .expect("valid defaults");
        let pipeline = Pipeline::new(
            LogPattern::compile("combined"),
            WindowStore::new(queries, DEFAULT_WINDOW),
        );
        // Fewer fields than the combined template has delimiters.
        pipeline
            .ingest(lines(&["127.0.0.1 - - [10/Oct/2000:13:55:36 -0700] \"GET / HTTP/1.0\""]))
            .await
            .expect("ingest succeeds");
        assert_eq!(pipeline.row_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_live_first_report_is_prompt() {
        let pipeline = default_pipeline();
        let mut sink = CaptureSink(Vec::new());

        // Never-ending empty source: reports must still fire.
        let stream: LineStream = Box::pin(tokio_stream::pending());
        let shutdown = tokio::time::sleep(Duration::from_millis(1500));

        pipeline
            .run_live(stream, &mut sink, Duration::from_secs(2), shutdown)
            .await
            .expect("live run succeeds");

        // One warmup tick at 100 ms, none of the 2 s ticks yet. The
        // idle report with no data is the empty string.
        assert_eq!(sink.0.len(), 1);
        assert_eq!(sink.0[0], "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_live_periodic_reports() {
        let pipeline = default_pipeline();
        let mut sink = CaptureSink(Vec::new());
        let stream: LineStream = Box::pin(tokio_stream::pending());
        let shutdown = tokio::time::sleep(Duration::from_millis(4500));

        pipeline
            .run_live(stream, &mut sink, Duration::from_secs(2), shutdown)
            .await
            .expect("live run succeeds");

        // Warmup at 0.1 s, then ticks at 2.1 s and 4.1 s.
        assert_eq!(sink.0.len(), 3);
    }

    #[tokio::test]
    async fn test_run_live_final_report_on_stream_end() {
        let pipeline = default_pipeline();
        let mut sink = CaptureSink(Vec::new());
        let shutdown = std::future::pending();

        pipeline
            .run_live(
                lines(&["10.0.0.1 200"]),
                &mut sink,
                Duration::from_secs(60),
                shutdown,
            )
            .await
            .expect("live run succeeds");

        let last = sink.0.last().expect("final report rendered");
        assert!(last.contains("1 records processed"));
    }
}

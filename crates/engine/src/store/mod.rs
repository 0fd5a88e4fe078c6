/// Windowed aggregation store
///
/// An ephemeral row set with a fixed column schema, continuously
/// appended by ingestion and re-queried by the report scheduler. The
/// windowed-eviction policy bounds memory to one window's traffic: when
/// the elapsed time since `window_start` reaches the window length, the
/// whole row set is cleared and the window restarts. Eviction is lazy,
/// checked on insert and immediately after a report is produced, and
/// both paths run on `&mut self` so callers serialize them through one
/// exclusive lock.
pub mod exec;
pub mod query;
pub mod render;

use std::time::{Duration, Instant};

use crate::record::model::{Record, Value};
use crate::store::query::QuerySpec;

/// Seconds of records kept in memory between evictions.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(20);

pub struct WindowStore {
    schema: Vec<String>,
    rows: Vec<Vec<Value>>,
    queries: Vec<QuerySpec>,
    window: Duration,
    // None until the first insert; reports before that are empty.
    window_start: Option<Instant>,
}

impl WindowStore {
    /// Schema is fixed at construction: the ordered union of every
    /// field the query set references.
    pub fn new(queries: Vec<QuerySpec>, window: Duration) -> Self {
        let mut schema: Vec<String> = Vec::new();
        for query in &queries {
            for field in query.fields() {
                if !schema.iter().any(|c| c == field) {
                    schema.push(field.to_string());
                }
            }
        }
        Self {
            schema,
            rows: Vec::new(),
            queries,
            window,
            window_start: None,
        }
    }

    pub fn schema(&self) -> &[String] {
        &self.schema
    }

    /// Rows currently held, all inserted since `window_start`.
    pub fn count(&self) -> usize {
        self.rows.len()
    }

    /// Append one record under the schema. Record fields outside the
    /// schema are dropped; declared fields the record lacks insert as
    /// null.
    pub fn insert(&mut self, record: &Record) {
        self.insert_at(record, Instant::now());
    }

    pub fn insert_at(&mut self, record: &Record, now: Instant) {
        self.evict_if_expired(now);
        if self.window_start.is_none() {
            self.window_start = Some(now);
        }
        let row = self
            .schema
            .iter()
            .map(|column| record.get(column).cloned().unwrap_or(Value::Null))
            .collect();
        self.rows.push(row);
    }

    /// Run every configured query in declaration order and render the
    /// report; empty if nothing has ever been inserted. The eviction
    /// check runs after the report so each report reflects one complete
    /// window before it is discarded.
    pub fn report(&mut self) -> String {
        self.report_at(Instant::now())
    }

    pub fn report_at(&mut self, now: Instant) -> String {
        let Some(start) = self.window_start else {
            return String::new();
        };

        let elapsed = now.duration_since(start).as_secs_f64();
        let count = self.rows.len();
        let rate = if elapsed > f64::EPSILON {
            count as f64 / elapsed
        } else {
            0.0
        };

        let mut sections = vec![format!(
            "running for {elapsed:.0} seconds, {count} records processed: {rate:.2} req/sec"
        )];
        for query in &self.queries {
            let result = exec::execute(query, &self.schema, &self.rows);
            sections.push(format!("{}\n{}", query.label, render::table(&result)));
        }

        self.evict_if_expired(now);
        sections.join("\n\n")
    }

    fn evict_if_expired(&mut self, now: Instant) {
        if let Some(start) = self.window_start {
            if now.duration_since(start) >= self.window {
                tracing::debug!(rows = self.rows.len(), "window expired, clearing row set");
                self.rows.clear();
                self.window_start = Some(now);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::derive;
    use crate::record::filter::Predicate;
    use crate::store::query::default_queries;

    fn store() -> WindowStore {
        let queries = default_queries("request_path", Predicate::True, "count", 10)
            .expect("valid defaults");
        WindowStore::new(queries, DEFAULT_WINDOW)
    }

    fn record(path: &str, status: &str) -> Record {
        derive(vec![
            ("request".to_string(), format!("GET {path} HTTP/1.1")),
            ("status".to_string(), status.to_string()),
            ("body_bytes_sent".to_string(), "100".to_string()),
        ])
        .expect("record derives")
    }

    #[test]
    fn test_schema_union_of_query_fields() {
        let store = store();
        assert_eq!(store.schema(), &["bytes_sent", "status_type", "request_path"]);
    }

    #[test]
    fn test_report_empty_before_first_insert() {
        let mut store = store();
        assert_eq!(store.report(), "");
    }

    #[test]
    fn test_insert_and_report_counts() {
        let mut store = store();
        let now = Instant::now();
        for _ in 0..3 {
            store.insert_at(&record("/a", "200"), now);
        }
        let report = store.report_at(now + Duration::from_secs(1));
        assert!(report.starts_with("running for 1 seconds, 3 records processed: 3.00 req/sec"));
        assert!(report.contains("Summary:"));
        assert!(report.contains("Detailed:"));
    }

    #[test]
    fn test_unknown_record_fields_are_dropped() {
        let mut store = store();
        let mut rec = record("/a", "200");
        rec.set("not_in_schema", Value::Int(7));
        store.insert(&rec);
        assert_eq!(store.count(), 1);
        assert!(!store.report().contains("not_in_schema"));
    }

    #[test]
    fn test_missing_declared_fields_insert_as_null() {
        let mut store = store();
        let rec = derive(vec![("status".to_string(), "200".to_string())])
            .expect("record derives");
        store.insert(&rec);
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn test_window_eviction_clears_rows() {
        let mut store = store();
        let start = Instant::now();
        for _ in 0..5 {
            store.insert_at(&record("/a", "200"), start);
        }
        assert_eq!(store.count(), 5);

        // The report at the window boundary still sees the full window,
        // then evicts.
        let report = store.report_at(start + DEFAULT_WINDOW);
        assert!(report.contains("5 records processed"));
        assert_eq!(store.count(), 0);

        // Immediately after eviction: zero rows, no division by zero.
        let report = store.report_at(start + DEFAULT_WINDOW);
        assert!(report.starts_with("running for 0 seconds, 0 records processed: 0.00 req/sec"));
    }

    #[test]
    fn test_insert_after_expiry_starts_fresh_window() {
        let mut store = store();
        let start = Instant::now();
        store.insert_at(&record("/a", "200"), start);
        store.insert_at(&record("/b", "200"), start + DEFAULT_WINDOW + Duration::from_secs(1));
        // The stale row was evicted before the new one was appended.
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn test_status_type_bucket_counts_in_report() {
        let mut store = store();
        let now = Instant::now();
        for status in ["200", "201", "301", "404", "503"] {
            store.insert_at(&record("/a", status), now);
        }
        let report = store.report_at(now + Duration::from_secs(1));
        // Summary row: count=5, 2xx=2, 3xx=1, 4xx=1, 5xx=1.
        let summary_line = report
            .lines()
            .skip_while(|l| !l.starts_with("Summary:"))
            .nth(3)
            .expect("summary data row");
        let cells: Vec<&str> = summary_line
            .trim_matches('|')
            .split('|')
            .map(str::trim)
            .collect();
        assert_eq!(cells[0], "5");
        assert_eq!(&cells[2..6], &["2", "1", "1", "1"]);
    }
}

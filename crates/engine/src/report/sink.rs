//! Sink — where rendered reports go.

/// A consumer of rendered report text. Implementations must degrade
/// gracefully: a sink failure must never take ingestion down.
pub trait ReportSink: Send {
    fn render(&mut self, report: &str);
}

/// Batch output: print the report once to stdout.
pub struct StdoutSink;

impl ReportSink for StdoutSink {
    fn render(&mut self, report: &str) {
        if !report.is_empty() {
            println!("{report}");
        }
    }
}

/// No display surface available; reports are dropped.
pub struct NullSink;

impl ReportSink for NullSink {
    fn render(&mut self, _report: &str) {}
}

/// Test helper: collects every rendered report.
#[cfg(test)]
pub(crate) struct CaptureSink(pub Vec<String>);

#[cfg(test)]
impl ReportSink for CaptureSink {
    fn render(&mut self, report: &str) {
        self.0.push(report.to_string());
    }
}

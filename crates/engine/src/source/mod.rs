/// Line sources
///
/// One contract for every ingestion mode: a stream of text lines.
/// Replay reads a finite resource (plain or gzip) end-to-end; follow
/// seeks to the end of a growing file and waits for appended lines;
/// stdin consumes a continuously piped stream without a seek step.
///
/// Failure to open a source is fatal and reported once; read errors end
/// the stream. Unmatched lines are a parsing concern, not a source one.
pub mod filter;
pub mod follow;
pub mod replay;

use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;
use tokio_stream::Stream;

/// How long follow mode suspends when no complete line is available.
pub const FOLLOW_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("read error: {0}")]
    Read(#[from] io::Error),
}

/// Where lines come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    File { path: PathBuf, follow: bool },
    Stdin,
}

pub type LineStream = Pin<Box<dyn Stream<Item = Result<String, SourceError>> + Send>>;

/// Open the configured source and return its line stream.
pub async fn open(spec: &SourceSpec) -> Result<LineStream, SourceError> {
    match spec {
        SourceSpec::Stdin => Ok(replay::stdin_lines()),
        SourceSpec::File { path, follow: false } => replay::file_lines(path).await,
        SourceSpec::File { path, follow: true } => follow::tail_lines(path).await,
    }
}

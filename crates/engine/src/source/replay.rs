//! Replay — finite sources: plain files, gzip files, standard input.

use std::io::BufRead;
use std::path::Path;

use flate2::read::GzDecoder;
use tokio::io::AsyncBufReadExt;
use tokio_stream::wrappers::{LinesStream, ReceiverStream};
use tokio_stream::StreamExt;

use super::{LineStream, SourceError};

// Lines buffered between the blocking gzip decoder and the async side.
const GZIP_CHANNEL_CAPACITY: usize = 256;

/// Read an existing file end-to-end. A `.gz` path is decompressed
/// transparently.
pub(crate) async fn file_lines(path: &Path) -> Result<LineStream, SourceError> {
    if path.extension().is_some_and(|ext| ext == "gz") {
        return gzip_lines(path);
    }
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|source| SourceError::Open {
            path: path.to_path_buf(),
            source,
        })?;
    let lines = tokio::io::BufReader::new(file).lines();
    Ok(Box::pin(
        LinesStream::new(lines).map(|item| item.map_err(SourceError::from)),
    ))
}

/// Consume standard input; follow-like, but with no offset to seek.
pub(crate) fn stdin_lines() -> LineStream {
    let lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    Box::pin(LinesStream::new(lines).map(|item| item.map_err(SourceError::from)))
}

/// Decode gzip on a blocking task and bridge lines over a bounded
/// channel; the open error still surfaces at setup time.
fn gzip_lines(path: &Path) -> Result<LineStream, SourceError> {
    let file = std::fs::File::open(path).map_err(|source| SourceError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let (tx, rx) = tokio::sync::mpsc::channel(GZIP_CHANNEL_CAPACITY);
    tokio::task::spawn_blocking(move || {
        let reader = std::io::BufReader::new(GzDecoder::new(file));
        for line in reader.lines() {
            let item = line.map_err(SourceError::from);
            let was_err = item.is_err();
            if tx.blocking_send(item).is_err() {
                // Receiver went away; nothing left to do.
                return;
            }
            if was_err {
                return;
            }
        }
    });
    Ok(Box::pin(ReceiverStream::new(rx)))
}

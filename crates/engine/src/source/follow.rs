//! Follow — `tail -f` over a growing file.
//!
//! Seeks to the current end so only newly appended lines are observed,
//! then polls: when no complete line is available the task suspends for
//! [`FOLLOW_POLL_INTERVAL`] rather than busy-spinning. The stream is
//! conceptually infinite; cancellation comes from the caller.

use std::io::SeekFrom;
use std::path::Path;

use async_stream::stream;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt};
use tokio::time::sleep;

use super::{LineStream, SourceError, FOLLOW_POLL_INTERVAL};

pub(crate) async fn tail_lines(path: &Path) -> Result<LineStream, SourceError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|source| SourceError::Open {
            path: path.to_path_buf(),
            source,
        })?;
    file.seek(SeekFrom::End(0)).await?;
    let mut reader = tokio::io::BufReader::new(file);

    Ok(Box::pin(stream! {
        let mut buf = String::new();
        loop {
            match reader.read_line(&mut buf).await {
                Ok(0) => sleep(FOLLOW_POLL_INTERVAL).await,
                Ok(_) => {
                    // A writer may be mid-line; hold the fragment until
                    // its newline lands.
                    if buf.ends_with('\n') {
                        let line = buf.trim_end_matches(['\r', '\n']).to_string();
                        buf.clear();
                        yield Ok(line);
                    }
                }
                Err(e) => {
                    yield Err(SourceError::Read(e));
                    break;
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use tokio_stream::StreamExt;

    use super::*;

    #[tokio::test]
    async fn test_follow_skips_existing_content() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "old line").expect("write");
        file.flush().expect("flush");

        let mut stream = tail_lines(file.path()).await.expect("open follow");

        writeln!(file, "new line").expect("write");
        file.flush().expect("flush");

        let line = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("line arrives in time")
            .expect("stream is open")
            .expect("line reads");
        assert_eq!(line, "new line");
    }

    #[tokio::test]
    async fn test_follow_waits_for_complete_line() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        let mut stream = tail_lines(file.path()).await.expect("open follow");

        // A partial line must not be emitted...
        write!(file, "partial").expect("write");
        file.flush().expect("flush");
        let early = tokio::time::timeout(Duration::from_millis(300), stream.next()).await;
        assert!(early.is_err(), "partial line should not be emitted");

        // ...until the newline arrives.
        writeln!(file, " now complete").expect("write");
        file.flush().expect("flush");
        let line = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("line arrives in time")
            .expect("stream is open")
            .expect("line reads");
        assert_eq!(line, "partial now complete");
    }

    #[tokio::test]
    async fn test_follow_missing_file_fails_at_open() {
        let err = tail_lines(Path::new("/nonexistent/access.log"))
            .await
            .err()
            .expect("open should fail");
        assert!(matches!(err, SourceError::Open { .. }));
    }
}

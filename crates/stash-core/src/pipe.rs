//! Bounded in-memory pipe joining a blocking writer to an async reader.
//!
//! The writer side implements [`std::io::Write`] so synchronous encoders
//! (tar, zstd, ssh2 file copies) can feed it from a blocking thread, while
//! the reader side implements [`tokio::io::AsyncRead`] for storage backends.
//! At most `capacity` chunks of [`CHUNK_SIZE`] bytes are in flight; a full
//! pipe blocks the writer until the reader catches up.
//!
//! End-of-stream is explicit: only [`PipeWriter::close`] produces a clean
//! EOF. A writer dropped without closing (an archiver that panicked, say)
//! surfaces as an `UnexpectedEof` error on the reader.

use std::io::{self, Write};
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;

/// Largest chunk carried by a single pipe message.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Default number of chunks buffered between writer and reader.
pub const DEFAULT_CAPACITY: usize = 16;

enum Message {
    Data(Vec<u8>),
    End,
    Failed(io::Error),
}

/// Create a pipe buffering at most `capacity` chunks.
pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        PipeWriter { tx: Some(tx) },
        PipeReader {
            rx,
            pending: Vec::new(),
            pos: 0,
            done: false,
        },
    )
}

/// Blocking write half of a [`pipe`].
///
/// Must not be used from an async task; run it on a blocking thread.
/// Dropping the writer without [`close`](Self::close) fails the reader.
pub struct PipeWriter {
    tx: Option<mpsc::Sender<Message>>,
}

impl PipeWriter {
    /// Close the pipe cleanly; the reader sees end-of-stream.
    pub fn close(mut self) {
        if let Some(tx) = self.tx.take() {
            // Reader may already be gone; nothing left to notify then.
            let _ = tx.blocking_send(Message::End);
        }
    }

    /// Close the pipe so the reader observes `err` instead of end-of-stream.
    pub fn close_with_error(mut self, err: io::Error) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.blocking_send(Message::Failed(err));
        }
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "pipe writer closed"))?;
        if buf.is_empty() {
            return Ok(0);
        }

        let len = buf.len().min(CHUNK_SIZE);
        tx.blocking_send(Message::Data(buf[..len].to_vec()))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader closed"))?;
        Ok(len)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Async read half of a [`pipe`].
///
/// Dropping the reader makes every further write fail with `BrokenPipe`.
pub struct PipeReader {
    rx: mpsc::Receiver<Message>,
    pending: Vec<u8>,
    pos: usize,
    done: bool,
}

impl AsyncRead for PipeReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if this.pos < this.pending.len() {
                let len = buf.remaining().min(this.pending.len() - this.pos);
                buf.put_slice(&this.pending[this.pos..this.pos + len]);
                this.pos += len;
                return Poll::Ready(Ok(()));
            }
            if this.done {
                return Poll::Ready(Ok(()));
            }

            match ready!(this.rx.poll_recv(cx)) {
                Some(Message::Data(chunk)) => {
                    this.pending = chunk;
                    this.pos = 0;
                }
                Some(Message::End) => {
                    this.done = true;
                    return Poll::Ready(Ok(()));
                }
                Some(Message::Failed(err)) => {
                    this.done = true;
                    this.rx.close();
                    return Poll::Ready(Err(err));
                }
                None => {
                    this.done = true;
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "pipe writer dropped before close",
                    )));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_pipe_transfers_more_than_capacity() {
        let (mut writer, mut reader) = pipe(2);
        let payload: Vec<u8> = (0..CHUNK_SIZE * 10).map(|i| (i % 251) as u8).collect();
        let expected = payload.clone();

        let producer = tokio::task::spawn_blocking(move || {
            writer.write_all(&payload)?;
            writer.close();
            Ok::<_, io::Error>(())
        });

        let mut received = Vec::new();
        reader.read_to_end(&mut received).await.unwrap();
        producer.await.unwrap().unwrap();
        assert_eq!(received.len(), expected.len());
        assert!(received == expected);
    }

    #[tokio::test]
    async fn test_close_with_error_reaches_reader() {
        let (writer, mut reader) = pipe(1);
        tokio::task::spawn_blocking(move || {
            writer.close_with_error(io::Error::other("archiver exploded"));
        });

        let mut received = Vec::new();
        let err = reader.read_to_end(&mut received).await.unwrap_err();
        assert_eq!(err.to_string(), "archiver exploded");
        assert!(received.is_empty());
    }

    #[tokio::test]
    async fn test_dropped_reader_breaks_writer() {
        let (mut writer, reader) = pipe(1);
        drop(reader);

        let err = tokio::task::spawn_blocking(move || writer.write_all(b"orphaned"))
            .await
            .unwrap()
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_closed_empty_pipe_is_eof() {
        let (writer, mut reader) = pipe(1);
        tokio::task::spawn_blocking(move || writer.close());

        let mut received = Vec::new();
        let n = reader.read_to_end(&mut received).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_writer_dropped_midstream_fails_reader() {
        let (mut writer, mut reader) = pipe(4);
        tokio::task::spawn_blocking(move || {
            writer.write_all(b"half an archive").unwrap();
            // As if the producer unwound mid-stream.
            drop(writer);
        });

        let mut received = Vec::new();
        let err = reader.read_to_end(&mut received).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(received, b"half an archive");
    }
}

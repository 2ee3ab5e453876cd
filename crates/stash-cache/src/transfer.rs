//! Transfer pipeline between an archive codec and a storage backend.
//!
//! Two strategies share the [`Transfer`] interface and are picked once at
//! construction:
//!
//! - [`StreamingTransfer`] runs the archiver on a blocking thread and the
//!   upload on a task, joined by a bounded [`pipe`]. Memory use is capped by
//!   the pipe capacity regardless of archive size.
//! - [`BufferedTransfer`] stages the archive in a private temporary file,
//!   for codecs that need a real file (the external `tar` binary).
//!
//! Neither strategy rolls back a partially written remote object.

use crate::archiver::{ArchiveCodec, TarCodec};
use crate::command::TarCommand;
use crate::keys::RemotePath;
use crate::types::{CompressionType, TransferStrategy};
use async_trait::async_trait;
use stash_core::pipe::{CHUNK_SIZE, DEFAULT_CAPACITY};
use stash_core::{Error, Result, Storage, pipe};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::oneshot;
use tokio_util::io::SyncIoBridge;
use tracing::{debug, warn};

/// Moves one mount between local disk and the storage backend.
#[async_trait]
pub trait Transfer: Send + Sync {
    /// Archive `src` and upload it to `dst`.
    async fn rebuild(&self, storage: &Arc<dyn Storage>, src: &Path, dst: &RemotePath) -> Result<()>;

    /// Download `src` and unpack it beneath `root`.
    async fn restore(&self, storage: &Arc<dyn Storage>, src: &RemotePath, root: &Path) -> Result<()>;

    /// Strategy name for logging.
    fn name(&self) -> &str;
}

/// Build the transfer for a configured strategy.
pub fn transfer_for(
    strategy: TransferStrategy,
    compression: CompressionType,
    pipe_capacity: usize,
) -> Box<dyn Transfer> {
    match strategy {
        TransferStrategy::Streaming => Box::new(
            StreamingTransfer::new(Arc::new(TarCodec::new(compression)))
                .with_pipe_capacity(pipe_capacity),
        ),
        TransferStrategy::Buffered => {
            Box::new(BufferedTransfer::new(Arc::new(TarCommand::new(compression))))
        }
    }
}

async fn outcome(rx: oneshot::Receiver<Result<()>>, unit: &str) -> Result<()> {
    rx.await
        .unwrap_or_else(|_| Err(Error::Internal(format!("{} stopped without reporting", unit))))
}

/// Concurrent archive-and-upload over an in-memory pipe.
pub struct StreamingTransfer {
    codec: Arc<dyn ArchiveCodec>,
    pipe_capacity: usize,
}

impl StreamingTransfer {
    pub fn new(codec: Arc<dyn ArchiveCodec>) -> Self {
        Self {
            codec,
            pipe_capacity: DEFAULT_CAPACITY,
        }
    }

    /// Number of chunks buffered between archiver and uploader.
    pub fn with_pipe_capacity(mut self, capacity: usize) -> Self {
        self.pipe_capacity = capacity.max(1);
        self
    }
}

#[async_trait]
impl Transfer for StreamingTransfer {
    async fn rebuild(&self, storage: &Arc<dyn Storage>, src: &Path, dst: &RemotePath) -> Result<()> {
        let (writer, reader) = pipe(self.pipe_capacity);
        let (archived_tx, archived_rx) = oneshot::channel();
        let (uploaded_tx, uploaded_rx) = oneshot::channel();

        // Each unit owns its pipe end. An archiver that panics drops its end
        // unclosed, which the uploader reads as an error.
        let codec = Arc::clone(&self.codec);
        let source = src.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let mut buffered = BufWriter::with_capacity(CHUNK_SIZE, writer);
            let result = codec.archive(&source, &mut buffered).and_then(|()| {
                buffered
                    .flush()
                    .map_err(|e| Error::ArchiveFailed(format!("Failed to flush archive: {}", e)))
            });
            let (writer, _) = buffered.into_parts();
            match &result {
                Ok(()) => writer.close(),
                Err(e) => writer.close_with_error(io::Error::other(e.to_string())),
            }
            let _ = archived_tx.send(result);
        });

        let storage = Arc::clone(storage);
        let path = dst.to_string();
        tokio::spawn(async move {
            let result = storage.put(&path, None, Box::pin(reader)).await;
            let _ = uploaded_tx.send(result);
        });

        let archived = outcome(archived_rx, "archiver").await;
        let uploaded = outcome(uploaded_rx, "uploader").await;
        if let (Err(archive_err), Err(upload_err)) = (&archived, &uploaded) {
            warn!(archive_error = %archive_err, upload_error = %upload_err, "Archiver and uploader both failed");
        }
        archived?;
        uploaded
    }

    async fn restore(&self, storage: &Arc<dyn Storage>, src: &RemotePath, root: &Path) -> Result<()> {
        let stream = storage.get(src.as_str()).await?;
        let mut reader = SyncIoBridge::new(stream);

        let codec = Arc::clone(&self.codec);
        let root = root.to_path_buf();
        tokio::task::spawn_blocking(move || codec.extract(&root, &mut reader)).await?
    }

    fn name(&self) -> &str {
        "streaming"
    }
}

/// Archive staged through a private temporary file.
pub struct BufferedTransfer {
    codec: Arc<dyn ArchiveCodec>,
}

impl BufferedTransfer {
    pub fn new(codec: Arc<dyn ArchiveCodec>) -> Self {
        Self { codec }
    }
}

fn staging_file() -> Result<tempfile::NamedTempFile> {
    Ok(tempfile::Builder::new()
        .prefix("stash-")
        .suffix(".tar")
        .tempfile()?)
}

#[async_trait]
impl Transfer for BufferedTransfer {
    async fn rebuild(&self, storage: &Arc<dyn Storage>, src: &Path, dst: &RemotePath) -> Result<()> {
        // Removed on drop, whichever way this function returns.
        let staged = staging_file()?;

        let codec = Arc::clone(&self.codec);
        let source = src.to_path_buf();
        let target = staged.path().to_path_buf();
        tokio::task::spawn_blocking(move || codec.archive_to_file(&source, &target)).await??;

        let file = tokio::fs::File::open(staged.path()).await?;
        let size = file.metadata().await?.len();
        debug!(path = %dst, bytes = size, "Uploading staged archive");
        storage.put(dst.as_str(), None, Box::pin(file)).await
    }

    async fn restore(&self, storage: &Arc<dyn Storage>, src: &RemotePath, root: &Path) -> Result<()> {
        let mut stream = storage.get(src.as_str()).await?;
        let staged = staging_file()?;

        let mut file = tokio::fs::File::create(staged.path()).await?;
        let size = tokio::io::copy(&mut stream, &mut file)
            .await
            .map_err(|e| Error::Backend(format!("Failed to download {}: {}", src, e)))?;
        file.flush().await?;
        drop(file);
        debug!(path = %src, bytes = size, "Downloaded archive");

        let codec = Arc::clone(&self.codec);
        let archive = staged.path().to_path_buf();
        let root = root.to_path_buf();
        let result = tokio::task::spawn_blocking(move || codec.extract_from_file(&archive, &root)).await?;
        drop(staged);
        result
    }

    fn name(&self) -> &str {
        "buffered"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_for_strategy() {
        let streaming = transfer_for(TransferStrategy::Streaming, CompressionType::None, 4);
        let buffered = transfer_for(TransferStrategy::Buffered, CompressionType::Gzip, 4);
        assert_eq!(streaming.name(), "streaming");
        assert_eq!(buffered.name(), "buffered");
    }
}

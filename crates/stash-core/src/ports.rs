//! Port traits (hexagonal architecture).
//!
//! The storage port is the only interface between the cache pipeline and a
//! remote (or local) backend. Paths are opaque `/`-separated strings; only
//! the orchestrator knows how they are composed.

use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;
use tokio::io::AsyncRead;

/// Readable byte stream handed between the pipeline and a backend.
pub type ByteStream = Pin<Box<dyn AsyncRead + Send>>;

/// Read-only projection of an object stored by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEntry {
    /// Backend path of the entry.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time, when the backend reports one.
    pub modified: Option<DateTime<Utc>>,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

/// Blob store capability required by the cache pipeline.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Walk the subtree rooted at `prefix`.
    ///
    /// Entries whose metadata cannot be read are skipped. Only used for
    /// diagnostics; rebuild and restore never consult it.
    async fn list(&self, prefix: &str) -> Result<Vec<StorageEntry>>;

    /// Open the object at `path` for reading.
    ///
    /// Fails with `Error::NotFound` when the object is absent.
    async fn get(&self, path: &str) -> Result<ByteStream>;

    /// Write `src` to `path`, creating missing ancestor directories first.
    ///
    /// An existing object is overwritten. The `ttl` hint is backend-defined
    /// and may be ignored.
    async fn put(&self, path: &str, ttl: Option<Duration>, src: ByteStream) -> Result<()>;

    /// Delete the object at `path`.
    ///
    /// Fails with `Error::NotFound` when the object is absent.
    async fn remove(&self, path: &str) -> Result<()>;

    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Release any session held by the backend. Called once at the end of a run.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

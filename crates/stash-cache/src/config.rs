//! Cache run configuration.

use crate::keys::{CacheKey, RemotePath};
use crate::types::{CompressionType, TransferStrategy};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Settings for a rebuild or restore run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Root of all cache entries on the backend.
    #[serde(default = "default_base_path")]
    pub base_path: String,
    /// Repository namespace (e.g. `owner/name`).
    #[serde(default)]
    pub namespace: String,
    /// Branch being built.
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Repository default branch, used when `branch` is empty.
    #[serde(default)]
    pub default_branch: Option<String>,
    /// Local directories to cache, processed in order.
    #[serde(default)]
    pub mounts: Vec<String>,
    /// Share entries across branches.
    #[serde(default)]
    pub ignore_branch: bool,
    /// Directory archives are extracted into.
    #[serde(default = "default_restore_root")]
    pub restore_root: PathBuf,
    #[serde(default)]
    pub strategy: TransferStrategy,
    #[serde(default)]
    pub compression: CompressionType,
    /// Chunks buffered between archiver and uploader in streaming mode.
    #[serde(default = "default_pipe_capacity")]
    pub pipe_capacity: usize,
}

fn default_base_path() -> String {
    "/var/lib/cache/drone".to_string()
}

fn default_branch() -> String {
    "master".to_string()
}

fn default_restore_root() -> PathBuf {
    PathBuf::from("/")
}

fn default_pipe_capacity() -> usize {
    stash_core::pipe::DEFAULT_CAPACITY
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            namespace: String::new(),
            branch: default_branch(),
            default_branch: None,
            mounts: vec![],
            ignore_branch: false,
            restore_root: default_restore_root(),
            strategy: TransferStrategy::default(),
            compression: CompressionType::default(),
            pipe_capacity: default_pipe_capacity(),
        }
    }
}

impl CacheConfig {
    pub fn new(base_path: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn with_default_branch(mut self, branch: impl Into<String>) -> Self {
        self.default_branch = Some(branch.into());
        self
    }

    pub fn with_mounts<I, S>(mut self, mounts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mounts = mounts.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_ignore_branch(mut self, ignore: bool) -> Self {
        self.ignore_branch = ignore;
        self
    }

    pub fn with_restore_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.restore_root = root.into();
        self
    }

    pub fn with_strategy(mut self, strategy: TransferStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_pipe_capacity(mut self, capacity: usize) -> Self {
        self.pipe_capacity = capacity;
        self
    }

    /// Branch used for key derivation.
    pub fn effective_branch(&self) -> &str {
        match (&self.branch, &self.default_branch) {
            (b, Some(fallback)) if b.is_empty() => fallback.as_str(),
            (b, _) => b.as_str(),
        }
    }

    /// Key for a mount. Rebuild and restore must agree on this.
    pub fn key_for(&self, mount: &str) -> CacheKey {
        if self.ignore_branch {
            CacheKey::for_mount(mount, None)
        } else {
            CacheKey::for_mount(mount, Some(self.effective_branch()))
        }
    }

    /// Backend location for a mount.
    pub fn path_for(&self, mount: &str) -> RemotePath {
        RemotePath::compose(&self.base_path, &self.namespace, &self.key_for(mount))
    }
}

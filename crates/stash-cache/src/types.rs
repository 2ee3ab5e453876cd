//! Cache types and run results.

use crate::keys::{CacheKey, RemotePath};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Compression wrapped around the tar stream.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompressionType {
    #[default]
    None,
    Gzip,
    Zstd,
    Lz4,
}

/// How archives travel between the codec and the storage backend.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransferStrategy {
    /// In-process tar streamed through a bounded pipe.
    #[default]
    Streaming,
    /// External `tar` staged through a temporary file.
    Buffered,
}

/// Cache operation applied to every mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Rebuild,
    Restore,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Rebuild => f.write_str("rebuild"),
            Mode::Restore => f.write_str("restore"),
        }
    }
}

/// Result of processing a single mount.
#[derive(Debug, Clone)]
pub struct MountResult {
    /// Local directory.
    pub mount: PathBuf,
    /// Key derived for the mount.
    pub key: CacheKey,
    /// Backend location of the entry.
    pub path: RemotePath,
    /// Time taken in milliseconds.
    pub duration_ms: u64,
}

/// Outcome of one mode within a run.
#[derive(Debug, Clone)]
pub struct ModeReport {
    pub mode: Mode,
    /// Mounts processed successfully, in order.
    pub mounts: Vec<MountResult>,
    /// Wall time for the whole mode.
    pub elapsed: Duration,
    /// First failure, which aborted the remaining mounts.
    pub error: Option<String>,
}

impl ModeReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome of a full run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub rebuild: Option<ModeReport>,
    pub restore: Option<ModeReport>,
    /// Restore was requested but skipped by the commit message.
    pub restore_skipped: bool,
}

impl RunReport {
    /// Whether every requested mode completed without error.
    pub fn succeeded(&self) -> bool {
        self.rebuild.iter().chain(self.restore.iter()).all(ModeReport::succeeded)
    }
}

/// Modes requested for a run.
#[derive(Debug, Clone, Default)]
pub struct RunPlan {
    pub rebuild: bool,
    pub restore: bool,
    /// Commit message checked for a restore skip marker.
    pub message: Option<String>,
}

//! Cache orchestrator: drives every configured mount through a transfer.

use crate::config::CacheConfig;
use crate::skip;
use crate::transfer::{Transfer, transfer_for};
use crate::types::{Mode, ModeReport, MountResult, RunPlan, RunReport};
use stash_core::{Result, Storage};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Processes mounts strictly in order; the first failure aborts the rest.
pub struct Orchestrator {
    config: CacheConfig,
    storage: Arc<dyn Storage>,
    transfer: Box<dyn Transfer>,
}

impl Orchestrator {
    /// Create an orchestrator using the transfer strategy from `config`.
    pub fn new(config: CacheConfig, storage: Arc<dyn Storage>) -> Self {
        let transfer = transfer_for(config.strategy, config.compression, config.pipe_capacity);
        Self {
            config,
            storage,
            transfer,
        }
    }

    /// Replace the configured transfer strategy.
    pub fn with_transfer(mut self, transfer: Box<dyn Transfer>) -> Self {
        self.transfer = transfer;
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Archive every mount and upload it.
    pub async fn rebuild(&self) -> Result<Vec<MountResult>> {
        let mut done = vec![];
        self.process(Mode::Rebuild, &mut done).await?;
        Ok(done)
    }

    /// Download and unpack every mount.
    pub async fn restore(&self) -> Result<Vec<MountResult>> {
        let mut done = vec![];
        self.process(Mode::Restore, &mut done).await?;
        Ok(done)
    }

    async fn process(&self, mode: Mode, done: &mut Vec<MountResult>) -> Result<()> {
        for mount in &self.config.mounts {
            let start = Instant::now();
            let key = self.config.key_for(mount);
            let path = self.config.path_for(mount);

            match mode {
                Mode::Rebuild => {
                    info!(mount = %mount, path = %path, strategy = self.transfer.name(), "Archiving directory to remote cache");
                    self.transfer
                        .rebuild(&self.storage, Path::new(mount), &path)
                        .await?;
                }
                Mode::Restore => {
                    info!(mount = %mount, path = %path, strategy = self.transfer.name(), "Restoring directory from remote cache");
                    self.transfer
                        .restore(&self.storage, &path, &self.config.restore_root)
                        .await?;
                }
            }

            let duration_ms = start.elapsed().as_millis() as u64;
            info!(mount = %mount, duration_ms, "Mount {} complete", mode);
            done.push(MountResult {
                mount: mount.into(),
                key,
                path,
                duration_ms,
            });
        }
        Ok(())
    }

    async fn run_mode(&self, mode: Mode) -> ModeReport {
        let start = Instant::now();
        let mut mounts = vec![];
        let error = self
            .process(mode, &mut mounts)
            .await
            .err()
            .map(|e| e.to_string());

        let report = ModeReport {
            mode,
            mounts,
            elapsed: start.elapsed(),
            error,
        };
        match mode {
            Mode::Rebuild => info!("cache built in {:?}", report.elapsed),
            Mode::Restore => info!("cache restored in {:?}", report.elapsed),
        }
        if let Some(err) = &report.error {
            error!(mode = %mode, error = %err, "Cache {} failed", mode);
        }
        report
    }

    /// Run the requested modes, then close the storage backend.
    ///
    /// Failures are logged and recorded in the report, never returned: a
    /// broken cache must not fail the build.
    pub async fn execute(&self, plan: &RunPlan) -> RunReport {
        let mut report = RunReport::default();

        if plan.rebuild {
            report.rebuild = Some(self.run_mode(Mode::Rebuild).await);
        }

        if plan.restore {
            let marker = plan.message.as_deref().and_then(skip::skip_marker);
            match marker {
                Some(marker) => {
                    info!(
                        "skip restore cache. {} found in '{}'",
                        marker,
                        plan.message.as_deref().unwrap_or_default()
                    );
                    report.restore_skipped = true;
                }
                None => report.restore = Some(self.run_mode(Mode::Restore).await),
            }
        }

        if let Err(err) = self.storage.close().await {
            warn!(backend = self.storage.name(), error = %err, "Failed to close storage");
        }
        report
    }
}

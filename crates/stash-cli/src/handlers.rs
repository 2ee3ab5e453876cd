//! Command handlers.

use console::style;
use stash_cache::{Orchestrator, RunPlan};
use stash_core::{Storage, StorageEntry};
use stash_sftp::{SftpConfig, SftpStorage};
use std::sync::Arc;
use tracing::error;

use crate::commands::{BuildArgs, PluginArgs, SftpArgs};
use crate::config;

/// Rebuild and/or restore the configured mounts.
///
/// Only configuration errors are returned; everything else is logged so
/// the build step carries on.
pub async fn run_plugin(
    build: BuildArgs,
    plugin: PluginArgs,
    sftp: SftpArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let backend = sftp.sftp_config();
    backend.validate()?;

    if !plugin.rebuild && !plugin.restore {
        println!(
            "{} Neither rebuild nor restore requested",
            style("!").yellow()
        );
        return Ok(());
    }

    let storage = match SftpStorage::connect(&backend).await {
        Ok(storage) => storage,
        Err(err) => {
            error!(server = %backend.address(), error = %err, "Cannot reach cache server");
            return Ok(());
        }
    };

    let cache = config::cache_config(&build, &plugin, sftp.base_path());
    let orchestrator = Orchestrator::new(cache, Arc::new(storage));
    let report = orchestrator
        .execute(&RunPlan {
            rebuild: plugin.rebuild,
            restore: plugin.restore,
            message: build.message,
        })
        .await;

    for mode in report.rebuild.iter().chain(report.restore.iter()) {
        let marker = if mode.succeeded() {
            style("✓").green()
        } else {
            style("✗").red()
        };
        println!(
            "{} {} {} mount(s) in {:?}",
            marker,
            mode.mode,
            mode.mounts.len(),
            mode.elapsed
        );
    }
    if report.restore_skipped {
        println!("{} Restore skipped by commit message", style("i").blue());
    }
    Ok(())
}

async fn connect(sftp: &SftpArgs) -> Result<SftpStorage, Box<dyn std::error::Error>> {
    let backend: SftpConfig = sftp.sftp_config();
    Ok(SftpStorage::connect(&backend).await?)
}

/// List stored objects.
pub async fn list(
    sftp: &SftpArgs,
    prefix: Option<String>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let storage = connect(sftp).await?;
    let prefix = prefix.unwrap_or_else(|| sftp.base_path());
    let entries = storage.list(&prefix).await;
    storage.close().await?;
    let entries = entries?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("{} Nothing stored under {}", style("i").blue(), prefix);
        return Ok(());
    }
    for entry in &entries {
        println!("{}", format_entry(entry));
    }
    Ok(())
}

fn format_entry(entry: &StorageEntry) -> String {
    let modified = entry
        .modified
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string());
    if entry.is_dir {
        format!(
            "{:>12}  {}  {}/",
            "-",
            modified,
            style(&entry.name).bold()
        )
    } else {
        format!("{:>12}  {}  {}", entry.size, modified, entry.name)
    }
}

/// Remove one stored object.
pub async fn remove(sftp: &SftpArgs, path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let storage = connect(sftp).await?;
    let removed = storage.remove(path).await;
    storage.close().await?;
    removed?;

    println!("{} Removed {}", style("✓").green(), path);
    Ok(())
}

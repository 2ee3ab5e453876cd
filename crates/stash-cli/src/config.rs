//! Resolves parsed arguments into cache and backend settings.

use crate::commands::{BuildArgs, PluginArgs, SftpArgs};
use stash_cache::CacheConfig;
use stash_sftp::SftpConfig;

/// Reads a non-empty environment variable.
fn fallback(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl SftpArgs {
    /// Fill unset values from the `PLUGIN_*` variables.
    pub fn with_fallbacks(self) -> Self {
        self.with_fallbacks_from(fallback)
    }

    fn with_fallbacks_from(self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            server: self.server.or_else(|| lookup("PLUGIN_SERVER")),
            port: self
                .port
                .or_else(|| lookup("PLUGIN_PORT").and_then(|p| p.parse().ok())),
            path: self.path.or_else(|| lookup("PLUGIN_PATH")),
            username: self.username.or_else(|| lookup("PLUGIN_USERNAME")),
            password: self.password.or_else(|| lookup("PLUGIN_PASSWORD")),
            key: self.key.or_else(|| lookup("PLUGIN_KEY")),
        }
    }

    pub fn sftp_config(&self) -> SftpConfig {
        let mut config = SftpConfig::new(self.server.clone().unwrap_or_default());
        if let Some(port) = self.port {
            config = config.with_port(port);
        }
        if let Some(username) = &self.username {
            config = config.with_username(username.as_str());
        }
        if let Some(password) = &self.password {
            config = config.with_password(password.as_str());
        }
        if let Some(key) = &self.key {
            config = config.with_private_key(key.as_str());
        }
        config
    }

    /// Base path on the server.
    pub fn base_path(&self) -> String {
        self.path
            .clone()
            .unwrap_or_else(|| CacheConfig::default().base_path)
    }
}

/// Cache settings for one run.
pub fn cache_config(build: &BuildArgs, plugin: &PluginArgs, base_path: String) -> CacheConfig {
    let mut config = CacheConfig::new(base_path, build.repo.as_str())
        .with_branch(build.branch.as_str())
        .with_mounts(
            plugin
                .mount
                .iter()
                .map(|m| m.trim())
                .filter(|m| !m.is_empty()),
        )
        .with_ignore_branch(plugin.ignore_branch)
        .with_strategy(plugin.strategy.into())
        .with_compression(plugin.compression.into());
    if let Some(default_branch) = &build.default_branch {
        config = config.with_default_branch(default_branch.as_str());
    }
    config
}

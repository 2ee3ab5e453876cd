//! CLI argument definitions.

use clap::{Args, Subcommand, ValueEnum};
use stash_cache::{CompressionType, TransferStrategy};

#[derive(Subcommand)]
pub enum Commands {
    /// List objects stored under a prefix
    List {
        /// Remote prefix; defaults to the cache path
        prefix: Option<String>,

        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove one stored object
    Remove {
        /// Remote path of the object
        path: String,
    },
}

/// Build metadata supplied by the CI system.
#[derive(Args, Debug, Clone)]
pub struct BuildArgs {
    /// Repository full name
    #[arg(long = "repo-name", env = "DRONE_REPO", default_value = "")]
    pub repo: String,

    /// Repository default branch
    #[arg(long = "repo-branch", env = "DRONE_REPO_BRANCH")]
    pub default_branch: Option<String>,

    /// Branch being built
    #[arg(long = "commit-branch", env = "DRONE_COMMIT_BRANCH", default_value = "master")]
    pub branch: String,

    /// Commit message, checked for a restore skip marker
    #[arg(long = "commit-message", env = "DRONE_COMMIT_MESSAGE")]
    pub message: Option<String>,
}

/// What to cache and how.
#[derive(Args, Debug, Clone)]
pub struct PluginArgs {
    /// Directories to cache
    #[arg(long, env = "PLUGIN_MOUNT", value_delimiter = ',')]
    pub mount: Vec<String>,

    /// Archive the mounts and upload them
    #[arg(long, env = "PLUGIN_REBUILD")]
    pub rebuild: bool,

    /// Download and unpack the mounts
    #[arg(long, env = "PLUGIN_RESTORE")]
    pub restore: bool,

    /// Share cache entries across branches
    #[arg(long, env = "PLUGIN_IGNORE_BRANCH")]
    pub ignore_branch: bool,

    /// Transfer strategy
    #[arg(long, env = "PLUGIN_STRATEGY", value_enum, default_value_t = StrategyArg::Streaming)]
    pub strategy: StrategyArg,

    /// Compression around the archive
    #[arg(long, env = "PLUGIN_COMPRESSION", value_enum, default_value_t = CompressionArg::None)]
    pub compression: CompressionArg,
}

/// SFTP endpoint and credentials.
///
/// Each value falls back to its `PLUGIN_*` variable when the primary
/// variable is unset.
#[derive(Args, Debug, Clone)]
pub struct SftpArgs {
    /// SFTP server, optionally with `:port`
    #[arg(long, env = "SFTP_CACHE_SERVER")]
    pub server: Option<String>,

    /// SFTP port
    #[arg(long, env = "SFTP_CACHE_PORT")]
    pub port: Option<u16>,

    /// Base path on the server
    #[arg(long, env = "SFTP_CACHE_PATH")]
    pub path: Option<String>,

    /// SFTP username
    #[arg(long, env = "SFTP_CACHE_USERNAME")]
    pub username: Option<String>,

    /// SFTP password
    #[arg(long, env = "SFTP_CACHE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// SFTP private key
    #[arg(long, env = "SFTP_CACHE_PRIVATE_KEY", hide_env_values = true)]
    pub key: Option<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyArg {
    Streaming,
    Buffered,
}

impl From<StrategyArg> for TransferStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Streaming => TransferStrategy::Streaming,
            StrategyArg::Buffered => TransferStrategy::Buffered,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionArg {
    None,
    Gzip,
    Zstd,
    Lz4,
}

impl From<CompressionArg> for CompressionType {
    fn from(arg: CompressionArg) -> Self {
        match arg {
            CompressionArg::None => CompressionType::None,
            CompressionArg::Gzip => CompressionType::Gzip,
            CompressionArg::Zstd => CompressionType::Zstd,
            CompressionArg::Lz4 => CompressionType::Lz4,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

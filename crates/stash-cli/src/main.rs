//! stash CLI entrypoint.

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod handlers;

use commands::{BuildArgs, Commands, LogFormat, PluginArgs, SftpArgs};

#[derive(Parser)]
#[command(name = "stash")]
#[command(author, version, about = "Cache and restore build artifacts over SFTP", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    build: BuildArgs,

    #[command(flatten)]
    plugin: PluginArgs,

    #[command(flatten)]
    sftp: SftpArgs,

    /// Log output format
    #[arg(long, env = "STASH_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.log_format);
    let sftp = cli.sftp.with_fallbacks();

    match cli.command {
        None => handlers::run_plugin(cli.build, cli.plugin, sftp).await?,
        Some(Commands::List { prefix, json }) => handlers::list(&sftp, prefix, json).await?,
        Some(Commands::Remove { path }) => handlers::remove(&sftp, &path).await?,
    }

    Ok(())
}

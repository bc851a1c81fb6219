//! FMS upload command-line entry point.

mod commands;
mod config;

use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,fms=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = commands::Cli::parse();

    let mut config = config::CliConfig::load();
    cli.overrides.apply(&mut config);
    tracing::debug!(
        storage = %config.storage_url,
        jobs = %config.job_url,
        mode = ?config.mode,
        "configuration loaded"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(commands::run(cli.command, config))
}

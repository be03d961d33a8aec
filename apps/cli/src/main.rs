//! ossup command line entry point.

mod app;
mod args;
mod config;

use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let args = args::Args::parse();

    // Logs go to stderr; stdout carries the JSON result.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = config::Config::load(args.config.as_deref())?;
    config.apply_args(&args);
    tracing::debug!(?config, "effective configuration");

    let rt = tokio::runtime::Runtime::new()?;
    let output = rt.block_on(app::run(&args, &config))?;

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

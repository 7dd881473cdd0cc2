mod channel;
mod cli;
mod error;
mod model;
mod orchestrator;
mod parser;
mod render;
mod store;

use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_logging();
    let args = cli::Cli::parse();
    cli::run(args).await
}

/// Logs go to stderr; stdout carries render output only.
fn init_logging() {
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

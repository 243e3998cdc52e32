use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};

mod address;
mod args;
mod cfg;
mod error;
mod job;
mod notify;
mod output;
mod secret;
mod smartsheet;

use args::Args;
use cfg::Cfg;
use notify::NotificationDispatcher;
use smartsheet::SmartsheetClient;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level)?;

    info!("Starting report_pull");

    load_env_file(&args.env_file);

    // Load configuration
    let cfg = Cfg::load(&args)?;

    let dispatcher = NotificationDispatcher::from_config(&cfg.mail);
    let exporter = match SmartsheetClient::new(&cfg.smartsheet)
        .context("failed to create Smartsheet client")
    {
        Ok(client) => client,
        Err(e) => {
            job::report_failure(&cfg, &dispatcher, &e).await;
            return Err(e);
        }
    };

    job::run_with_error_handling(&cfg, &exporter, &dispatcher).await?;

    info!("report_pull completed successfully");
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = match level {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_max_level(filter)
        .init();

    Ok(())
}

/// Load `path` into the process environment. A missing file is not an error.
fn load_env_file(path: &Path) {
    match dotenvy::from_path(path) {
        Ok(()) => debug!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => debug!("No env file at {}", path.display()),
        Err(e) => tracing::warn!("Ignoring unreadable env file {}: {}", path.display(), e),
    }
}

//! fromistargram-crawler: archives Instagram posts and profile pictures.
//!
//! Each configured account gets a directory under the data root holding its
//! captions, media, and a deduplicated history of profile pictures. Accounts
//! are crawled one after another with per-account retries, either once or on
//! a fixed interval.

#![warn(clippy::all)]

mod archive;
mod cli;
mod config;
mod crawl;
mod instagram;
#[cfg(test)]
mod log_capture;
pub mod retry;
mod shutdown;
mod types;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use instagram::{InstagramClient, Session};

/// Request timeout for the platform API.
const HTTP_TIMEOUT_SECS: u64 = 30;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    let config = config::Config::from_cli(cli)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_filter())),
        )
        .init();

    tracing::debug!(?config, "Loaded configuration");
    tracing::info!(
        accounts = config.accounts.len(),
        "Starting fromistargram-crawler"
    );

    let shutdown_token = shutdown::install_signal_handler()?;

    let session = Session::bootstrap(
        &config.session_dir,
        &config.login_username,
        config.password.as_deref(),
        Some(HTTP_TIMEOUT_SECS),
    )
    .await?;
    let client = InstagramClient::new(session);

    match config.interval {
        Some(interval) => tracing::info!(
            "Crawling every {} minutes: {}",
            interval.as_secs() / 60,
            config.accounts.join(", ")
        ),
        None => tracing::info!("Crawling once: {}", config.accounts.join(", ")),
    }

    let orchestrator =
        crawl::Orchestrator::new(&client, config.orchestrator_config(), shutdown_token.clone());
    orchestrator.run().await;

    if shutdown_token.is_cancelled() {
        tracing::info!("Interrupted, exiting cleanly");
    }
    Ok(())
}

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::archive::{archive_profile_picture, AccountDir, HashLedger, ProfilePicOutcome};
use crate::instagram::{Profile, Transport};
use crate::retry::{retry_with_backoff, RetryConfig, RetryOutcome};

use super::{crawl_account, CrawlError, CrawlOptions, CrawlSummary, StopReason};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub accounts: Vec<String>,
    pub data_root: PathBuf,
    pub retry: RetryConfig,
    pub crawl: CrawlOptions,
    /// `None` runs a single cycle.
    pub interval: Option<Duration>,
    /// Pause between two accounts of the same cycle.
    pub account_delay: Duration,
}

/// How processing one account ended.
#[derive(Debug)]
pub enum AccountOutcome {
    Succeeded { attempts: u32, posts: usize },
    Exhausted { attempts: u32, error: CrawlError },
    /// A non-retryable error ended the account early.
    Failed { attempt: u32, error: CrawlError },
    Cancelled,
}

impl std::fmt::Display for AccountOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountOutcome::Succeeded { attempts, posts } => {
                write!(f, "succeeded on attempt {} ({} posts)", attempts, posts)
            }
            AccountOutcome::Exhausted { attempts, error } => {
                write!(f, "gave up after {} attempts: {}", attempts, error)
            }
            AccountOutcome::Failed { attempt, error } => {
                write!(f, "failed on attempt {}: {}", attempt, error)
            }
            AccountOutcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Default)]
pub struct CycleReport {
    pub outcomes: Vec<(String, AccountOutcome)>,
    pub elapsed: Duration,
}

impl CycleReport {
    fn count(&self, pred: impl Fn(&AccountOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, AccountOutcome::Succeeded { .. }))
    }

    pub fn exhausted(&self) -> usize {
        self.count(|o| matches!(o, AccountOutcome::Exhausted { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, AccountOutcome::Failed { .. }))
    }

    pub fn posts(&self) -> usize {
        self.outcomes
            .iter()
            .map(|(_, o)| match o {
                AccountOutcome::Succeeded { posts, .. } => *posts,
                _ => 0,
            })
            .sum()
    }
}

/// Time left to wait before the next cycle; zero when the cycle overran.
pub fn next_sleep(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}

/// Drives every configured account through the crawl, one at a time.
pub struct Orchestrator<'a> {
    transport: &'a dyn Transport,
    config: OrchestratorConfig,
    shutdown: CancellationToken,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        config: OrchestratorConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            transport,
            config,
            shutdown,
        }
    }

    /// Run cycles until the configured mode says stop or shutdown is requested.
    pub async fn run(&self) {
        loop {
            let started = Instant::now();
            self.run_once().await;

            let Some(interval) = self.config.interval else {
                break;
            };
            if self.shutdown.is_cancelled() {
                tracing::info!("Shutdown requested, exiting...");
                break;
            }
            let wait = next_sleep(interval, started.elapsed());
            tracing::info!("Waiting {} seconds until next cycle...", wait.as_secs());
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Shutdown during wait, exiting...");
                    break;
                }
            }
        }
    }

    /// One sequential pass over every account.
    pub async fn run_once(&self) -> CycleReport {
        let started = Instant::now();
        let mut report = CycleReport::default();

        for (index, username) in self.config.accounts.iter().enumerate() {
            if self.shutdown.is_cancelled() {
                tracing::info!("Shutdown requested, skipping remaining accounts");
                break;
            }
            if index > 0 && !self.config.account_delay.is_zero() {
                tracing::debug!(
                    "Waiting {}s before next account",
                    self.config.account_delay.as_secs()
                );
                tokio::select! {
                    _ = tokio::time::sleep(self.config.account_delay) => {}
                    _ = self.shutdown.cancelled() => {
                        tracing::info!("Shutdown requested, skipping remaining accounts");
                        break;
                    }
                }
            }

            let outcome = self.process_account(username).await;
            report.outcomes.push((username.clone(), outcome));
        }

        report.elapsed = started.elapsed();
        tracing::info!(
            succeeded = report.succeeded(),
            exhausted = report.exhausted(),
            failed = report.failed(),
            posts = report.posts(),
            "Cycle finished in {}s",
            report.elapsed.as_secs()
        );
        for (username, outcome) in &report.outcomes {
            tracing::info!("  {}: {}", username, outcome);
        }
        report
    }

    /// Crawl one account under the retry policy. Never propagates an error.
    pub async fn process_account(&self, username: &str) -> AccountOutcome {
        tracing::info!(account = %username, "Processing account");

        let outcome = retry_with_backoff(
            &self.config.retry,
            &self.shutdown,
            CrawlError::retry_action,
            |attempt| self.attempt_account(username, attempt),
        )
        .instrument(tracing::info_span!("account", account = %username))
        .await;

        match outcome {
            RetryOutcome::Succeeded { value, .. } if value.stop == StopReason::Cancelled => {
                tracing::info!(
                    account = %username,
                    posts = value.posts,
                    "Crawl interrupted by shutdown"
                );
                AccountOutcome::Cancelled
            }
            RetryOutcome::Succeeded { value, attempts } => {
                tracing::info!(
                    account = %username,
                    attempts,
                    posts = value.posts,
                    violations = value.violations.len(),
                    "Account done"
                );
                AccountOutcome::Succeeded {
                    attempts,
                    posts: value.posts,
                }
            }
            RetryOutcome::Exhausted {
                attempts,
                last_error,
            } => {
                tracing::error!(
                    account = %username,
                    attempts,
                    "Giving up after {} attempts: {}",
                    attempts,
                    last_error
                );
                AccountOutcome::Exhausted {
                    attempts,
                    error: last_error,
                }
            }
            RetryOutcome::Aborted { attempt, error } => {
                tracing::error!(account = %username, attempt, "Account failed: {}", error);
                AccountOutcome::Failed { attempt, error }
            }
            RetryOutcome::Cancelled {
                attempt,
                last_error,
            } => {
                tracing::info!(
                    account = %username,
                    attempt,
                    "Shutdown during retry wait (last error: {})",
                    last_error
                );
                AccountOutcome::Cancelled
            }
        }
    }

    async fn attempt_account(
        &self,
        username: &str,
        attempt: u32,
    ) -> Result<CrawlSummary, CrawlError> {
        tracing::debug!(account = %username, attempt, "Starting attempt");
        let account = AccountDir::ensure(&self.config.data_root, username).await?;

        let profile = self.transport.profile(username).await?;
        log_profile(&profile);

        self.update_profile_picture(&profile, &account).await?;

        crawl_account(
            self.transport,
            &profile,
            &account,
            &self.config.crawl,
            &self.shutdown,
        )
        .await
    }

    async fn update_profile_picture(
        &self,
        profile: &Profile,
        account: &AccountDir,
    ) -> Result<(), CrawlError> {
        let Some(url) = profile.profile_pic_url.as_deref() else {
            tracing::warn!("No profile picture URL for {}", profile.username);
            return Ok(());
        };
        let picture = self.transport.fetch_raw(url).await?;
        let mut ledger = HashLedger::load(account).await?;
        if ledger.is_empty() {
            tracing::debug!("No profile picture history for {}", profile.username);
        }
        if let ProfilePicOutcome::Archived { path } =
            archive_profile_picture(account, &picture, &mut ledger, Utc::now()).await?
        {
            tracing::debug!(
                known = ledger.len(),
                "Saved profile picture to {}",
                path.display()
            );
        }
        Ok(())
    }
}

fn log_profile(profile: &Profile) {
    tracing::info!(
        account = %profile.username,
        "{} ({}): {} posts, {} followers, {} following{}",
        profile.username,
        profile.full_name,
        profile.media_count,
        profile.followers,
        profile.following,
        if profile.is_private { ", private" } else { "" }
    );
}

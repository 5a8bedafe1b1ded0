use std::path::PathBuf;
use std::time::Duration;

use crate::crawl::{CrawlOptions, OrchestratorConfig};
use crate::retry::RetryConfig;
use crate::types::LogLevel;

/// Application configuration.
pub struct Config {
    pub accounts: Vec<String>,
    pub login_username: String,
    pub password: Option<String>,
    pub data_root: PathBuf,
    pub session_dir: PathBuf,

    /// `None` runs a single cycle.
    pub interval: Option<Duration>,
    pub account_delay: Duration,
    pub max_posts: Option<usize>,
    pub retry: RetryConfig,

    pub log_level: LogLevel,
    pub fast_update: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("accounts", &self.accounts)
            .field("login_username", &self.login_username)
            .field("password", &"<redacted>")
            .field("data_root", &self.data_root)
            .field("session_dir", &self.session_dir)
            .field("interval", &self.interval)
            .field("max_posts", &self.max_posts)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl Config {
    pub fn from_cli(cli: crate::cli::Cli) -> anyhow::Result<Self> {
        let accounts: Vec<String> = cli
            .accounts
            .iter()
            .map(|a| a.trim())
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect();
        if accounts.is_empty() {
            anyhow::bail!("No accounts to crawl; set --accounts or CRAWL_ACCOUNTS");
        }

        let login_username = cli.login_username.trim().to_string();
        if login_username.is_empty() {
            anyhow::bail!("--login-username / INSTAGRAM_USERNAME must not be empty");
        }

        let max_posts = cli
            .max_posts
            .map(usize::try_from)
            .transpose()
            .map_err(|_| anyhow::anyhow!("--max-posts is too large"))?;

        Ok(Self {
            accounts,
            login_username,
            password: cli.password.filter(|p| !p.is_empty()),
            data_root: expand_tilde(&cli.data_root),
            session_dir: expand_tilde(&cli.session_dir),
            interval: cli
                .interval
                .filter(|m| *m > 0)
                .map(|m| Duration::from_secs(m.saturating_mul(60))),
            account_delay: Duration::from_secs(cli.account_delay),
            max_posts,
            retry: RetryConfig {
                attempts: cli.retry_attempts,
                backoff_secs: cli.retry_backoff,
            },
            log_level: cli.log_level,
            fast_update: cli.fast_update,
        })
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            accounts: self.accounts.clone(),
            data_root: self.data_root.clone(),
            retry: self.retry,
            crawl: CrawlOptions {
                max_posts: self.max_posts,
                fast_update: self.fast_update,
            },
            interval: self.interval,
            account_delay: self.account_delay,
        }
    }
}

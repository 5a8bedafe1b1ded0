use clap::Parser;

use crate::types::LogLevel;

#[derive(Parser, Debug)]
#[command(
    name = "fromistargram-crawler",
    about = "Archive Instagram posts and profile pictures to disk"
)]
pub struct Cli {
    /// Accounts to crawl, comma separated
    #[arg(short = 'a', long, env = "CRAWL_ACCOUNTS", value_delimiter = ',', required = true)]
    pub accounts: Vec<String>,

    /// Instagram username used to log in
    #[arg(short = 'u', long, env = "INSTAGRAM_USERNAME")]
    pub login_username: String,

    /// Instagram password, only needed when no saved session exists.
    /// WARNING: passing via --password is visible in process listings.
    /// Prefer the INSTAGRAM_PASSWORD environment variable instead.
    #[arg(short = 'p', long, env = "INSTAGRAM_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Root directory holding one folder per account
    #[arg(short = 'd', long, env = "DATA_ROOT", default_value = "/root")]
    pub data_root: String,

    /// Directory for saved login sessions
    #[arg(long, env = "SESSION_DIR", default_value = "./sessions")]
    pub session_dir: String,

    /// Minutes between crawl cycles; 0 or unset runs once
    #[arg(long, env = "CRAWL_INTERVAL_MINUTES")]
    pub interval: Option<u64>,

    /// Stop each account after archiving this many posts
    #[arg(long, env = "CRAWLER_MAX_POSTS", value_parser = clap::value_parser!(u64).range(1..))]
    pub max_posts: Option<u64>,

    /// Attempts per account, including the first
    #[arg(long, env = "CRAWLER_RETRY_ATTEMPTS", default_value_t = 3,
          value_parser = clap::value_parser!(u32).range(1..))]
    pub retry_attempts: u32,

    /// Base backoff in seconds; the wait after attempt n is n times this
    #[arg(long, env = "CRAWLER_RETRY_BACKOFF_SECONDS", default_value_t = 30)]
    pub retry_backoff: u64,

    /// Stop an account at the first post that is already archived
    #[arg(long, env = "CRAWLER_FAST_UPDATE")]
    pub fast_update: bool,

    /// Seconds to wait between accounts
    #[arg(long, env = "CRAWLER_ACCOUNT_DELAY_SECONDS", default_value_t = 0)]
    pub account_delay: u64,

    /// Log level (RUST_LOG overrides)
    #[arg(long, env = "CRAWLER_LOG_LEVEL", value_enum, default_value = "info")]
    pub log_level: LogLevel,
}

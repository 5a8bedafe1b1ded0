//! Per-account crawl loop and the orchestrator that drives it.

pub mod orchestrator;

use futures_util::StreamExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::archive::naming::caption_filename;
use crate::archive::{self, store_post, validate_storage, AccountDir, ArchiveError};
use crate::instagram::{Profile, Transport, TransportError};
use crate::retry::RetryAction;

pub use orchestrator::{Orchestrator, OrchestratorConfig};

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

impl CrawlError {
    pub fn is_transient(&self) -> bool {
        match self {
            CrawlError::Transport(e) => e.is_transient(),
            CrawlError::Archive(e) => e.is_transient(),
        }
    }

    pub fn retry_action(&self) -> RetryAction {
        if self.is_transient() {
            RetryAction::Retry
        } else {
            RetryAction::Abort
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlOptions {
    /// Stop after this many posts have been archived.
    pub max_posts: Option<usize>,
    /// Stop at the first post whose caption is already on disk.
    pub fast_update: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Limit,
    Exhausted,
    KnownPost,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlSummary {
    pub posts: usize,
    pub stop: StopReason,
    /// Names in the account directory that break the naming convention.
    pub violations: Vec<String>,
}

/// Archive the posts of `profile` newest-first into `account`.
///
/// The limit is checked before the next post is requested, so a capped crawl
/// never pages further than it needs to. Storage is validated once the loop
/// ends for any reason other than an error.
pub async fn crawl_account(
    transport: &dyn Transport,
    profile: &Profile,
    account: &AccountDir,
    options: &CrawlOptions,
    shutdown: &CancellationToken,
) -> Result<CrawlSummary, CrawlError> {
    let mut posts = transport.posts(profile);
    let mut archived = 0usize;

    let stop = loop {
        if options.max_posts.is_some_and(|max| archived >= max) {
            break StopReason::Limit;
        }
        if shutdown.is_cancelled() {
            tracing::info!("Shutdown requested, stopping crawl of {}", account.username());
            break StopReason::Cancelled;
        }
        let Some(post) = posts.next().await else {
            break StopReason::Exhausted;
        };
        let post = post?;

        if options.fast_update
            && archive::exists(&account.join(&caption_filename(&post.taken_at))).await?
        {
            tracing::info!(
                "Reached already archived post {}; stopping fast update",
                post.shortcode
            );
            break StopReason::KnownPost;
        }

        store_post(transport, account, &post).await?;
        archived += 1;
        tracing::debug!(count = archived, "Archived post {}", post.shortcode);
    };
    drop(posts);

    let violations = validate_storage(account).await?;
    tracing::info!(
        posts = archived,
        "Finished crawl of {} ({:?})",
        account.username(),
        stop
    );

    Ok(CrawlSummary {
        posts: archived,
        stop,
        violations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instagram::testing::{image_post, FakeTransport};

    /// `count` single-image posts, newest first, one hour apart.
    fn transport_with_posts(count: i64) -> FakeTransport {
        let base = 1_700_000_000;
        let mut transport = FakeTransport::new("someone");
        let mut posts = Vec::new();
        for i in 0..count {
            let secs = base - i * 3600;
            let url = format!("https://cdn/{}.jpg", secs);
            transport = transport.with_blob(&url, secs.to_string().as_bytes());
            posts.push(image_post(secs, "", &[url.as_str()]));
        }
        transport.with_posts(posts)
    }

    fn file_count(account: &AccountDir) -> usize {
        std::fs::read_dir(account.path()).unwrap().count()
    }

    #[tokio::test]
    async fn test_max_posts_stops_without_draining() {
        let root = tempfile::tempdir().unwrap();
        let account = AccountDir::ensure(root.path(), "someone").await.unwrap();
        let transport = transport_with_posts(10);
        let options = CrawlOptions {
            max_posts: Some(3),
            fast_update: false,
        };

        let summary = crawl_account(
            &transport,
            &transport.profile,
            &account,
            &options,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(summary.posts, 3);
        assert_eq!(summary.stop, StopReason::Limit);
        assert_eq!(transport.pulled(), 3);
        // caption + one image per post
        assert_eq!(file_count(&account), 6);
    }

    #[tokio::test]
    async fn test_zero_max_posts_archives_nothing() {
        let root = tempfile::tempdir().unwrap();
        let account = AccountDir::ensure(root.path(), "someone").await.unwrap();
        let transport = transport_with_posts(2);
        let options = CrawlOptions {
            max_posts: Some(0),
            fast_update: false,
        };

        let summary = crawl_account(
            &transport,
            &transport.profile,
            &account,
            &options,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(summary.posts, 0);
        assert_eq!(transport.pulled(), 0);
        assert_eq!(file_count(&account), 0);
    }

    #[tokio::test]
    async fn test_unbounded_crawl_exhausts_stream() {
        let root = tempfile::tempdir().unwrap();
        let account = AccountDir::ensure(root.path(), "someone").await.unwrap();
        let transport = transport_with_posts(4);

        let summary = crawl_account(
            &transport,
            &transport.profile,
            &account,
            &CrawlOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(summary.posts, 4);
        assert_eq!(summary.stop, StopReason::Exhausted);
        assert!(summary.violations.is_empty());
    }

    #[tokio::test]
    async fn test_recrawl_without_fast_update_revisits_everything() {
        let root = tempfile::tempdir().unwrap();
        let account = AccountDir::ensure(root.path(), "someone").await.unwrap();
        let transport = transport_with_posts(4);
        let token = CancellationToken::new();

        crawl_account(&transport, &transport.profile, &account, &CrawlOptions::default(), &token)
            .await
            .unwrap();
        let summary = crawl_account(
            &transport,
            &transport.profile,
            &account,
            &CrawlOptions::default(),
            &token,
        )
        .await
        .unwrap();

        assert_eq!(summary.posts, 4);
        assert_eq!(transport.pulled(), 8);
        // Nothing fetched twice
        assert_eq!(transport.fetch_count(), 4);
    }

    #[tokio::test]
    async fn test_fast_update_stops_at_known_post() {
        let root = tempfile::tempdir().unwrap();
        let account = AccountDir::ensure(root.path(), "someone").await.unwrap();
        let transport = transport_with_posts(5);
        // The third-newest post is already archived.
        std::fs::write(account.join("2023-11-14_20-13-20_UTC.txt"), "").unwrap();
        let options = CrawlOptions {
            max_posts: None,
            fast_update: true,
        };

        let summary = crawl_account(
            &transport,
            &transport.profile,
            &account,
            &options,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(summary.posts, 2);
        assert_eq!(summary.stop, StopReason::KnownPost);
        assert_eq!(transport.pulled(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_post() {
        let root = tempfile::tempdir().unwrap();
        let account = AccountDir::ensure(root.path(), "someone").await.unwrap();
        let transport = transport_with_posts(3);
        let token = CancellationToken::new();
        token.cancel();

        let summary = crawl_account(
            &transport,
            &transport.profile,
            &account,
            &CrawlOptions::default(),
            &token,
        )
        .await
        .unwrap();

        assert_eq!(summary.posts, 0);
        assert_eq!(summary.stop, StopReason::Cancelled);
    }

    #[tokio::test]
    async fn test_violations_reported() {
        let root = tempfile::tempdir().unwrap();
        let account = AccountDir::ensure(root.path(), "someone").await.unwrap();
        std::fs::write(account.join("stray.png"), b"x").unwrap();
        let transport = transport_with_posts(1);

        let summary = crawl_account(
            &transport,
            &transport.profile,
            &account,
            &CrawlOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(summary.violations, vec!["stray.png".to_string()]);
    }

    #[tokio::test]
    async fn test_media_failure_is_error() {
        let root = tempfile::tempdir().unwrap();
        let account = AccountDir::ensure(root.path(), "someone").await.unwrap();
        let transport = FakeTransport::new("someone")
            .with_posts(vec![image_post(1_700_000_000, "", &["https://cdn/gone.jpg"])]);

        let err = crawl_account(
            &transport,
            &transport.profile,
            &account,
            &CrawlOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        // A 404 from the CDN is not retried.
        assert!(!err.is_transient());
    }
}

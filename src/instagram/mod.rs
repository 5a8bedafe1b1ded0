//! Transport capability for the remote platform.
//!
//! The crawl engine only sees the [`Transport`] trait: resolve a profile, pull
//! its posts newest-first, fetch raw bytes for a URL. [`client::InstagramClient`]
//! is the production implementation on top of a persisted [`session::Session`].

pub mod client;
pub mod error;
pub mod parse;
pub mod session;
#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;

pub use client::InstagramClient;
pub use error::TransportError;
pub use session::Session;

/// Lazily pulled, newest-first stream of posts. Dropping it stops paging.
pub type PostStream<'a> = BoxStream<'a, Result<Post, TransportError>>;

/// Identity and counters of a resolved account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub media_count: u64,
    pub followers: u64,
    pub following: u64,
    pub is_private: bool,
    pub profile_pic_url: Option<String>,
}

/// A single media item of a post, resolved at the transport boundary.
///
/// The URL is `None` when the platform returned the node without a usable
/// source; archivers skip such items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaItem {
    Image { url: Option<String> },
    Video { url: Option<String> },
}

impl MediaItem {
    pub fn is_video(&self) -> bool {
        matches!(self, MediaItem::Video { .. })
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            MediaItem::Image { url } | MediaItem::Video { url } => url.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub shortcode: String,
    /// Second resolution, UTC.
    pub taken_at: DateTime<Utc>,
    pub caption: String,
    pub hashtags: Vec<String>,
    /// Single-media posts carry exactly one item; carousels keep the
    /// platform's order.
    pub media: Vec<MediaItem>,
}

/// Remote operations the crawler depends on.
///
/// One instance is created at startup and shared by reference across every
/// account and cycle.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Resolve a username to its profile.
    async fn profile(&self, username: &str) -> Result<Profile, TransportError>;

    /// Newest-first stream of the profile's posts.
    fn posts<'a>(&'a self, profile: &'a Profile) -> PostStream<'a>;

    /// Fetch the raw bytes behind a media URL.
    async fn fetch_raw(&self, url: &str) -> Result<Vec<u8>, TransportError>;
}

//! Scriptable in-memory [`Transport`] for tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures_util::stream::{self, StreamExt};

use super::{MediaItem, Post, PostStream, Profile, Transport, TransportError};

pub(crate) struct FakeTransport {
    pub profile: Profile,
    pub posts: Vec<Post>,
    pub blobs: HashMap<String, Vec<u8>>,
    /// URLs whose fetch always fails with a transient error.
    pub rate_limited: HashSet<String>,
    /// Number of upcoming `profile()` calls that fail with a transient error.
    pub transient_failures: AtomicU32,
    /// When set, `profile()` fails with `ProfileNotFound`.
    pub missing: bool,
    pub profile_calls: AtomicU32,
    /// Posts handed out by `posts()` streams so far.
    pub pulled: AtomicUsize,
    pub fetched: Mutex<Vec<String>>,
}

impl FakeTransport {
    pub fn new(username: &str) -> Self {
        Self {
            profile: profile(username),
            posts: Vec::new(),
            blobs: HashMap::new(),
            rate_limited: HashSet::new(),
            transient_failures: AtomicU32::new(0),
            missing: false,
            profile_calls: AtomicU32::new(0),
            pulled: AtomicUsize::new(0),
            fetched: Mutex::new(Vec::new()),
        }
    }

    pub fn with_posts(mut self, posts: Vec<Post>) -> Self {
        self.posts = posts;
        self
    }

    pub fn with_blob(mut self, url: &str, bytes: &[u8]) -> Self {
        self.blobs.insert(url.to_string(), bytes.to_vec());
        self
    }

    pub fn with_rate_limited(mut self, url: &str) -> Self {
        self.rate_limited.insert(url.to_string());
        self
    }

    pub fn failing_times(self, n: u32) -> Self {
        self.transient_failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn pulled(&self) -> usize {
        self.pulled.load(Ordering::SeqCst)
    }

    pub fn fetch_count(&self) -> usize {
        self.fetched.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn profile(&self, username: &str) -> Result<Profile, TransportError> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        if self.missing {
            return Err(TransportError::ProfileNotFound(username.to_string()));
        }
        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(TransportError::RateLimited {
                url: format!("fake://{}", username),
            });
        }
        let mut profile = self.profile.clone();
        profile.username = username.to_string();
        Ok(profile)
    }

    fn posts<'a>(&'a self, _profile: &'a Profile) -> PostStream<'a> {
        stream::iter(self.posts.iter().cloned())
            .inspect(|_| {
                self.pulled.fetch_add(1, Ordering::SeqCst);
            })
            .map(Ok::<Post, TransportError>)
            .boxed()
    }

    async fn fetch_raw(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        self.fetched.lock().unwrap().push(url.to_string());
        if self.rate_limited.contains(url) {
            return Err(TransportError::RateLimited {
                url: url.to_string(),
            });
        }
        self.blobs
            .get(url)
            .cloned()
            .ok_or_else(|| TransportError::HttpStatus {
                status: 404,
                url: url.to_string(),
            })
    }
}

pub(crate) fn profile(username: &str) -> Profile {
    Profile {
        id: "1".to_string(),
        username: username.to_string(),
        full_name: username.to_uppercase(),
        media_count: 0,
        followers: 0,
        following: 0,
        is_private: false,
        profile_pic_url: Some(format!("https://cdn.test/{}/pic.jpg", username)),
    }
}

/// A post taken at `secs` past the epoch, with one image per URL.
pub(crate) fn image_post(secs: i64, caption: &str, urls: &[&str]) -> Post {
    Post {
        shortcode: format!("C{}", secs),
        taken_at: Utc.timestamp_opt(secs, 0).unwrap(),
        caption: caption.to_string(),
        hashtags: super::parse::extract_hashtags(caption),
        media: urls
            .iter()
            .map(|u| MediaItem::Image {
                url: Some(u.to_string()),
            })
            .collect(),
    }
}

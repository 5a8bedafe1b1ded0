use async_trait::async_trait;
use futures_util::stream::{self, StreamExt, TryStreamExt};
use reqwest::Response;
use serde_json::Value;

use super::error::TransportError;
use super::parse::{parse_feed_item, parse_profile};
use super::session::{Session, BASE_URL};
use super::{Post, PostStream, Profile, Transport};

/// Posts requested per feed page.
const DEFAULT_PAGE_SIZE: u32 = 12;

/// Where the next feed page starts.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Cursor {
    Start,
    After(String),
    Done,
}

/// One page of the user feed.
struct FeedPage {
    posts: Vec<Post>,
    next: Cursor,
}

/// [`Transport`] over the platform's web API, authenticated by a persisted
/// [`Session`].
pub struct InstagramClient {
    session: Session,
    page_size: u32,
}

impl InstagramClient {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    async fn get_json(&self, url: &str) -> Result<Value, TransportError> {
        let mut request = self.session.client().get(url);
        if let Some(csrf) = self.session.csrf_token() {
            request = request.header("X-CSRFToken", csrf);
        }
        let response = request.send().await.map_err(|source| TransportError::Http {
            url: url.to_string(),
            source,
        })?;
        let response = check_status(url, response).await?;
        response.json().await.map_err(|e| TransportError::Parse {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    async fn feed_page(&self, user_id: &str, cursor: &Cursor) -> Result<FeedPage, TransportError> {
        let mut url = format!(
            "{}/api/v1/feed/user/{}/?count={}",
            BASE_URL, user_id, self.page_size
        );
        if let Cursor::After(max_id) = cursor {
            url.push_str("&max_id=");
            url.push_str(max_id);
        }
        tracing::debug!("GET {}", url);
        let body = self.get_json(&url).await?;

        let items = body["items"].as_array().ok_or_else(|| TransportError::Parse {
            url: url.clone(),
            reason: "missing items array".to_string(),
        })?;
        let posts: Vec<Post> = items.iter().filter_map(parse_feed_item).collect();

        let next = next_cursor(
            cursor,
            body["more_available"].as_bool().unwrap_or(false),
            body["next_max_id"].as_str(),
        );
        Ok(FeedPage { posts, next })
    }
}

/// Cursor for the page after the one requested with `current`.
///
/// A page that hands back the cursor it was requested with ends the feed;
/// following it would request the same page forever.
fn next_cursor(current: &Cursor, more_available: bool, next_max_id: Option<&str>) -> Cursor {
    match (more_available, next_max_id) {
        (true, Some(max_id)) if *current == Cursor::After(max_id.to_string()) => {
            tracing::warn!("Feed returned cursor {} again; stopping pagination", max_id);
            Cursor::Done
        }
        (true, Some(max_id)) => Cursor::After(max_id.to_string()),
        _ => Cursor::Done,
    }
}

/// Map non-success responses onto the transport error taxonomy.
async fn check_status(url: &str, response: Response) -> Result<Response, TransportError> {
    let status = response.status().as_u16();
    if response.status().is_success() {
        return Ok(response);
    }
    match status {
        429 => Err(TransportError::RateLimited {
            url: url.to_string(),
        }),
        401 | 403 => {
            let body = response.text().await.unwrap_or_default();
            if body.contains("checkpoint_required") || body.contains("challenge_required") {
                Err(TransportError::Checkpoint(url.to_string()))
            } else {
                Err(TransportError::LoginRequired(format!(
                    "HTTP {} requesting {}",
                    status, url
                )))
            }
        }
        _ => Err(TransportError::HttpStatus {
            status,
            url: url.to_string(),
        }),
    }
}

#[async_trait]
impl Transport for InstagramClient {
    async fn profile(&self, username: &str) -> Result<Profile, TransportError> {
        let url = format!(
            "{}/api/v1/users/web_profile_info/?username={}",
            BASE_URL, username
        );
        let body = match self.get_json(&url).await {
            Err(TransportError::HttpStatus { status: 404, .. }) => {
                return Err(TransportError::ProfileNotFound(username.to_string()))
            }
            other => other?,
        };
        let user = &body["data"]["user"];
        if user.is_null() {
            return Err(TransportError::ProfileNotFound(username.to_string()));
        }
        parse_profile(user).ok_or_else(|| TransportError::Parse {
            url,
            reason: "profile without id or username".to_string(),
        })
    }

    fn posts<'a>(&'a self, profile: &'a Profile) -> PostStream<'a> {
        stream::try_unfold(Cursor::Start, move |cursor| async move {
            if cursor == Cursor::Done {
                return Ok::<_, TransportError>(None);
            }
            let page = self.feed_page(&profile.id, &cursor).await?;
            Ok::<_, TransportError>(Some((page.posts, page.next)))
        })
        .map_ok(|posts| stream::iter(posts.into_iter().map(Ok::<Post, TransportError>)))
        .try_flatten()
        .boxed()
    }

    async fn fetch_raw(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        let response = self
            .session
            .client()
            .get(url)
            .send()
            .await
            .map_err(|source| TransportError::Http {
                url: url.to_string(),
                source,
            })?;
        let response = check_status(url, response).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|source| TransportError::Http {
                url: url.to_string(),
                source,
            })?;
        Ok(bytes.to_vec())
    }
}

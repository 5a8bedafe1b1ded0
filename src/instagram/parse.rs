use std::sync::LazyLock;

use chrono::{TimeZone, Utc};
use regex::Regex;
use serde_json::Value;
use tracing::warn;

use super::{MediaItem, Post, Profile};

/// `media_type` values used by the feed API.
const MEDIA_TYPE_VIDEO: u64 = 2;

static HASHTAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#(\w+)").expect("valid hashtag regex"));

/// Hashtags in order of appearance, lowercased, without the `#`.
pub fn extract_hashtags(caption: &str) -> Vec<String> {
    HASHTAG_RE
        .captures_iter(caption)
        .map(|c| c[1].to_lowercase())
        .collect()
}

/// Build a [`Profile`] from the `data.user` object of a profile info response.
pub fn parse_profile(user: &Value) -> Option<Profile> {
    let id = user["id"].as_str()?.to_string();
    let username = user["username"].as_str()?.to_string();
    let profile_pic_url = user["profile_pic_url_hd"]
        .as_str()
        .or_else(|| user["profile_pic_url"].as_str())
        .map(str::to_string);

    Some(Profile {
        id,
        username,
        full_name: user["full_name"].as_str().unwrap_or_default().to_string(),
        media_count: user["edge_owner_to_timeline_media"]["count"]
            .as_u64()
            .unwrap_or(0),
        followers: user["edge_followed_by"]["count"].as_u64().unwrap_or(0),
        following: user["edge_follow"]["count"].as_u64().unwrap_or(0),
        is_private: user["is_private"].as_bool().unwrap_or(false),
        profile_pic_url,
    })
}

/// Build a [`Post`] from one entry of a feed page's `items` array.
///
/// Returns `None` for entries without a timestamp or shortcode, since no
/// canonical filename can be derived for them.
pub fn parse_feed_item(item: &Value) -> Option<Post> {
    let Some(shortcode) = item["code"].as_str().map(str::to_string) else {
        warn!(id = %item["id"], "Feed item without a shortcode, skipping");
        return None;
    };
    let taken_at = match item["taken_at"]
        .as_i64()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    {
        Some(ts) => ts,
        None => {
            warn!(shortcode = %shortcode, "Feed item without a valid taken_at, skipping");
            return None;
        }
    };
    let caption = item["caption"]["text"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    let hashtags = extract_hashtags(&caption);

    let media = match item["carousel_media"].as_array() {
        Some(nodes) if !nodes.is_empty() => nodes.iter().map(parse_media_node).collect(),
        _ => vec![parse_media_node(item)],
    };

    Some(Post {
        shortcode,
        taken_at,
        caption,
        hashtags,
        media,
    })
}

/// Resolve a media node into its variant, picking the first (largest)
/// candidate URL the platform lists.
pub fn parse_media_node(node: &Value) -> MediaItem {
    if node["media_type"].as_u64() == Some(MEDIA_TYPE_VIDEO) {
        MediaItem::Video {
            url: node["video_versions"][0]["url"].as_str().map(str::to_string),
        }
    } else {
        MediaItem::Image {
            url: node["image_versions2"]["candidates"][0]["url"]
                .as_str()
                .map(str::to_string),
        }
    }
}

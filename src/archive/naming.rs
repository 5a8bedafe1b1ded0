//! Canonical on-disk names for archived artifacts.
//!
//! Every name is derived from a UTC timestamp formatted `YYYY-MM-DD_HH-MM-SS`:
//!
//! - caption: `<ts>_UTC.txt`
//! - media: `<ts>_UTC_<n>.jpg` / `<ts>_UTC_<n>.mp4`, `n` 1-based
//! - profile picture: `<ts>_UTC_profile_pic.jpg`
//!
//! plus the per-account hash ledger `.profile_pic_hashes.json`.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";
pub const LEDGER_FILENAME: &str = ".profile_pic_hashes.json";

const PROFILE_PIC_SUFFIX: &str = "_profile_pic.jpg";

static CAPTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}_\d{2}-\d{2}-\d{2}_UTC\.txt$").expect("valid caption regex")
});

// The index is optional here: older archives hold unindexed single-media files.
static MEDIA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}_\d{2}-\d{2}-\d{2}_UTC(?:_\d+)?\.(?:jpg|mp4)$")
        .expect("valid media regex")
});

static PROFILE_PIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}_\d{2}-\d{2}-\d{2}_UTC_profile_pic\.jpg$")
        .expect("valid profile picture regex")
});

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn caption_filename(ts: &DateTime<Utc>) -> String {
    format!("{}_UTC.txt", format_timestamp(ts))
}

/// `index` is the 1-based position of the item within its post.
pub fn media_filename(ts: &DateTime<Utc>, index: usize, is_video: bool) -> String {
    let ext = if is_video { "mp4" } else { "jpg" };
    format!("{}_UTC_{}.{}", format_timestamp(ts), index, ext)
}

pub fn profile_pic_filename(ts: &DateTime<Utc>) -> String {
    format!("{}_UTC{}", format_timestamp(ts), PROFILE_PIC_SUFFIX)
}

/// Apparent category of a directory entry, judged by suffix alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileCategory {
    Ledger,
    Caption,
    ProfilePicture,
    Media,
    Unknown,
}

pub fn categorize(name: &str) -> FileCategory {
    if name == LEDGER_FILENAME {
        FileCategory::Ledger
    } else if name.ends_with(".txt") {
        FileCategory::Caption
    } else if name.ends_with(PROFILE_PIC_SUFFIX) {
        FileCategory::ProfilePicture
    } else if name.ends_with(".jpg") || name.ends_with(".mp4") {
        FileCategory::Media
    } else {
        FileCategory::Unknown
    }
}

/// Whether a regular file named `name` satisfies the convention for its
/// apparent category.
pub fn is_canonical_file(name: &str) -> bool {
    match categorize(name) {
        FileCategory::Ledger => true,
        FileCategory::Caption => CAPTION_RE.is_match(name),
        FileCategory::ProfilePicture => PROFILE_PIC_RE.is_match(name),
        FileCategory::Media => MEDIA_RE.is_match(name),
        FileCategory::Unknown => false,
    }
}

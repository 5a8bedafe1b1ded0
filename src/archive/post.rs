use crate::instagram::{Post, Transport};

use super::error::ArchiveError;
use super::naming::{caption_filename, media_filename};
use super::{exists, write_atomic, AccountDir};

/// Caption file contents: the trimmed caption, then a blank line and the
/// space-joined `#tag` list when the post has hashtags.
pub fn caption_document(post: &Post) -> String {
    let document = post.caption.trim();
    let hashtags = post
        .hashtags
        .iter()
        .map(|tag| format!("#{}", tag))
        .collect::<Vec<_>>()
        .join(" ");

    match (document.is_empty(), hashtags.is_empty()) {
        (_, true) => document.to_string(),
        (true, false) => hashtags,
        (false, false) => format!("{}\n\n{}", document, hashtags),
    }
}

/// Persist the caption and every media item of `post` that is not on disk yet.
///
/// Presence of the canonical file is the idempotence key; existing files are
/// never rewritten, so calling this twice for the same post is a no-op the
/// second time. Media without a resolvable URL are skipped with a warning.
pub async fn store_post(
    transport: &dyn Transport,
    account: &AccountDir,
    post: &Post,
) -> Result<(), ArchiveError> {
    let caption_path = account.join(&caption_filename(&post.taken_at));
    if !exists(&caption_path).await? {
        write_atomic(&caption_path, caption_document(post).as_bytes()).await?;
        tracing::debug!("Saved caption for {}", post.shortcode);
    }

    for (index, item) in post.media.iter().enumerate() {
        let path = account.join(&media_filename(&post.taken_at, index + 1, item.is_video()));
        if exists(&path).await? {
            tracing::debug!("Media {} already exists; skipping", path.display());
            continue;
        }
        let Some(url) = item.url() else {
            tracing::warn!(
                "Skipping media {} without resolvable URL for {}",
                index + 1,
                post.shortcode
            );
            continue;
        };
        tracing::debug!("Downloading media from {} to {}", url, path.display());
        let bytes = transport.fetch_raw(url).await?;
        write_atomic(&path, &bytes).await?;
    }

    Ok(())
}

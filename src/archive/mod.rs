//! On-disk archive: one directory per account under the data root, holding
//! captions, media, profile pictures and the profile picture hash ledger.

pub mod error;
pub mod ledger;
pub mod naming;
pub mod post;
pub mod validate;

use std::path::{Path, PathBuf};

use tokio::fs;

pub use error::ArchiveError;
pub use ledger::{archive_profile_picture, HashLedger, ProfilePicOutcome};
pub use post::store_post;
pub use validate::validate_storage;

/// The archive directory owned by one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountDir {
    username: String,
    path: PathBuf,
}

impl AccountDir {
    /// Create `<data_root>/<username>` if needed.
    pub async fn ensure(data_root: &Path, username: &str) -> Result<Self, ArchiveError> {
        let path = data_root.join(username);
        fs::create_dir_all(&path)
            .await
            .map_err(|e| ArchiveError::io(&path, e))?;
        Ok(Self {
            username: username.to_string(),
            path,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join(&self, filename: &str) -> PathBuf {
        self.path.join(filename)
    }
}

pub(crate) async fn exists(path: &Path) -> Result<bool, ArchiveError> {
    fs::try_exists(path)
        .await
        .map_err(|e| ArchiveError::io(path, e))
}

/// Write `contents` to a `.part` sibling, then rename it over `path`, so an
/// interrupted write never leaves a truncated file under a canonical name.
pub(crate) async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), ArchiveError> {
    let file_name = path
        .file_name()
        .and_then(|f| f.to_str())
        .unwrap_or("download");
    let part_path = path.with_file_name(format!("{}.part", file_name));
    fs::write(&part_path, contents)
        .await
        .map_err(|e| ArchiveError::io(&part_path, e))?;
    fs::rename(&part_path, path)
        .await
        .map_err(|e| ArchiveError::io(path, e))
}

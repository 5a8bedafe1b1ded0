//! Profile picture deduplication.
//!
//! Each account keeps a JSON sidecar mapping the timestamp a picture was
//! archived at to the SHA-256 of its bytes. A fetched picture is only written
//! when its hash is not already among the ledger's values.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;

use super::error::ArchiveError;
use super::naming::{format_timestamp, profile_pic_filename, LEDGER_FILENAME};
use super::{write_atomic, AccountDir};

/// Append-only `timestamp → hash` map. Keys are kept sorted so the pretty
/// printed file diffs cleanly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HashLedger {
    entries: BTreeMap<String, String>,
}

impl HashLedger {
    pub fn path(account: &AccountDir) -> PathBuf {
        account.join(LEDGER_FILENAME)
    }

    /// Load the ledger of `account`.
    ///
    /// A missing file is an empty ledger. So is a corrupt one, after a
    /// warning: losing dedup history only costs a duplicate picture, while
    /// failing would skip the whole account.
    pub async fn load(account: &AccountDir) -> Result<Self, ArchiveError> {
        let path = Self::path(account);
        let contents = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ArchiveError::io(&path, e)),
        };
        match serde_json::from_str(&contents) {
            Ok(ledger) => Ok(ledger),
            Err(e) => {
                tracing::warn!(
                    "Profile hash ledger corrupted at {} ({}); resetting",
                    path.display(),
                    e
                );
                Ok(Self::default())
            }
        }
    }

    /// Replace the sidecar file in one rename.
    pub async fn save(&self, account: &AccountDir) -> Result<(), ArchiveError> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(&Self::path(account), json.as_bytes()).await
    }

    pub fn contains_hash(&self, hash: &str) -> bool {
        self.entries.values().any(|h| h == hash)
    }

    pub fn insert(&mut self, timestamp: String, hash: String) {
        self.entries.insert(timestamp, hash);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    let hash = Sha256::digest(bytes);
    hash.iter().map(|b| format!("{:02x}", b)).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfilePicOutcome {
    Unchanged,
    Archived { path: PathBuf },
}

/// Archive `picture` for `account` unless an identical picture already is.
///
/// `now` names the new file and ledger key. Two pictures archived within the
/// same second share a name; the later one overwrites the earlier.
pub async fn archive_profile_picture(
    account: &AccountDir,
    picture: &[u8],
    ledger: &mut HashLedger,
    now: DateTime<Utc>,
) -> Result<ProfilePicOutcome, ArchiveError> {
    let digest = content_hash(picture);
    if ledger.contains_hash(&digest) {
        tracing::debug!(
            "Profile picture for {} unchanged; skipping archival",
            account.username()
        );
        return Ok(ProfilePicOutcome::Unchanged);
    }

    tracing::info!("Archiving new profile picture for {}", account.username());
    let path = account.join(&profile_pic_filename(&now));
    write_atomic(&path, picture).await?;
    ledger.insert(format_timestamp(&now), digest);
    ledger.save(account).await?;
    Ok(ProfilePicOutcome::Archived { path })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::path::Path;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    async fn account(root: &Path) -> AccountDir {
        AccountDir::ensure(root, "someone").await.unwrap()
    }

    fn profile_pics(account: &AccountDir) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(account.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with("_profile_pic.jpg"))
            .collect();
        names.sort();
        names
    }

    /// Digests of the picture files the ledger names, read back from disk.
    async fn hashes_on_disk(account: &AccountDir) -> Vec<String> {
        let ledger = HashLedger::load(account).await.unwrap();
        ledger
            .iter()
            .map(|(timestamp, _)| {
                let path = account.join(&format!("{}_UTC_profile_pic.jpg", timestamp));
                content_hash(&std::fs::read(path).unwrap())
            })
            .collect()
    }

    #[test]
    fn test_content_hash_hex() {
        assert_eq!(
            content_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_missing_ledger_is_empty() {
        let root = tempfile::tempdir().unwrap();
        let account = account(root.path()).await;
        assert!(HashLedger::load(&account).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_ledger_is_empty() {
        let root = tempfile::tempdir().unwrap();
        let account = account(root.path()).await;
        std::fs::write(HashLedger::path(&account), "{ not json").unwrap();
        assert!(HashLedger::load(&account).await.unwrap().is_empty());

        std::fs::write(HashLedger::path(&account), r#"{"2024": 5}"#).unwrap();
        assert!(HashLedger::load(&account).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load_round_trip() {
        let root = tempfile::tempdir().unwrap();
        let account = account(root.path()).await;
        let mut ledger = HashLedger::default();
        ledger.insert("2024-01-02_03-04-05".into(), "bb".into());
        ledger.insert("2023-01-02_03-04-05".into(), "aa".into());
        ledger.save(&account).await.unwrap();

        assert_eq!(HashLedger::load(&account).await.unwrap(), ledger);
    }

    #[tokio::test]
    async fn test_saved_ledger_is_sorted_and_indented() {
        let root = tempfile::tempdir().unwrap();
        let account = account(root.path()).await;
        let mut ledger = HashLedger::default();
        ledger.insert("2024-01-02_03-04-05".into(), "bb".into());
        ledger.insert("2023-01-02_03-04-05".into(), "aa".into());
        ledger.save(&account).await.unwrap();

        let text = std::fs::read_to_string(HashLedger::path(&account)).unwrap();
        assert_eq!(
            text,
            "{\n  \"2023-01-02_03-04-05\": \"aa\",\n  \"2024-01-02_03-04-05\": \"bb\"\n}"
        );
    }

    #[tokio::test]
    async fn test_identical_picture_archived_once() {
        let root = tempfile::tempdir().unwrap();
        let account = account(root.path()).await;
        let mut ledger = HashLedger::load(&account).await.unwrap();

        let first = archive_profile_picture(&account, b"pic-v1", &mut ledger, at(1_000))
            .await
            .unwrap();
        assert!(matches!(first, ProfilePicOutcome::Archived { .. }));

        let mut ledger = HashLedger::load(&account).await.unwrap();
        let second = archive_profile_picture(&account, b"pic-v1", &mut ledger, at(2_000))
            .await
            .unwrap();
        assert_eq!(second, ProfilePicOutcome::Unchanged);

        assert_eq!(profile_pics(&account).len(), 1);
        assert_eq!(HashLedger::load(&account).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_changed_picture_appends() {
        let root = tempfile::tempdir().unwrap();
        let account = account(root.path()).await;
        let mut ledger = HashLedger::default();

        archive_profile_picture(&account, b"pic-v1", &mut ledger, at(1_000))
            .await
            .unwrap();
        archive_profile_picture(&account, b"pic-v2", &mut ledger, at(2_000))
            .await
            .unwrap();
        // Reverting to an old picture is not new content.
        let outcome = archive_profile_picture(&account, b"pic-v1", &mut ledger, at(3_000))
            .await
            .unwrap();
        assert_eq!(outcome, ProfilePicOutcome::Unchanged);

        assert_eq!(
            profile_pics(&account),
            vec![
                "1970-01-01_00-16-40_UTC_profile_pic.jpg",
                "1970-01-01_00-33-20_UTC_profile_pic.jpg",
            ]
        );

        let mut on_disk = hashes_on_disk(&account).await;
        on_disk.sort();
        let mut in_ledger: Vec<String> = HashLedger::load(&account)
            .await
            .unwrap()
            .iter()
            .map(|(_, h)| h.to_string())
            .collect();
        in_ledger.sort();
        assert_eq!(on_disk, in_ledger);
    }
}

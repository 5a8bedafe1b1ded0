use tokio::fs;

use super::error::ArchiveError;
use super::naming::is_canonical_file;
use super::AccountDir;

/// List entries of the account directory that break the naming convention.
///
/// Subdirectories, unknown suffixes and malformed names are reported with a
/// warning and returned sorted. Nothing is renamed or deleted: historic files
/// may be ambiguous, and fixing them is left to a human.
pub async fn validate_storage(account: &AccountDir) -> Result<Vec<String>, ArchiveError> {
    let dir = account.path();
    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|e| ArchiveError::io(dir, e))?;

    let mut invalid = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ArchiveError::io(dir, e))?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| ArchiveError::io(&entry.path(), e))?;
        if file_type.is_dir() || !is_canonical_file(&name) {
            invalid.push(name);
        }
    }
    invalid.sort();

    if !invalid.is_empty() {
        tracing::warn!(
            count = invalid.len(),
            "Detected files violating naming convention in {}: {}",
            dir.display(),
            invalid.join(", ")
        );
    }
    Ok(invalid)
}

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::instagram::TransportError;

/// Errors raised while writing the archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Filesystem error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Failed to encode hash ledger: {0}")]
    Json(#[from] serde_json::Error),
}

impl ArchiveError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        ArchiveError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Only remote failures are worth retrying; a full disk stays full.
    pub fn is_transient(&self) -> bool {
        match self {
            ArchiveError::Transport(e) => e.is_transient(),
            ArchiveError::Io { .. } => false,
            ArchiveError::Json(_) => false,
        }
    }
}

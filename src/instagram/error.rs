use thiserror::Error;

/// Errors surfaced by the remote transport.
///
/// `is_transient()` splits them into failures worth another attempt (network,
/// rate limiting, a session that needs a moment) and fatal ones (bad
/// credentials, a profile that does not exist, a checkpoint that needs a
/// human) so the orchestrator can stop early.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error requesting {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("HTTP error {status} requesting {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Rate limited requesting {url}")]
    RateLimited { url: String },

    #[error("Login required: {0}")]
    LoginRequired(String),

    #[error("Login failed: {0}")]
    BadCredentials(String),

    #[error("Checkpoint required, confirm the login in a browser: {0}")]
    Checkpoint(String),

    #[error("Profile {0} does not exist")]
    ProfileNotFound(String),

    #[error("Unexpected response from {url}: {reason}")]
    Parse { url: String, reason: String },
}

impl TransportError {
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Http { .. } => true,
            TransportError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            TransportError::RateLimited { .. } => true,
            TransportError::LoginRequired(_) => true,
            // HTML error pages served instead of JSON are usually soft blocks.
            TransportError::Parse { .. } => true,
            TransportError::BadCredentials(_) => false,
            TransportError::Checkpoint(_) => false,
            TransportError::ProfileNotFound(_) => false,
        }
    }
}

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use fs4::fs_std::FileExt;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, HeaderValue, REFERER, SET_COOKIE, USER_AGENT};
use reqwest::{Client, Response};
use serde_json::Value;
use tokio::fs;

use super::error::TransportError;

pub(crate) const BASE_URL: &str = "https://www.instagram.com";

/// Public web app id; the API rejects requests without it.
const APP_ID: &str = "936619743392459";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36";

/// Keep only username characters so the name is safe as a filename.
pub fn sanitize_username(username: &str) -> String {
    username
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '.')
        .collect()
}

/// Check if a Set-Cookie header string represents an expired cookie.
fn is_cookie_expired(cookie_str: &str, now: &chrono::DateTime<chrono::Utc>) -> bool {
    if let Ok(parsed) = cookie::Cookie::parse(cookie_str) {
        if let Some(expires) = parsed.expires_datetime() {
            let expires_utc =
                chrono::DateTime::<chrono::Utc>::from(std::time::SystemTime::from(expires));
            return expires_utc < *now;
        }
    }
    false
}

fn cookie_name(cookie_str: &str) -> Option<String> {
    cookie::Cookie::parse(cookie_str)
        .ok()
        .map(|c| c.name().to_string())
}

/// A single persisted cookie entry (URL + Set-Cookie header value).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
struct CookieEntry {
    url: String,
    cookie: String,
}

/// Insert or replace the entry carrying the same cookie name.
fn upsert_cookie(entries: &mut Vec<CookieEntry>, url: &str, cookie_str: &str) {
    let name = cookie_name(cookie_str);
    entries.retain(|e| name.is_none() || cookie_name(&e.cookie) != name);
    entries.push(CookieEntry {
        url: url.to_string(),
        cookie: cookie_str.to_string(),
    });
}

fn record_set_cookies(response: &Response, entries: &mut Vec<CookieEntry>) {
    for value in response.headers().get_all(SET_COOKIE) {
        if let Ok(cookie_str) = value.to_str() {
            upsert_cookie(entries, BASE_URL, cookie_str);
        }
    }
}

/// Read persisted cookies. Missing or unreadable files yield `None`.
async fn read_cookie_entries(path: &Path) -> Option<Vec<CookieEntry>> {
    let contents = match fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!("Failed to read session file {}: {}", path.display(), e);
            return None;
        }
    };
    match serde_json::from_str::<Vec<CookieEntry>>(&contents) {
        Ok(entries) => Some(entries),
        Err(e) => {
            tracing::warn!("Session file {} is corrupt ({}), ignoring it", path.display(), e);
            None
        }
    }
}

async fn write_cookie_entries(path: &Path, entries: &[CookieEntry]) -> Result<()> {
    let json = serde_json::to_string_pretty(entries)?;
    fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write session file {}", path.display()))?;
    #[cfg(unix)]
    {
        // Session cookies are credentials; owner-only
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)?;
    }
    tracing::debug!("Saved session to {}", path.display());
    Ok(())
}

/// Authenticated HTTP session, persisted as a cookie file so that a login
/// survives process restarts.
pub struct Session {
    client: Client,
    cookie_jar: Arc<Jar>,
    session_path: PathBuf,
    /// Exclusive lock preventing two crawlers from sharing one session.
    /// Released when the file is dropped.
    #[allow(dead_code)]
    lock_file: std::fs::File,
}

impl Session {
    /// Load the session persisted for `username` in `session_dir`, or log in
    /// with `password` and persist a new one.
    ///
    /// A missing password when no usable session file exists is a
    /// configuration error and fails before any network traffic.
    pub async fn bootstrap(
        session_dir: &Path,
        username: &str,
        password: Option<&str>,
        timeout_secs: Option<u64>,
    ) -> Result<Self> {
        let sanitized = sanitize_username(username);
        fs::create_dir_all(session_dir).await.with_context(|| {
            format!(
                "Failed to create session directory: {}",
                session_dir.display()
            )
        })?;

        let session_path = session_dir.join(format!("{}.session", sanitized));
        let restored = read_cookie_entries(&session_path).await;

        let lock_path = session_dir.join(format!("{}.lock", sanitized));
        let lock_file = tokio::task::spawn_blocking({
            let lock_path = lock_path.clone();
            move || {
                let file = std::fs::File::create(&lock_path).with_context(|| {
                    format!("Failed to create lock file: {}", lock_path.display())
                })?;
                file.try_lock_exclusive().map_err(|_| {
                    anyhow::anyhow!(
                        "Another crawler is running with this session (lock: {})",
                        lock_path.display()
                    )
                })?;
                Ok::<std::fs::File, anyhow::Error>(file)
            }
        })
        .await??;

        let cookie_jar = Arc::new(Jar::default());
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
        default_headers.insert("X-IG-App-ID", HeaderValue::from_static(APP_ID));

        let client = Client::builder()
            .cookie_provider(cookie_jar.clone())
            .default_headers(default_headers)
            .timeout(Duration::from_secs(timeout_secs.unwrap_or(30)))
            .build()?;

        let session = Self {
            client,
            cookie_jar,
            session_path,
            lock_file,
        };

        match (restored, password) {
            (Some(entries), _) => {
                tracing::info!(
                    "Loading session for {} from {}",
                    username,
                    session.session_path.display()
                );
                session.restore(&entries);
            }
            (None, Some(password)) => {
                tracing::info!(
                    "No session file found. Logging in and persisting session to {}",
                    session.session_path.display()
                );
                let entries = session.login(username, password).await?;
                write_cookie_entries(&session.session_path, &entries).await?;
            }
            (None, None) => anyhow::bail!(
                "INSTAGRAM_PASSWORD is required to create a new session; \
                 provide it once to bootstrap {}",
                session.session_path.display()
            ),
        }

        Ok(session)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Current CSRF token from the cookie jar, required on mutating requests.
    pub fn csrf_token(&self) -> Option<String> {
        let url = url::Url::parse(BASE_URL).ok()?;
        let header = self.cookie_jar.cookies(&url)?;
        let header = header.to_str().ok()?;
        header.split(';').find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == "csrftoken").then(|| value.to_string())
        })
    }

    fn restore(&self, entries: &[CookieEntry]) {
        let now = chrono::Utc::now();
        for entry in entries {
            if is_cookie_expired(&entry.cookie, &now) {
                tracing::debug!("Pruning expired cookie from {}", entry.url);
                continue;
            }
            if let Ok(url) = entry.url.parse::<url::Url>() {
                self.cookie_jar.add_cookie_str(&entry.cookie, &url);
            }
        }
    }

    /// Password login through the web endpoint. Returns the cookies to
    /// persist.
    async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Vec<CookieEntry>, TransportError> {
        let mut entries = Vec::new();

        let login_page = format!("{}/accounts/login/", BASE_URL);
        let response = self
            .client
            .get(&login_page)
            .send()
            .await
            .map_err(|source| TransportError::Http {
                url: login_page.clone(),
                source,
            })?;
        record_set_cookies(&response, &mut entries);

        let csrf = self.csrf_token().ok_or_else(|| TransportError::Parse {
            url: login_page.clone(),
            reason: "no csrftoken cookie set".to_string(),
        })?;

        let url = format!("{}/api/v1/web/accounts/login/ajax/", BASE_URL);
        let enc_password = format!(
            "#PWD_INSTAGRAM_BROWSER:0:{}:{}",
            chrono::Utc::now().timestamp(),
            password
        );
        let response = self
            .client
            .post(&url)
            .header("X-CSRFToken", csrf)
            .header(REFERER, &login_page)
            .form(&[
                ("username", username),
                ("enc_password", enc_password.as_str()),
                ("queryParams", "{}"),
                ("optIntoOneTap", "false"),
            ])
            .send()
            .await
            .map_err(|source| TransportError::Http {
                url: url.clone(),
                source,
            })?;
        record_set_cookies(&response, &mut entries);

        let status = response.status().as_u16();
        if status == 429 {
            return Err(TransportError::RateLimited { url });
        }
        let body: Value = response.json().await.map_err(|e| TransportError::Parse {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        interpret_login_response(username, &body)?;
        tracing::info!("Logged in as {}", username);
        Ok(entries)
    }
}

fn interpret_login_response(username: &str, body: &Value) -> Result<(), TransportError> {
    if body["authenticated"].as_bool() == Some(true) {
        return Ok(());
    }
    if body["two_factor_required"].as_bool() == Some(true) {
        return Err(TransportError::BadCredentials(
            "two-factor authentication required; create the session file from a trusted login"
                .to_string(),
        ));
    }
    if body["message"].as_str() == Some("checkpoint_required") {
        let checkpoint = body["checkpoint_url"].as_str().unwrap_or("unknown");
        return Err(TransportError::Checkpoint(checkpoint.to_string()));
    }
    if body["user"].as_bool() == Some(false) {
        return Err(TransportError::BadCredentials(format!(
            "login user {} does not exist",
            username
        )));
    }
    Err(TransportError::BadCredentials(
        body["message"]
            .as_str()
            .unwrap_or("wrong password")
            .to_string(),
    ))
}

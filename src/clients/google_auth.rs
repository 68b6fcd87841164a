//! OAuth credentials for the Google Calendar API.
//!
//! Client secrets come from a `credentials.json` downloaded from the Google
//! Cloud console. The consent URL, the code exchange and the refresh grant go
//! through the `google-calendar` client. The token cache uses the google-auth
//! "authorized user" layout, so a `token.json` written by other google-auth
//! clients loads as is.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ::google_calendar::{AccessToken, Client};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::CalendarError;

pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/calendar",
    "https://www.googleapis.com/auth/calendar.events",
];

/// Loopback redirect registered for installed-app clients.
pub const REDIRECT_URI: &str = "http://localhost";

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const REFRESH_MARGIN_SECS: i64 = 60;

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

#[derive(Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    pub fn load(path: &Path) -> Result<Self, CalendarError> {
        let contents = fs::read_to_string(path).map_err(|e| {
            CalendarError::AuthenticationFailed(format!(
                "Failed to read client secrets from {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&contents).map_err(|e| {
            CalendarError::AuthenticationFailed(format!("{} ({})", e, path.display()))
        })
    }

    pub fn parse(contents: &str) -> Result<Self, String> {
        let file: ClientSecretsFile = serde_json::from_str(contents)
            .map_err(|e| format!("Failed to parse client secrets: {}", e))?;
        file.installed
            .or(file.web)
            .ok_or_else(|| "Client secrets contain neither an \"installed\" nor a \"web\" client".to_string())
    }

    fn client(&self) -> Client {
        Client::new(&self.client_id, &self.client_secret, REDIRECT_URI, "", "")
    }

    /// Consent page asking for offline access to the calendar scopes.
    pub fn authorization_url(&self) -> String {
        let scopes: Vec<String> = SCOPES.iter().map(|scope| scope.to_string()).collect();
        // The client joins scopes with a bare space
        let url = self.client().user_consent_url(&scopes).replace(' ', "%20");
        format!("{}&prompt=consent", url)
    }
}

/// Cached token in the google-auth authorized-user layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredToken {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl StoredToken {
    /// Tokens without an expiry are trusted until the API rejects them.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => match expiry.checked_sub_signed(Duration::seconds(REFRESH_MARGIN_SECS)) {
                Some(due) => due <= now,
                None => true,
            },
            None => false,
        }
    }
}

/// Expiry for a lifetime reported by the token endpoint. Google omits the
/// lifetime or sends zero when it does not know one.
pub fn expiry_after(now: DateTime<Utc>, expires_in: i64) -> Result<Option<DateTime<Utc>>, CalendarError> {
    if expires_in <= 0 {
        return Ok(None);
    }
    Duration::try_seconds(expires_in)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .map(Some)
        .ok_or_else(|| {
            CalendarError::AuthenticationFailed(format!(
                "Token lifetime of {} seconds is out of range",
                expires_in
            ))
        })
}

/// The token endpoint answers errors with a 4xx body that still decodes as an
/// `AccessToken`, just without the token itself.
fn granted_token(granted: &AccessToken) -> Result<String, CalendarError> {
    if granted.access_token.is_empty() {
        return Err(CalendarError::AuthenticationFailed(
            "Token endpoint returned no access token".to_string(),
        ));
    }
    Ok(granted.access_token.clone())
}

fn non_empty(value: String) -> Option<String> {
    Some(value).filter(|v| !v.is_empty())
}

#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, token: &StoredToken) -> Result<StoredToken, CalendarError>;
}

/// Refresh grant against Google's token endpoint.
pub struct GoogleTokenRefresher {
    credentials_path: PathBuf,
}

impl GoogleTokenRefresher {
    pub fn new(credentials_path: PathBuf) -> Self {
        Self { credentials_path }
    }
}

#[async_trait]
impl TokenRefresher for GoogleTokenRefresher {
    async fn refresh(&self, token: &StoredToken) -> Result<StoredToken, CalendarError> {
        let Some(refresh_token) = token.refresh_token.clone().and_then(non_empty) else {
            return Err(CalendarError::AuthenticationFailed(
                "Token has expired and carries no refresh token; run `authorize`".to_string(),
            ));
        };

        let (client_id, client_secret) = if token.client_id.is_empty() {
            let secrets = ClientSecrets::load(&self.credentials_path)?;
            (secrets.client_id, secrets.client_secret)
        } else {
            (token.client_id.clone(), token.client_secret.clone())
        };

        let client = Client::new(&client_id, &client_secret, REDIRECT_URI, &token.token, &refresh_token);
        let granted = client.refresh_access_token().await?;
        let access = granted_token(&granted)?;

        // Google usually omits refresh_token on refresh
        Ok(StoredToken {
            token: access,
            refresh_token: non_empty(granted.refresh_token).or(Some(refresh_token)),
            token_uri: token.token_uri.clone(),
            client_id,
            client_secret,
            scopes: token.scopes.clone(),
            expiry: expiry_after(Utc::now(), granted.expires_in)?,
        })
    }
}

/// What the user pasted back from the consent redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationCode {
    pub code: String,
    pub state: String,
}

pub struct TokenStore {
    token_path: PathBuf,
    credentials_path: PathBuf,
    refresher: Arc<dyn TokenRefresher>,
    cached: Mutex<Option<StoredToken>>,
}

impl TokenStore {
    pub fn new(token_path: PathBuf, credentials_path: PathBuf) -> Self {
        Self {
            token_path,
            refresher: Arc::new(GoogleTokenRefresher::new(credentials_path.clone())),
            credentials_path,
            cached: Mutex::new(None),
        }
    }

    pub fn with_refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = refresher;
        self
    }

    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    pub fn client_secrets(&self) -> Result<ClientSecrets, CalendarError> {
        ClientSecrets::load(&self.credentials_path)
    }

    /// A usable bearer token, refreshing and persisting it when close to expiry.
    pub async fn access_token(&self) -> Result<String, CalendarError> {
        let mut cached = self.cached.lock().await;
        let current = match cached.take() {
            Some(token) => token,
            None => load_token_file(&self.token_path)?,
        };

        let token = if current.needs_refresh(Utc::now()) {
            info!(path = %self.token_path.display(), "Access token expired, refreshing");
            let refreshed = self.refresher.refresh(&current).await?;
            save_token_file(&self.token_path, &refreshed)?;
            refreshed
        } else {
            current
        };

        let bearer = token.token.clone();
        *cached = Some(token);
        Ok(bearer)
    }

    /// Exchanges an authorization code and writes the token cache.
    pub async fn exchange_code(
        &self,
        secrets: &ClientSecrets,
        code: &AuthorizationCode,
    ) -> Result<StoredToken, CalendarError> {
        let mut client = secrets.client();
        let granted = client.get_access_token(&code.code, &code.state).await?;
        let access = granted_token(&granted)?;

        let scopes = if granted.scope.trim().is_empty() {
            SCOPES.iter().map(|s| s.to_string()).collect()
        } else {
            granted.scope.split_whitespace().map(str::to_string).collect()
        };
        let token = StoredToken {
            token: access,
            expiry: expiry_after(Utc::now(), granted.expires_in)?,
            refresh_token: non_empty(granted.refresh_token),
            token_uri: secrets.token_uri.clone(),
            client_id: secrets.client_id.clone(),
            client_secret: secrets.client_secret.clone(),
            scopes,
        };

        save_token_file(&self.token_path, &token)?;
        *self.cached.lock().await = Some(token.clone());
        Ok(token)
    }
}

pub fn load_token_file(path: &Path) -> Result<StoredToken, CalendarError> {
    if !path.exists() {
        return Err(CalendarError::AuthenticationFailed(format!(
            "No cached token at {}; run `authorize` first",
            path.display()
        )));
    }
    let contents = fs::read_to_string(path).map_err(|e| {
        CalendarError::AuthenticationFailed(format!(
            "Failed to read token from {}: {}",
            path.display(),
            e
        ))
    })?;
    serde_json::from_str(&contents).map_err(|e| {
        CalendarError::AuthenticationFailed(format!(
            "Failed to parse token from {}: {}",
            path.display(),
            e
        ))
    })
}

pub fn save_token_file(path: &Path, token: &StoredToken) -> Result<(), CalendarError> {
    let failed = |e: std::io::Error| {
        CalendarError::AuthenticationFailed(format!(
            "Failed to write token to {}: {}",
            path.display(),
            e
        ))
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(failed)?;
        }
    }

    let contents = serde_json::to_string_pretty(token).map_err(|e| {
        CalendarError::AuthenticationFailed(format!("Failed to serialize token: {}", e))
    })?;
    fs::write(path, contents).map_err(failed)?;

    // Owner-only, the file holds OAuth tokens
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(failed)?;
    }

    debug!(path = %path.display(), "saved token cache");
    Ok(())
}

/// Accepts either the bare code or the full redirect URL pasted from the browser.
pub fn extract_code(input: &str) -> Option<AuthorizationCode> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        let url = Url::parse(trimmed).ok()?;
        let param = |name: &str| {
            url.query_pairs()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
        };
        return Some(AuthorizationCode {
            code: param("code")?,
            state: param("state").unwrap_or_default(),
        });
    }
    Some(AuthorizationCode {
        code: trimmed.to_string(),
        state: String::new(),
    })
}

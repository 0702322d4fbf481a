//! OAuth2 credentials: client secret and cached user token.
//!
//! The client secret is the JSON downloaded from the Google Cloud console
//! (an `installed` or `web` object). The token file holds the user's
//! access and refresh tokens. An expired access token is refreshed and the
//! token file rewritten. Obtaining the first token (the browser consent
//! flow) is left to other tools.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{MailError, Result};

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Tokens expiring within this window are refreshed ahead of time.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Contents of the client secret file.
#[derive(Debug, Clone, Deserialize)]
struct CredentialsFile {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

/// OAuth2 client identity.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// Cached user token, compatible with the common `token.json` layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

/// Token endpoint response for a refresh grant.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl StoredToken {
    /// Whether the access token must be refreshed before use.
    ///
    /// A token without an expiry is trusted as long as it has no refresh token.
    /// Zero-value expiries (`0001-01-01T00:00:00Z`) count as no expiry.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        if self.access_token.is_empty() {
            return true;
        }
        match self.expiry {
            Some(expiry) if expiry.timestamp() > 0 => {
                expiry - Duration::seconds(EXPIRY_MARGIN_SECS) <= now
            }
            _ => self.refresh_token.is_some(),
        }
    }
}

/// Read the client secret file.
pub fn load_client_secret(path: &Path) -> Result<ClientSecret> {
    let contents = std::fs::read_to_string(path).map_err(|e| MailError::io(path, e))?;
    let file: CredentialsFile = serde_json::from_str(&contents).map_err(|e| {
        MailError::Auth(format!(
            "unable to parse client secret file {}: {e}",
            path.display()
        ))
    })?;
    file.installed.or(file.web).ok_or_else(|| {
        MailError::Auth(format!(
            "client secret file {} has neither an 'installed' nor a 'web' section",
            path.display()
        ))
    })
}

/// Read the cached token file.
pub fn load_token(path: &Path) -> Result<StoredToken> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        MailError::Auth(format!(
            "unable to read token file {}: {e}; authorize this application first",
            path.display()
        ))
    })?;
    serde_json::from_str(&contents)
        .map_err(|e| MailError::Auth(format!("unable to parse token file {}: {e}", path.display())))
}

/// Write the token file, readable by the owner only where supported.
pub fn save_token(path: &Path, token: &StoredToken) -> Result<()> {
    let json = serde_json::to_string_pretty(token)
        .map_err(|e| MailError::Auth(format!("unable to encode token: {e}")))?;
    std::fs::write(path, json).map_err(|e| MailError::io(path, e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
            warn!(path = %path.display(), error = %e, "Could not restrict token file permissions");
        }
    }
    Ok(())
}

/// Exchange a refresh token for a new access token.
pub async fn refresh_token(
    http: &Client,
    secret: &ClientSecret,
    token: &StoredToken,
) -> Result<StoredToken> {
    let refresh = token
        .refresh_token
        .as_deref()
        .ok_or_else(|| MailError::Auth("access token expired and no refresh token".into()))?;

    let params = [
        ("grant_type", "refresh_token"),
        ("client_id", secret.client_id.as_str()),
        ("client_secret", secret.client_secret.as_str()),
        ("refresh_token", refresh),
    ];
    let response = http
        .post(&secret.token_uri)
        .form(&params)
        .send()
        .await
        .map_err(|e| MailError::Auth(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(MailError::Auth(format!(
            "token refresh rejected ({status}): {}",
            body.chars().take(200).collect::<String>()
        )));
    }

    let refreshed: RefreshResponse = response
        .json()
        .await
        .map_err(|e| MailError::Auth(format!("unable to decode token response: {e}")))?;

    Ok(StoredToken {
        access_token: refreshed.access_token,
        token_type: refreshed.token_type.or_else(|| token.token_type.clone()),
        // The endpoint only sometimes rotates the refresh token
        refresh_token: refreshed.refresh_token.or_else(|| token.refresh_token.clone()),
        expiry: refreshed
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs)),
    })
}

/// Produce a usable access token from the credential and token files.
///
/// Refreshes (and re-saves) the token when it is expired or about to be.
pub async fn access_token(http: &Client, credentials: &Path, token_path: &Path) -> Result<String> {
    let secret = load_client_secret(credentials)?;
    let token = load_token(token_path)?;

    if !token.needs_refresh(Utc::now()) {
        debug!(path = %token_path.display(), "Using cached access token");
        return Ok(token.access_token);
    }

    info!("Access token expired, refreshing");
    let refreshed = refresh_token(http, &secret, &token).await?;
    if let Err(e) = save_token(token_path, &refreshed) {
        warn!(error = %e, "Unable to cache refreshed token");
    }
    Ok(refreshed.access_token)
}

//! Wire access to the mail REST API.
//!
//! [`MailTransport`] is the seam between the retrieval logic and the
//! network: the production implementation talks HTTP to the Gmail API,
//! tests plug in an in-memory mailbox.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use tracing::debug;

use crate::error::RemoteError;
use crate::model::part::RawMessage;

/// Largest page the listing endpoint returns.
pub const MAX_PAGE_SIZE: u32 = 500;

/// Headers requested for listing-stage metadata.
const SUMMARY_HEADERS: &[&str] = &["Subject", "Date"];

/// Reference to a message in a listing page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageRef {
    pub id: String,
    pub thread_id: String,
}

/// One page of `messages.list`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListPage {
    pub messages: Vec<MessageRef>,
    pub next_page_token: Option<String>,
}

/// Response of `messages.attachments.get`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AttachmentBody {
    pub size: u64,
    /// base64url-encoded content.
    pub data: String,
}

/// Remote calls needed to pull a mailbox.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// One page of message ids in `mailbox`, newest first.
    async fn list_page(
        &self,
        mailbox: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<ListPage, RemoteError>;

    /// The message with headers only (`Subject` and `Date`); no bodies.
    async fn get_summary(&self, id: &str) -> Result<RawMessage, RemoteError>;

    /// The complete message with its full part tree.
    async fn get_message(&self, id: &str) -> Result<RawMessage, RemoteError>;

    /// Content of one attachment.
    async fn get_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<AttachmentBody, RemoteError>;
}

/// Gmail REST API over HTTPS with a bearer token.
pub struct GmailTransport {
    http: Client,
    base_url: String,
    user_id: String,
    access_token: String,
}

impl GmailTransport {
    /// Build an HTTP client whose every request is bounded by `request_timeout`.
    pub fn http_client(request_timeout: Duration) -> Result<Client, RemoteError> {
        Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(RemoteError::from)
    }

    pub fn new(http: Client, base_url: &str, access_token: String) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            user_id: "me".to_string(),
            access_token,
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/users/{}/messages", self.base_url, self.user_id)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, RemoteError> {
        debug!(url, "GET");
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .query(query)
            .send()
            .await?;
        let response = check_status(response).await?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| RemoteError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl MailTransport for GmailTransport {
    async fn list_page(
        &self,
        mailbox: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<ListPage, RemoteError> {
        let max_results = page_size.min(MAX_PAGE_SIZE).to_string();
        let mut query = vec![("labelIds", mailbox), ("maxResults", max_results.as_str())];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }
        self.get_json(&self.messages_url(), &query).await
    }

    async fn get_summary(&self, id: &str) -> Result<RawMessage, RemoteError> {
        let url = format!("{}/{}", self.messages_url(), id);
        let mut query = vec![("format", "metadata")];
        query.extend(SUMMARY_HEADERS.iter().map(|h| ("metadataHeaders", *h)));
        self.get_json(&url, &query).await
    }

    async fn get_message(&self, id: &str) -> Result<RawMessage, RemoteError> {
        let url = format!("{}/{}", self.messages_url(), id);
        self.get_json(&url, &[("format", "full")]).await
    }

    async fn get_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<AttachmentBody, RemoteError> {
        let url = format!(
            "{}/{}/attachments/{}",
            self.messages_url(),
            message_id,
            attachment_id
        );
        self.get_json(&url, &[]).await
    }
}

/// Google API error envelope: `{"error": {"code": 404, "message": "..."}}`.
#[derive(Deserialize)]
struct ApiErrorEnvelope {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

/// Turn a non-success response into [`RemoteError::Status`].
async fn check_status(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
        .map(|env| env.error.message)
        .unwrap_or_else(|_| body.chars().take(200).collect());
    Err(RemoteError::Status {
        code: status.as_u16(),
        message,
    })
}

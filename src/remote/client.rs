//! Message retrieval: paginated listing, per-message fetch, and attachment download.

use std::path::Path;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{MailError, RemoteError, Result};
use crate::model::attachment::Attachment;
use crate::model::mail::{Message, MessageSummary};
use crate::model::part::{MessagePart, RawMessage};
use crate::parser::attachment::{collect_candidates, log_id, AttachmentCandidate, AttachmentPolicy};
use crate::parser::body::extract_body;
use crate::parser::decode_transport;

use super::auth;
use super::retry::{with_one_retry, with_timeout};
use super::transport::{GmailTransport, MailTransport, MAX_PAGE_SIZE};

/// Pacing and timeouts for remote calls.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub page_size: u32,
    pub message_timeout: Duration,
    pub retry_backoff: Duration,
    pub attachment_delay: Duration,
}

impl FetchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            page_size: config.fetch.page_size,
            message_timeout: config.fetch.message_timeout(),
            retry_backoff: config.fetch.retry_backoff(),
            attachment_delay: config.fetch.attachment_delay(),
        }
    }
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Connected mailbox client.
///
/// Holds the transport session explicitly; every remote operation goes
/// through a value of this type.
pub struct RetrievalClient {
    transport: Box<dyn MailTransport>,
    settings: FetchSettings,
    policy: AttachmentPolicy,
}

impl RetrievalClient {
    /// Authenticate against the Gmail API and build a client.
    ///
    /// Any failure here is fatal for the run.
    pub async fn connect(config: &Config, credentials: &Path, token: &Path) -> Result<Self> {
        let http = GmailTransport::http_client(config.fetch.request_timeout())?;
        let access_token = auth::access_token(&http, credentials, token).await?;
        let transport = GmailTransport::new(http, &config.fetch.api_base_url, access_token);
        Ok(Self::with_transport(
            Box::new(transport),
            FetchSettings::from_config(config),
            AttachmentPolicy::from_config(&config.attachments),
        ))
    }

    /// Build a client over an already authenticated transport.
    pub fn with_transport(
        transport: Box<dyn MailTransport>,
        settings: FetchSettings,
        policy: AttachmentPolicy,
    ) -> Self {
        Self {
            transport,
            settings,
            policy,
        }
    }

    /// List up to `max_count` message ids in `mailbox`, in the service's order (newest first).
    pub async fn list(&self, mailbox: &str, max_count: usize) -> Result<Vec<String>> {
        let mut ids: Vec<String> = Vec::new();
        let mut page_token: Option<String> = None;
        let page_cap = self.settings.page_size.clamp(1, MAX_PAGE_SIZE) as usize;

        while ids.len() < max_count {
            let remaining = max_count - ids.len();
            let page_size = remaining.min(page_cap) as u32;
            let page = self
                .transport
                .list_page(mailbox, page_size, page_token.as_deref())
                .await?;

            debug!(
                count = page.messages.len(),
                has_next = page.next_page_token.is_some(),
                "Fetched listing page"
            );
            ids.extend(page.messages.into_iter().map(|m| m.id));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        ids.truncate(max_count);
        Ok(ids)
    }

    /// Fetch just the subject and date of a message.
    pub async fn summary(&self, id: &str) -> Result<MessageSummary> {
        let raw = self
            .retrying(id, || self.transport.get_summary(id))
            .await?;
        let payload = &raw.payload;
        Ok(MessageSummary {
            id: non_empty_or(&raw.id, id),
            subject: payload.header("subject").unwrap_or_default().to_string(),
            date: payload.header("date").unwrap_or_default().to_string(),
        })
    }

    /// Fetch a complete message: headers, normalized body, and attachments.
    pub async fn fetch(&self, id: &str) -> Result<Message> {
        let raw = self
            .retrying(id, || self.transport.get_message(id))
            .await?;
        Ok(self.build_message(id, raw).await)
    }

    /// One attempt plus at most one retry, each bounded by the message timeout.
    async fn retrying<F, Fut>(&self, id: &str, call: F) -> Result<RawMessage>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<RawMessage, RemoteError>>,
    {
        let limit = self.settings.message_timeout;
        with_one_retry("messages.get", self.settings.retry_backoff, || {
            with_timeout(limit, call())
        })
        .await
        .map_err(|source| MailError::Fetch {
            id: id.to_string(),
            source,
        })
    }

    async fn build_message(&self, id: &str, raw: RawMessage) -> Message {
        let id = non_empty_or(&raw.id, id);
        let payload = &raw.payload;

        let mut message = Message {
            id: id.clone(),
            ..Default::default()
        };
        for header in &payload.headers {
            message
                .headers
                .insert(header.name.clone(), header.value.clone());
            let slot = match header.name.to_ascii_lowercase().as_str() {
                "subject" => &mut message.subject,
                "from" => &mut message.from,
                "to" => &mut message.to,
                "date" => &mut message.date,
                _ => continue,
            };
            *slot = header.value.clone();
        }

        let body = extract_body(payload);
        message.body = body.content;
        message.body_content_type = body.content_type;
        message.attachments = self.download_attachments(&id, payload).await;
        message
    }

    /// Download every attachment that passes the skip policy.
    ///
    /// Failures drop the attachment, never the message.
    async fn download_attachments(&self, message_id: &str, root: &MessagePart) -> Vec<Attachment> {
        let candidates = collect_candidates(message_id, root, &self.policy);
        debug!(id = %message_id, count = candidates.len(), "Attachment candidates");

        let mut attachments = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if let Some(attachment) = self.download_attachment(message_id, candidate).await {
                attachments.push(attachment);
            }
        }
        if !attachments.is_empty() {
            info!(id = %message_id, count = attachments.len(), "Downloaded attachments");
        }
        attachments
    }

    async fn download_attachment(
        &self,
        message_id: &str,
        candidate: AttachmentCandidate,
    ) -> Option<Attachment> {
        let limit = self.policy.download_timeout(candidate.size);
        debug!(
            id = %message_id,
            filename = %candidate.filename,
            attachment_id = %log_id(&candidate.remote_id),
            size = candidate.size,
            timeout = ?limit,
            "Downloading attachment"
        );

        tokio::time::sleep(self.settings.attachment_delay).await;

        let result = with_one_retry("attachments.get", self.settings.retry_backoff, || {
            with_timeout(
                limit,
                self.transport.get_attachment(message_id, &candidate.remote_id),
            )
        })
        .await;

        let body = match result {
            Ok(body) => body,
            Err(e) => {
                error!(
                    id = %message_id,
                    filename = %candidate.filename,
                    error = %e,
                    "Error downloading attachment"
                );
                return None;
            }
        };

        match decode_transport(&body.data) {
            Ok(data) => Some(Attachment {
                filename: candidate.filename,
                content_type: candidate.content_type,
                size: candidate.size,
                data,
                remote_id: candidate.remote_id,
            }),
            Err(e) => {
                warn!(
                    id = %message_id,
                    filename = %candidate.filename,
                    error = %e,
                    "Error decoding attachment"
                );
                None
            }
        }
    }
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::part::{MessagePart, PartBody, PartHeader};
    use crate::parser::encode_transport;
    use crate::remote::transport::{AttachmentBody, ListPage, MessageRef};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Mailbox of `total` messages served in pages; attachments fail `fail_first` times.
    struct PagedMailbox {
        total: usize,
        page_sizes: Arc<Mutex<Vec<u32>>>,
        attachment_calls: AtomicUsize,
        fail_first: usize,
    }

    impl PagedMailbox {
        fn new(total: usize) -> Self {
            Self {
                total,
                page_sizes: Arc::default(),
                attachment_calls: AtomicUsize::new(0),
                fail_first: 0,
            }
        }
    }

    fn header(name: &str, value: &str) -> PartHeader {
        PartHeader {
            name: name.into(),
            value: value.into(),
        }
    }

    #[async_trait]
    impl MailTransport for PagedMailbox {
        async fn list_page(
            &self,
            _mailbox: &str,
            page_size: u32,
            page_token: Option<&str>,
        ) -> std::result::Result<ListPage, RemoteError> {
            self.page_sizes.lock().unwrap().push(page_size);
            let start: usize = page_token.map(|t| t.parse().unwrap()).unwrap_or(0);
            let end = (start + page_size as usize).min(self.total);
            Ok(ListPage {
                messages: (start..end)
                    .map(|i| MessageRef {
                        id: format!("m{i}"),
                        thread_id: String::new(),
                    })
                    .collect(),
                next_page_token: (end < self.total).then(|| end.to_string()),
            })
        }

        async fn get_summary(&self, id: &str) -> std::result::Result<RawMessage, RemoteError> {
            let mut raw = self.get_message(id).await?;
            raw.payload.parts.clear();
            Ok(raw)
        }

        async fn get_message(&self, id: &str) -> std::result::Result<RawMessage, RemoteError> {
            Ok(RawMessage {
                id: id.into(),
                payload: MessagePart {
                    mime_type: "multipart/mixed".into(),
                    headers: vec![
                        header("Subject", "Draft"),
                        header("Subject", "Report"),
                        header("date", "Mon, 2 Jan 2006 15:04:05 -0700"),
                        header("X-Trace", "first"),
                        header("X-Trace", "second"),
                    ],
                    parts: vec![
                        MessagePart {
                            mime_type: "text/plain".into(),
                            body: Some(PartBody {
                                data: encode_transport(b"hello"),
                                ..Default::default()
                            }),
                            ..Default::default()
                        },
                        MessagePart {
                            mime_type: "application/pdf".into(),
                            headers: vec![header(
                                "Content-Disposition",
                                "attachment; filename=\"r.pdf\"",
                            )],
                            body: Some(PartBody {
                                attachment_id: "att-1".into(),
                                size: 3,
                                data: String::new(),
                            }),
                            ..Default::default()
                        },
                    ],
                    ..Default::default()
                },
                ..Default::default()
            })
        }

        async fn get_attachment(
            &self,
            _message_id: &str,
            _attachment_id: &str,
        ) -> std::result::Result<AttachmentBody, RemoteError> {
            let n = self.attachment_calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(RemoteError::Status {
                    code: 503,
                    message: "unavailable".into(),
                });
            }
            Ok(AttachmentBody {
                size: 3,
                data: encode_transport(b"PDF"),
            })
        }
    }

    fn settings() -> FetchSettings {
        FetchSettings {
            page_size: 500,
            message_timeout: Duration::from_secs(5),
            retry_backoff: Duration::ZERO,
            attachment_delay: Duration::ZERO,
        }
    }

    fn client(mailbox: PagedMailbox) -> RetrievalClient {
        RetrievalClient::with_transport(Box::new(mailbox), settings(), AttachmentPolicy::default())
    }

    #[tokio::test]
    async fn test_list_paginates_and_truncates() {
        let client = client(PagedMailbox::new(1200));
        let ids = client.list("INBOX", 1100).await.unwrap();
        assert_eq!(ids.len(), 1100);
        assert_eq!(ids[0], "m0");
        assert_eq!(ids[1099], "m1099");
    }

    #[tokio::test]
    async fn test_list_requests_only_what_remains() {
        let mailbox = PagedMailbox::new(1200);
        let page_sizes = Arc::clone(&mailbox.page_sizes);
        client(mailbox).list("INBOX", 700).await.unwrap();
        assert_eq!(*page_sizes.lock().unwrap(), vec![500, 200]);
    }

    #[tokio::test]
    async fn test_list_short_mailbox() {
        let client = client(PagedMailbox::new(3));
        let ids = client.list("INBOX", 100).await.unwrap();
        assert_eq!(ids, vec!["m0", "m1", "m2"]);
    }

    #[tokio::test]
    async fn test_fetch_builds_message() {
        let client = client(PagedMailbox::new(1));
        let msg = client.fetch("m0").await.unwrap();
        assert_eq!(msg.subject, "Report");
        assert_eq!(msg.date, "Mon, 2 Jan 2006 15:04:05 -0700");
        assert_eq!(msg.headers.get("X-Trace").map(String::as_str), Some("second"));
        assert_eq!(msg.body_content_type, "text/html");
        assert!(msg.body.contains("hello"));
        assert_eq!(msg.attachments.len(), 1);
        assert_eq!(msg.attachments[0].filename, "r.pdf");
        assert_eq!(msg.attachments[0].data, b"PDF");
    }

    #[tokio::test]
    async fn test_attachment_retried_once() {
        let mut mailbox = PagedMailbox::new(1);
        mailbox.fail_first = 1;
        let msg = client(mailbox).fetch("m0").await.unwrap();
        assert_eq!(msg.attachments.len(), 1);
    }

    #[tokio::test]
    async fn test_attachment_dropped_after_second_failure() {
        let mut mailbox = PagedMailbox::new(1);
        mailbox.fail_first = 2;
        let msg = client(mailbox).fetch("m0").await.unwrap();
        assert!(msg.attachments.is_empty());
        assert_eq!(msg.subject, "Report");
    }

    #[tokio::test]
    async fn test_summary_reads_headers_case_insensitively() {
        let summary = client(PagedMailbox::new(1)).summary("m0").await.unwrap();
        assert_eq!(summary.id, "m0");
        assert_eq!(summary.subject, "Report");
        assert_eq!(summary.date, "Mon, 2 Jan 2006 15:04:05 -0700");
    }

    #[tokio::test]
    async fn test_summary_and_fetch_agree_on_repeated_subject() {
        let client = client(PagedMailbox::new(1));
        let summary = client.summary("m0").await.unwrap();
        let msg = client.fetch("m0").await.unwrap();
        assert_eq!(summary.subject, "Report");
        assert_eq!(summary.subject, msg.subject);
        assert_eq!(msg.headers.get("Subject").map(String::as_str), Some("Report"));
    }
}

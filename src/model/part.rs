//! The remote message part tree, as returned by the mail API.
//!
//! A message payload is a recursive tree: container parts (`multipart/*`)
//! have children and no data, leaf parts carry either inline base64url
//! `data` or an `attachmentId` to fetch separately. Every field may be
//! missing, so everything defaults.

use serde::{Deserialize, Serialize};

/// A message as returned by `messages.get`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawMessage {
    pub id: String,
    pub thread_id: String,
    pub label_ids: Vec<String>,
    pub snippet: String,
    pub payload: MessagePart,
}

/// One node of the part tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessagePart {
    pub part_id: String,
    pub mime_type: String,
    pub headers: Vec<PartHeader>,
    pub body: Option<PartBody>,
    pub parts: Vec<MessagePart>,
}

/// A single header line of a part.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartHeader {
    pub name: String,
    pub value: String,
}

/// Body reference of a part.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PartBody {
    /// Id for `attachments.get`; empty when the data is inline.
    pub attachment_id: String,
    /// Size in bytes as reported by the service.
    pub size: u64,
    /// Inline content, base64url encoded.
    pub data: String,
}

impl MessagePart {
    /// Last header with the given name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Whether any header with the given name exists.
    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    /// Remote attachment id, if non-empty.
    pub fn attachment_id(&self) -> Option<&str> {
        self.body
            .as_ref()
            .map(|b| b.attachment_id.as_str())
            .filter(|id| !id.is_empty())
    }

    /// Reported body size, 0 when the part has no body.
    pub fn reported_size(&self) -> u64 {
        self.body.as_ref().map_or(0, |b| b.size)
    }

    /// Inline base64url data, if non-empty.
    pub fn inline_data(&self) -> Option<&str> {
        self.body
            .as_ref()
            .map(|b| b.data.as_str())
            .filter(|d| !d.is_empty())
    }

    /// Whether this part points at downloadable content: an id and a positive size.
    pub fn has_remote_content(&self) -> bool {
        self.attachment_id().is_some() && self.reported_size() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_api_payload() {
        let json = r#"{
            "id": "18c0ffee",
            "threadId": "18c0ffee",
            "labelIds": ["INBOX"],
            "payload": {
                "mimeType": "multipart/mixed",
                "headers": [{"name": "Subject", "value": "Hi"}],
                "body": {"size": 0},
                "parts": [
                    {"partId": "0", "mimeType": "text/html", "body": {"size": 5, "data": "PGI-PC9iPg"}},
                    {"partId": "1", "mimeType": "application/pdf", "filename": "a.pdf",
                     "body": {"attachmentId": "ANGj", "size": 1234}}
                ]
            }
        }"#;
        let msg: RawMessage = serde_json::from_str(json).expect("parse");
        assert_eq!(msg.id, "18c0ffee");
        assert_eq!(msg.payload.header("subject"), Some("Hi"));
        assert_eq!(msg.payload.parts.len(), 2);
        assert_eq!(msg.payload.parts[0].inline_data(), Some("PGI-PC9iPg"));
        assert_eq!(msg.payload.parts[1].attachment_id(), Some("ANGj"));
        assert!(msg.payload.parts[1].has_remote_content());
        assert!(!msg.payload.has_remote_content());
    }

    #[test]
    fn test_repeated_header_last_wins() {
        let part: MessagePart = serde_json::from_str(
            r#"{"headers": [
                {"name": "Subject", "value": "first"},
                {"name": "subject", "value": "second"}
            ]}"#,
        )
        .expect("parse");
        assert_eq!(part.header("SUBJECT"), Some("second"));
    }

    #[test]
    fn test_missing_fields_default() {
        let part: MessagePart = serde_json::from_str("{}").expect("parse");
        assert!(part.mime_type.is_empty());
        assert_eq!(part.reported_size(), 0);
        assert!(part.attachment_id().is_none());
        assert!(part.inline_data().is_none());
    }
}

//! Fetched message types.

use std::collections::BTreeMap;

use super::attachment::Attachment;

/// A fully fetched message, ready to be written to disk.
///
/// Built once by the retrieval client and only read afterwards.
#[derive(Debug, Clone, Default)]
pub struct Message {
    /// Remote message id (stable, unique within the mailbox).
    pub id: String,

    /// Raw `Subject:` header value.
    pub subject: String,

    /// Raw `From:` header value.
    pub from: String,

    /// Raw `To:` header value.
    pub to: String,

    /// Raw `Date:` header value, not yet parsed.
    pub date: String,

    /// All top-level headers. Duplicate names keep the last value.
    pub headers: BTreeMap<String, String>,

    /// Body, always HTML (plain-text bodies are wrapped at extraction time).
    pub body: String,

    /// Content type of `body` as stored; always an HTML type.
    pub body_content_type: String,

    /// Attachments, unique by remote id.
    pub attachments: Vec<Attachment>,
}

/// Listing-stage metadata: just enough to plan the output folder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageSummary {
    pub id: String,
    pub subject: String,
    pub date: String,
}

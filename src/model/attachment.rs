//! Downloaded attachment.

/// One attachment whose bytes were obtained.
///
/// Parts that were skipped or failed to download never become an
/// `Attachment`; they are simply absent from [`Message::attachments`].
///
/// [`Message::attachments`]: super::mail::Message::attachments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Filename from `Content-Disposition`, or `attachment_<id>` if missing.
    pub filename: String,

    /// MIME content type reported by the part (e.g. `"application/pdf"`).
    pub content_type: String,

    /// Size in bytes as reported by the remote metadata.
    ///
    /// Used for skip decisions; not checked against `data.len()`.
    pub size: u64,

    /// Decoded content.
    pub data: Vec<u8>,

    /// Opaque remote id, used for download and deduplication.
    pub remote_id: String,
}

//! Attachment discovery: which parts are attachments, what they are called,
//! and which of them must not be downloaded.
//!
//! The mail service occasionally returns attachment records that cannot be
//! retrieved: ids hundreds of characters long, or records whose download
//! call never returns. These are recognized here, before any remote call.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::{AttachmentConfig, DenylistEntry};
use crate::model::part::MessagePart;

use super::walk::walk;

/// Attachment ids are truncated to this many characters in log lines.
const LOG_ID_LEN: usize = 50;

/// A part that will be downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentCandidate {
    pub remote_id: String,
    pub filename: String,
    pub content_type: String,
    pub size: u64,
}

/// Why a candidate part is not downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Reported size is above the ceiling.
    TooLarge { size: u64, max: u64 },
    /// The remote id is implausibly long; the record is presumed corrupted.
    IdTooLong { len: usize, max: usize },
    /// The record is on the known-bad list.
    Denylisted { reason: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLarge { size, max } => {
                write!(f, "reported size {size} bytes exceeds {max} bytes")
            }
            Self::IdTooLong { len, max } => {
                write!(f, "attachment id is {len} chars long (max {max}), likely corrupted")
            }
            Self::Denylisted { reason } if reason.is_empty() => {
                write!(f, "known problematic attachment")
            }
            Self::Denylisted { reason } => write!(f, "known problematic attachment: {reason}"),
        }
    }
}

/// Classification and skip rules for attachment parts.
#[derive(Debug, Clone)]
pub struct AttachmentPolicy {
    pub max_size: u64,
    pub max_id_len: usize,
    pub small_size: u64,
    pub small_timeout: Duration,
    pub timeout: Duration,
    pub skip_inline_images: bool,
    pub denylist: Vec<DenylistEntry>,
}

impl Default for AttachmentPolicy {
    fn default() -> Self {
        Self::from_config(&AttachmentConfig::default())
    }
}

impl AttachmentPolicy {
    pub fn from_config(config: &AttachmentConfig) -> Self {
        Self {
            max_size: config.max_size,
            max_id_len: config.max_id_len,
            small_size: config.small_size,
            small_timeout: Duration::from_secs(config.small_timeout_secs),
            timeout: Duration::from_secs(config.timeout_secs),
            skip_inline_images: config.skip_inline_images,
            denylist: config.denylist.clone(),
        }
    }

    /// Whether `part` carries an attachment.
    ///
    /// A part qualifies through any of:
    /// - a `Content-ID` plus downloadable content (an inline image), unless
    ///   inline images are skipped, in which case such parts never qualify;
    /// - a `Content-Disposition` mentioning `attachment` or `filename`;
    /// - downloadable content alone.
    pub fn is_attachment(&self, part: &MessagePart) -> bool {
        if part.has_header("content-id") && part.has_remote_content() {
            if self.skip_inline_images {
                debug!(part_id = %part.part_id, "Skipping inline image");
                return false;
            }
            return true;
        }

        if let Some(disposition) = part.header("content-disposition") {
            let lower = disposition.to_lowercase();
            if lower.contains("attachment") || lower.contains("filename") {
                return true;
            }
        }

        part.has_remote_content()
    }

    /// Decide whether a candidate may be downloaded.
    ///
    /// The denylist is consulted first since its entries hang the download call.
    pub fn check(&self, message_id: &str, candidate: &AttachmentCandidate) -> Result<(), SkipReason> {
        if let Some(entry) = self.denylist.iter().find(|e| {
            e.message_id == message_id && candidate.remote_id.contains(&e.id_contains)
        }) {
            return Err(SkipReason::Denylisted {
                reason: entry.reason.clone(),
            });
        }
        if candidate.size > self.max_size {
            return Err(SkipReason::TooLarge {
                size: candidate.size,
                max: self.max_size,
            });
        }
        let len = candidate.remote_id.chars().count();
        if len > self.max_id_len {
            return Err(SkipReason::IdTooLong {
                len,
                max: self.max_id_len,
            });
        }
        Ok(())
    }

    /// Download timeout for an attachment of the given reported size.
    pub fn download_timeout(&self, size: u64) -> Duration {
        if size < self.small_size {
            self.small_timeout
        } else {
            self.timeout
        }
    }
}

/// Walk the tree and return the attachments worth downloading.
///
/// Parts sharing a remote id yield one candidate; the last one seen wins but
/// keeps the position of the first. Skipped parts are logged and left out.
pub fn collect_candidates(
    message_id: &str,
    root: &MessagePart,
    policy: &AttachmentPolicy,
) -> Vec<AttachmentCandidate> {
    let mut candidates: Vec<AttachmentCandidate> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    walk(root, &mut |part: &MessagePart, _depth: usize| {
        if !policy.is_attachment(part) {
            return;
        }
        // Without a remote id there is nothing to download and nothing to dedup on.
        let Some(remote_id) = part.attachment_id() else {
            return;
        };

        let candidate = AttachmentCandidate {
            remote_id: remote_id.to_string(),
            filename: resolve_filename(part, remote_id),
            content_type: part.mime_type.clone(),
            size: part.reported_size(),
        };

        if let Err(reason) = policy.check(message_id, &candidate) {
            warn!(
                id = %message_id,
                attachment_id = %log_id(&candidate.remote_id),
                filename = %candidate.filename,
                reason = %reason,
                "Skipping attachment"
            );
            return;
        }

        match positions.get(&candidate.remote_id) {
            Some(&pos) => candidates[pos] = candidate,
            None => {
                positions.insert(candidate.remote_id.clone(), candidates.len());
                candidates.push(candidate);
            }
        }
    });

    candidates
}

/// Filename for an attachment part: the disposition's `filename` parameter,
/// or `attachment_<remote_id>` when there is none.
pub fn resolve_filename(part: &MessagePart, remote_id: &str) -> String {
    part.header("content-disposition")
        .and_then(filename_from_disposition)
        .unwrap_or_else(|| format!("attachment_{remote_id}"))
}

/// Parse the `filename` parameter out of a `Content-Disposition` value.
///
/// Handles quoted and bare values, drops trailing parameters, and falls
/// back to the RFC 2231 form `filename*=charset''percent-encoded`.
pub fn filename_from_disposition(value: &str) -> Option<String> {
    let lower = value.to_ascii_lowercase();

    if let Some(idx) = lower.find("filename=") {
        let rest = value[idx + "filename=".len()..].trim_start();
        let name = match rest.strip_prefix('"') {
            Some(quoted) => quoted.split('"').next().unwrap_or(""),
            None => rest.split(';').next().unwrap_or(""),
        };
        let name = name.trim();
        if !name.is_empty() {
            return Some(name.to_string());
        }
    }

    if let Some(idx) = lower.find("filename*=") {
        let rest = value[idx + "filename*=".len()..].trim_start();
        let raw = rest.split(';').next().unwrap_or("").trim().trim_matches('"');
        let encoded = match raw.splitn(3, '\'').collect::<Vec<_>>().as_slice() {
            [_charset, _lang, encoded] => *encoded,
            _ => raw,
        };
        let name = percent_decode(encoded);
        let name = name.trim();
        if !name.is_empty() {
            return Some(name.to_string());
        }
    }

    None
}

/// Decode `%XX` escapes; malformed escapes are kept literally.
fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(b) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Shorten an attachment id for logging.
pub fn log_id(id: &str) -> String {
    if id.chars().count() > LOG_ID_LEN {
        let head: String = id.chars().take(LOG_ID_LEN).collect();
        format!("{head}...")
    } else {
        id.to_string()
    }
}

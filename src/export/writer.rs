//! Materialize fetched messages on disk.
//!
//! Layout per message, all under `{root}/{prefix}/`:
//!
//! ```text
//! {prefix}_body.html
//! {prefix}_{attachment filename}    (one per attachment)
//! {prefix}_metadata.txt             (written last; marks the message complete)
//! ```

use std::fmt::Write as _;
use std::fs::{File, FileTimes};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, info, warn};

use crate::error::{MailError, Result};
use crate::model::mail::Message;

use super::naming::{sanitize_component, truncate_bytes, PlannedName};

/// Suffix of the per-message metadata file.
pub const METADATA_SUFFIX: &str = "_metadata.txt";

/// Suffix of the per-message body file.
pub const BODY_SUFFIX: &str = "_body.html";

/// Longest file name common filesystems accept, in bytes.
pub const MAX_FILE_NAME: usize = 255;

/// Room kept free for a `_N` duplicate counter.
const COUNTER_RESERVE: usize = 6;

/// Check that the output root exists and is a directory.
pub fn validate_output_dir(path: &Path) -> Result<()> {
    let meta = std::fs::metadata(path).map_err(|e| {
        MailError::InvalidPath(format!("output directory {} is not accessible: {e}", path.display()))
    })?;
    if !meta.is_dir() {
        return Err(MailError::InvalidPath(format!(
            "{} is not a directory",
            path.display()
        )));
    }
    debug!(path = %path.display(), "Output directory validated");
    Ok(())
}

/// What one message write produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WrittenMessage {
    pub folder: PathBuf,
    pub attachments: usize,
    pub attachment_bytes: u64,
}

/// Writes messages below an output root.
#[derive(Debug, Clone)]
pub struct OutputWriter {
    root: PathBuf,
}

impl OutputWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn folder_path(&self, name: &PlannedName) -> PathBuf {
        self.root.join(&name.prefix)
    }

    /// Whether a message with this planned name was completely written before.
    ///
    /// Looks for any `*_metadata.txt` in the planned folder.
    pub fn is_downloaded(&self, name: &PlannedName) -> bool {
        let Ok(entries) = std::fs::read_dir(self.folder_path(name)) else {
            return false;
        };
        entries.flatten().any(|entry| {
            entry.file_name().to_string_lossy().ends_with(METADATA_SUFFIX)
                && entry.file_type().is_ok_and(|t| t.is_file())
        })
    }

    /// Create the message folder, reusing it if it already exists.
    pub fn create_folder(&self, name: &PlannedName) -> Result<PathBuf> {
        let folder = self.folder_path(name);
        if folder.is_dir() {
            info!(folder = %name.prefix, "Email folder already exists");
        } else {
            std::fs::create_dir_all(&folder).map_err(|e| MailError::io(&folder, e))?;
            info!(folder = %name.prefix, "Created email folder");
        }
        Ok(folder)
    }

    /// Write body, attachments, and metadata, then stamp the folder with the message date.
    ///
    /// Body and metadata failures fail the message; a failed attachment is skipped.
    pub fn write_message(&self, name: &PlannedName, message: &Message) -> Result<WrittenMessage> {
        let folder = self.create_folder(name)?;
        let prefix = &name.prefix;

        let body_path = folder.join(format!("{prefix}{BODY_SUFFIX}"));
        std::fs::write(&body_path, message.body.as_bytes())
            .map_err(|e| MailError::io(&body_path, e))?;

        let mut written = WrittenMessage {
            folder: folder.clone(),
            ..Default::default()
        };
        for (i, attachment) in message.attachments.iter().enumerate() {
            let mut filename = sanitize_component(&attachment.filename);
            if filename.is_empty() {
                filename = format!("attachment_{}", i + 1);
            }
            let room = MAX_FILE_NAME.saturating_sub(prefix.len() + 1 + COUNTER_RESERVE);
            let filename = fit_file_name(&filename, room);
            let path = unique_path(&folder.join(format!("{prefix}_{filename}")));

            match std::fs::write(&path, &attachment.data) {
                Ok(()) => {
                    debug!(
                        file = %path.display(),
                        bytes = attachment.data.len(),
                        "Wrote attachment"
                    );
                    written.attachments += 1;
                    written.attachment_bytes += attachment.data.len() as u64;
                }
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Failed to write attachment");
                }
            }
        }
        if written.attachments > 0 {
            info!(count = written.attachments, folder = %prefix, "Wrote attachments");
        }

        let metadata_path = folder.join(format!("{prefix}{METADATA_SUFFIX}"));
        std::fs::write(&metadata_path, render_metadata(message))
            .map_err(|e| MailError::io(&metadata_path, e))?;

        if let Err(e) = set_folder_time(&folder, name) {
            warn!(folder = %prefix, error = %e, "Failed to set folder timestamp");
        }

        info!(id = %message.id, folder = %folder.display(), "Wrote email");
        Ok(written)
    }
}

/// Human-readable metadata file content.
///
/// Headers are listed in name order, so rewriting an unchanged message
/// produces identical bytes.
pub fn render_metadata(message: &Message) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Email ID: {}", message.id);
    let _ = writeln!(out, "Subject: {}", message.subject);
    let _ = writeln!(out, "From: {}", message.from);
    let _ = writeln!(out, "To: {}", message.to);
    let _ = writeln!(out, "Date: {}", message.date);
    let _ = writeln!(out, "Body MIME Type: {}", message.body_content_type);
    let _ = writeln!(out, "Attachments: {}", message.attachments.len());
    out.push_str("\nHeaders:\n");
    for (name, value) in &message.headers {
        let _ = writeln!(out, "{name}: {value}");
    }

    if !message.attachments.is_empty() {
        out.push_str("\nAttachments:\n");
        for (i, att) in message.attachments.iter().enumerate() {
            let _ = writeln!(
                out,
                "  {}. {} ({}, {} bytes)",
                i + 1,
                att.filename,
                att.content_type,
                att.size
            );
        }
    }
    out
}

fn set_folder_time(folder: &Path, name: &PlannedName) -> std::io::Result<()> {
    let time = SystemTime::from(name.date);
    let times = FileTimes::new().set_accessed(time).set_modified(time);
    File::open(folder)?.set_times(times)?;
    debug!(folder = %folder.display(), date = %name.date.to_rfc3339(), "Set folder timestamp");
    Ok(())
}

/// Shorten `filename` to `max` bytes, cutting the stem and keeping the extension.
fn fit_file_name(filename: &str, max: usize) -> String {
    if filename.len() <= max {
        return filename.to_string();
    }
    let (stem, ext) = split_extension(filename);
    if ext.is_empty() || ext.len() + 1 >= max {
        return truncate_bytes(filename, max).to_string();
    }
    let stem = truncate_bytes(stem, max - ext.len() - 1);
    format!("{stem}.{ext}")
}

/// If `path` already exists, append `_1`, `_2`, ... before the extension.
fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("file");
    let (stem, ext) = split_extension(name);
    let parent = path.parent().unwrap_or(Path::new("."));

    let mut counter = 1u64;
    loop {
        let candidate = if ext.is_empty() {
            parent.join(format!("{stem}_{counter}"))
        } else {
            parent.join(format!("{stem}_{counter}.{ext}"))
        };
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// `("report", "pdf")` for `report.pdf`; a leading dot is not an extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(dot) if dot > 0 => (&name[..dot], &name[dot + 1..]),
        _ => (name, ""),
    }
}

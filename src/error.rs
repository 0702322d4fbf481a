//! Centralized error types for mailpull.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mailpull library.
#[derive(Error, Debug)]
pub enum MailError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A remote call failed (after any retry it was entitled to).
    #[error("Remote call failed: {0}")]
    Remote(#[from] RemoteError),

    /// Fetching one message failed terminally.
    #[error("Unable to retrieve message {id}: {source}")]
    Fetch {
        id: String,
        #[source]
        source: RemoteError,
    },

    /// Credentials or token could not be loaded or refreshed.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The run was cancelled (CTRL+C).
    #[error("Operation cancelled by user")]
    Cancelled,

    /// The run exceeded its overall time limit.
    #[error("Operation timed out after {0:?}")]
    TimedOut(std::time::Duration),

    /// The requested message id was not among the listed messages.
    #[error("Message {0} not found in the listed messages")]
    MessageNotListed(String),

    /// An invalid path was provided.
    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

/// Failure of a single remote call, structured enough for the retry classifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The service answered with a non-success HTTP status.
    #[error("HTTP {code}: {message}")]
    Status { code: u16, message: String },

    /// The call did not complete within its deadline.
    #[error("request timeout")]
    Timeout,

    /// Connection-level failure (DNS, TLS, reset, ...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body was not what the API documents.
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Convenience alias for `Result<T, MailError>`.
pub type Result<T> = std::result::Result<T, MailError>;

impl MailError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Malformed(e.to_string())
        } else if let Some(status) = e.status() {
            Self::Status {
                code: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            Self::Transport(describe_chain(&e))
        }
    }
}

/// Join an error and all of its sources into one line.
///
/// reqwest keeps the interesting part ("connection reset by peer") in the
/// source chain, not in the top-level message.
fn describe_chain(e: &dyn std::error::Error) -> String {
    let mut out = e.to_string();
    let mut source = e.source();
    while let Some(inner) = source {
        out.push_str(": ");
        out.push_str(&inner.to_string());
        source = inner.source();
    }
    out
}

//! The download run: list a mailbox, then fetch and write each message in turn.
//!
//! Messages are handled strictly one at a time. Per-message failures are
//! counted and the run moves on; listing failures, the run deadline, and
//! cancellation end the run.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{MailError, Result};
use crate::export::naming::plan;
use crate::export::writer::{OutputWriter, WrittenMessage};
use crate::remote::client::RetrievalClient;

/// What to download.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    /// Mailbox label, e.g. `INBOX`.
    pub mailbox: String,
    /// Upper bound on listed messages.
    pub max_count: usize,
    /// Restrict the run to this single message id.
    pub only_id: Option<String>,
}

/// Run-level pacing and limits.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub item_delay: Duration,
    pub run_timeout: Duration,
    pub prefix_budget: usize,
}

impl RunSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            item_delay: config.fetch.item_delay(),
            run_timeout: config.fetch.run_timeout(),
            prefix_budget: config.output.prefix_budget,
        }
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub attachments: usize,
    pub attachment_bytes: u64,
}

impl RunStats {
    /// Nothing was written or found complete, and something failed.
    pub fn is_total_failure(&self) -> bool {
        self.processed == 0 && self.skipped == 0 && self.failed > 0
    }

    fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Processed(written) => {
                self.processed += 1;
                self.attachments += written.attachments;
                self.attachment_bytes += written.attachment_bytes;
            }
            ItemOutcome::Skipped => self.skipped += 1,
            ItemOutcome::Failed => self.failed += 1,
        }
    }
}

/// Result of handling one message.
#[derive(Debug)]
enum ItemOutcome {
    Processed(WrittenMessage),
    Skipped,
    Failed,
}

/// Download up to `request.max_count` messages into `writer`'s root.
///
/// `progress` is called with `(done, total)` before each message and once at
/// the end. Returns [`MailError::Cancelled`] or [`MailError::TimedOut`] if the
/// run is interrupted; messages finished before that stay on disk.
pub async fn run(
    client: &RetrievalClient,
    writer: &OutputWriter,
    request: &DownloadRequest,
    settings: &RunSettings,
    mut cancel: watch::Receiver<bool>,
    progress: &dyn Fn(usize, usize),
) -> Result<RunStats> {
    let deadline = Instant::now() + settings.run_timeout;
    let limit = settings.run_timeout;

    info!(mailbox = %request.mailbox, max = request.max_count, "Listing messages");
    let mut ids = interruptible(
        client.list(&request.mailbox, request.max_count),
        deadline,
        limit,
        &mut cancel,
    )
    .await?;
    info!(count = ids.len(), "Found messages");

    if let Some(only) = &request.only_id {
        if !ids.iter().any(|id| id == only) {
            return Err(MailError::MessageNotListed(only.clone()));
        }
        info!(id = %only, "Processing a single message");
        ids = vec![only.clone()];
    }

    let mut stats = RunStats::default();
    let total = ids.len();
    if total == 0 {
        info!("No messages found");
        return Ok(stats);
    }

    for (i, id) in ids.iter().enumerate() {
        progress(i, total);
        let item = async {
            if i > 0 {
                tokio::time::sleep(settings.item_delay).await;
            }
            info!(index = i + 1, total, id = %id, "Processing message");
            Ok::<_, MailError>(process_one(client, writer, id, settings.prefix_budget).await)
        };

        match interruptible(item, deadline, limit, &mut cancel).await {
            Ok(outcome) => stats.record(outcome),
            Err(e) => {
                warn!(
                    processed = stats.processed,
                    skipped = stats.skipped,
                    failed = stats.failed,
                    remaining = total - i,
                    "Run interrupted: {e}"
                );
                return Err(e);
            }
        }
    }
    progress(total, total);

    info!(
        processed = stats.processed,
        skipped = stats.skipped,
        failed = stats.failed,
        output = %writer.root().display(),
        "Download completed"
    );
    Ok(stats)
}

/// Plan, check, fetch, and write one message. Never fails the run.
async fn process_one(
    client: &RetrievalClient,
    writer: &OutputWriter,
    id: &str,
    prefix_budget: usize,
) -> ItemOutcome {
    let summary = match client.summary(id).await {
        Ok(summary) => summary,
        Err(e) => {
            error!(id = %id, error = %e, "Failed to get message");
            return ItemOutcome::Failed;
        }
    };

    let name = plan(&summary.date, &summary.subject, prefix_budget);
    if writer.is_downloaded(&name) {
        info!(id = %id, folder = %name.prefix, "Email already downloaded, skipping");
        return ItemOutcome::Skipped;
    }

    let message = match client.fetch(id).await {
        Ok(message) => message,
        Err(e) => {
            error!(id = %id, error = %e, "Failed to get message");
            return ItemOutcome::Failed;
        }
    };

    match writer.write_message(&name, &message) {
        Ok(written) => ItemOutcome::Processed(written),
        Err(e) => {
            error!(id = %id, error = %e, "Failed to write message");
            ItemOutcome::Failed
        }
    }
}

/// Run `fut` unless the run deadline passes or cancellation is requested first.
async fn interruptible<T>(
    fut: impl Future<Output = Result<T>>,
    deadline: Instant,
    limit: Duration,
    cancel: &mut watch::Receiver<bool>,
) -> Result<T> {
    tokio::select! {
        result = fut => result,
        _ = tokio::time::sleep_until(deadline) => Err(MailError::TimedOut(limit)),
        _ = cancelled(cancel) => Err(MailError::Cancelled),
    }
}

/// Resolves once cancellation is requested; never if the sender is gone.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|requested| *requested).await.is_err() {
        std::future::pending::<()>().await;
    }
}

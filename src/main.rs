//! CLI entry point for `mailpull`.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::watch;
use tracing::{error, info};

use mailpull::config::{self, Config};
use mailpull::download::{self, DownloadRequest, RunSettings};
use mailpull::export::writer::{validate_output_dir, OutputWriter};
use mailpull::remote::client::RetrievalClient;

#[derive(Parser)]
#[command(
    name = "mailpull",
    version,
    about = "Download a Gmail mailbox into one folder per message"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Download messages into a local directory
    Download(DownloadArgs),
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

#[derive(clap::Args)]
struct DownloadArgs {
    /// Mailbox (label) to download from
    #[arg(short, long, default_value = "INBOX")]
    mailbox: String,

    /// Existing directory to write messages into
    #[arg(short = 'd', long, value_name = "DIR")]
    output_dir: PathBuf,

    /// Maximum number of messages to download
    #[arg(short, long, default_value_t = 100, value_parser = clap::value_parser!(u32).range(1..))]
    count: u32,

    /// Only process this message id (it must be among the listed messages)
    #[arg(long, value_name = "ID", env = "MAILPULL_ONLY_ID")]
    only: Option<String>,

    /// Do not download images referenced from the body by Content-ID
    #[arg(long, env = "SKIP_INLINE_IMAGES")]
    skip_inline_images: bool,

    /// OAuth2 client secret JSON
    #[arg(long, value_name = "FILE", env = "GOOGLE_CREDENTIALS_FILE")]
    credentials: PathBuf,

    /// Cached OAuth2 token JSON
    #[arg(long, value_name = "FILE", env = "GOOGLE_TOKEN_FILE", default_value = "token.json")]
    token: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.clone(),
        1 => "info".to_string(),
        2 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    setup_logging(&log_level, &config);

    match cli.command {
        Commands::Download(args) => {
            if args.skip_inline_images {
                config.attachments.skip_inline_images = true;
            }
            cmd_download(&args, &config).await
        }
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mailpull.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Download a mailbox and print a summary line.
async fn cmd_download(args: &DownloadArgs, config: &Config) -> anyhow::Result<()> {
    validate_output_dir(&args.output_dir)?;

    info!("Connecting to Gmail API...");
    let client = RetrievalClient::connect(config, &args.credentials, &args.token).await?;
    info!(mailbox = %args.mailbox, max = args.count, "Connected");

    let request = DownloadRequest {
        mailbox: args.mailbox.clone(),
        max_count: args.count as usize,
        only_id: args.only.clone(),
    };
    let writer = OutputWriter::new(&args.output_dir);
    let settings = RunSettings::from_config(config);
    let (cancel, _cancel_tx) = watch_ctrl_c();

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Downloading [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let start = Instant::now();
    let result = download::run(&client, &writer, &request, &settings, cancel, &|done, total| {
        pb.set_length(total as u64);
        pb.set_position(done as u64);
    })
    .await;
    pb.finish_and_clear();

    let stats = match result {
        Ok(stats) => stats,
        Err(e) => {
            error!(error = %e, "Download aborted");
            return Err(e.into());
        }
    };

    println!(
        "Processed: {}, Skipped: {}, Failed: {}. {} attachments ({}) in {:.1}s. Emails saved to: {}",
        stats.processed,
        stats.skipped,
        stats.failed,
        stats.attachments,
        humansize::format_size(stats.attachment_bytes, humansize::BINARY),
        start.elapsed().as_secs_f64(),
        display_path(&args.output_dir),
    );

    if stats.is_total_failure() {
        anyhow::bail!("all {} email downloads failed", stats.failed);
    }
    Ok(())
}

/// Cancellation channel flipped to `true` on CTRL+C.
fn watch_ctrl_c() -> (watch::Receiver<bool>, std::sync::Arc<watch::Sender<bool>>) {
    let (send_cancel, watch_cancel) = watch::channel(false);
    let send_cancel = std::sync::Arc::new(send_cancel);
    let send_cancel_2 = send_cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install CTRL+C handler");
            return;
        }
        info!("Received CTRL+C, shutting down");
        let _ = send_cancel.send(true);
    });
    (watch_cancel, send_cancel_2)
}

fn display_path(path: &Path) -> String {
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailpull", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

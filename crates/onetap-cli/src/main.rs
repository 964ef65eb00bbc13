//! onetap: end-to-end encrypted one-time file sharing
//!
//! Commands:
//!   send <file> [--expiry 24h]     - encrypt, upload, print the capability link
//!   receive <link> [--out <dir>]   - fetch once, decrypt, write the file
//!   usage                          - show remaining backend capacity
//!   config show                    - display current configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use onetap_core::config::{BackendKind, OnetapConfig};
use onetap_core::Expiry;
use onetap_storage::{Backend, HttpBackend, OperatorBackend};
use onetap_transfer::{
    format_size, ReceiveState, SendState, Stage, StageFn, TransferOrchestrator, TransferOutcome,
    TransferSettings,
};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "onetap",
    version,
    about = "End-to-end encrypted one-time file sharing",
    long_about = "onetap: encrypt a file locally, upload the ciphertext, and share a link \
                  that carries the key in its fragment. The file can be downloaded once."
)]
struct Cli {
    /// Path to config.toml (default: ~/.config/onetap/config.toml)
    #[arg(long, short = 'c', env = "ONETAP_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides [log] level
    #[arg(long, env = "ONETAP_LOG")]
    log: Option<String>,

    /// Log format; overrides [log] format
    #[arg(long, env = "ONETAP_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt and upload a file, then print its one-time link
    Send {
        /// Local file to share
        file: PathBuf,
        /// How long the link stays valid, e.g. 45m, 12h, 3d (default: [share] default_expiry)
        #[arg(long, short = 'e')]
        expiry: Option<Expiry>,
    },

    /// Download and decrypt the file behind a link
    ///
    /// The link is consumed: a second receive reports the file as gone.
    Receive {
        /// Capability link, including its #key=... fragment
        link: String,
        /// Directory to write the file into
        #[arg(long, short = 'o', default_value = ".")]
        out: PathBuf,
        /// Write the plaintext to stdout instead of a file
        #[arg(long, conflicts_with = "out")]
        stdout: bool,
    },

    /// Show how much storage the backend has left
    Usage,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = load_config(&config_path).await?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = match cli.log_format {
        Some(f) => f,
        None if config.log.format.eq_ignore_ascii_case("json") => LogFormat::Json,
        None => LogFormat::Text,
    };
    init_logging(&level, &format);

    debug!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        backend = ?config.backend.kind,
        "onetap starting"
    );

    match cli.command {
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &config_path),
        command => match config.backend.kind {
            BackendKind::Http => {
                let backend = HttpBackend::from_config(&config.backend)?;
                dispatch(&config, backend, command).await
            }
            BackendKind::Fs => {
                let root = expand_tilde(&config.backend.root);
                let op = onetap_storage::build_fs_operator(&root)?;
                info!(root = %root.display(), "using local store");
                let backend = OperatorBackend::new(op, config.backend.capacity_bytes);
                dispatch(&config, backend, command).await
            }
            BackendKind::S3 => {
                let s3 = onetap_storage::S3Config::from_env(&config.backend)?;
                let op = onetap_storage::build_operator(&s3)?;
                info!(bucket = %s3.bucket, endpoint = %s3.endpoint, "using s3 store");
                let backend = OperatorBackend::new(op, config.backend.capacity_bytes);
                dispatch(&config, backend, command).await
            }
        },
    }
}

async fn dispatch<B: Backend>(config: &OnetapConfig, backend: B, command: Commands) -> Result<()> {
    match command {
        Commands::Send { file, expiry } => {
            let expiry = expiry.unwrap_or(config.share.default_expiry);
            cmd_send(config, backend, &file, expiry).await
        }
        Commands::Receive { link, out, stdout } => {
            cmd_receive(config, backend, &link, &out, stdout).await
        }
        Commands::Usage => cmd_usage(config, backend).await,
        Commands::Config { .. } => Ok(()),
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries links and file contents, so logs go to stderr.
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

fn default_config_path() -> PathBuf {
    expand_tilde(Path::new("~/.config/onetap/config.toml"))
}

async fn load_config(path: &Path) -> Result<OnetapConfig> {
    if path.exists() {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config: {}", path.display()))
    } else {
        Ok(OnetapConfig::default())
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    match s.strip_prefix("~/") {
        Some(rest) => {
            let home = std::env::var("HOME").unwrap_or_default();
            PathBuf::from(home).join(rest)
        }
        None => path.to_path_buf(),
    }
}

// ── Progress and cancellation ─────────────────────────────────────────────────

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}") {
        pb.set_style(style);
    }
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn stage_message(stage: Stage) -> Option<&'static str> {
    match stage {
        Stage::Send(SendState::QuotaChecking) => Some("checking storage..."),
        Stage::Send(SendState::Encrypting) => Some("encrypting..."),
        Stage::Send(SendState::Uploading) => Some("uploading..."),
        Stage::Receive(ReceiveState::Fetching) => Some("downloading..."),
        Stage::Receive(ReceiveState::Decrypting) => Some("decrypting..."),
        _ => None,
    }
}

fn spinner_observer(pb: &ProgressBar) -> StageFn {
    let pb = pb.clone();
    Box::new(move |stage| {
        if let Some(msg) = stage_message(stage) {
            pb.set_message(msg);
        }
    })
}

/// Token that fires on the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling transfer");
            trigger.cancel();
        }
    });
    token
}

// ── `onetap send` ─────────────────────────────────────────────────────────────

async fn cmd_send<B: Backend>(
    config: &OnetapConfig,
    backend: B,
    file: &Path,
    expiry: Expiry,
) -> Result<()> {
    if !file.is_file() {
        anyhow::bail!("not a file: {}", file.display());
    }

    let pb = make_spinner("send");
    let orch = TransferOrchestrator::new(backend, TransferSettings::from_config(config))
        .with_observer(spinner_observer(&pb));
    let cancel = cancel_on_ctrl_c();

    match orch.send_file(file, expiry, &cancel).await {
        TransferOutcome::Uploaded { link, .. } => {
            pb.finish_and_clear();
            eprintln!("Link expires in {expiry} and works once:");
            println!("{link}");
            Ok(())
        }
        TransferOutcome::Failed(e) => {
            pb.finish_and_clear();
            Err(e).with_context(|| format!("sending {}", file.display()))
        }
        TransferOutcome::Downloaded { .. } => unreachable!("send never downloads"),
    }
}

// ── `onetap receive` ──────────────────────────────────────────────────────────

async fn cmd_receive<B: Backend>(
    config: &OnetapConfig,
    backend: B,
    link: &str,
    out: &Path,
    to_stdout: bool,
) -> Result<()> {
    let pb = make_spinner("receive");
    let orch = TransferOrchestrator::new(backend, TransferSettings::from_config(config))
        .with_observer(spinner_observer(&pb));
    let cancel = cancel_on_ctrl_c();

    let outcome = orch.receive_with_cancel(link, &cancel).await;
    pb.finish_and_clear();

    match outcome {
        TransferOutcome::Downloaded {
            plaintext,
            filename,
            media_type,
        } => {
            if to_stdout {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(&plaintext).context("writing to stdout")?;
                stdout.flush().context("flushing stdout")?;
            } else {
                let path = onetap_transfer::materialize(out, &filename, &plaintext).await?;
                println!("Saved:   {}", path.display());
                println!("  size:  {}", format_size(plaintext.len() as u64));
                println!("  type:  {media_type}");
                if !media_type.is_previewable() {
                    println!("  (no preview available for this file type)");
                }
            }
            Ok(())
        }
        TransferOutcome::Failed(e) => Err(e).context("receiving file"),
        TransferOutcome::Uploaded { .. } => unreachable!("receive never uploads"),
    }
}

// ── `onetap usage` ────────────────────────────────────────────────────────────

async fn cmd_usage<B: Backend>(config: &OnetapConfig, backend: B) -> Result<()> {
    let limit = config.backend.quota_timeout();
    let snapshot = tokio::time::timeout(limit, backend.usage())
        .await
        .map_err(|_| onetap_core::OnetapError::Timeout {
            stage: "quota check",
        })??;

    println!("Available: {}", format_size(snapshot.available_bytes));
    println!(
        "Max file:  {}",
        format_size(config.share.max_file_bytes.min(snapshot.available_bytes))
    );
    Ok(())
}

// ── `onetap config show` ──────────────────────────────────────────────────────

fn cmd_config_show(config: &OnetapConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!(
            "# Configuration: defaults (no file at {})",
            config_path.display()
        );
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

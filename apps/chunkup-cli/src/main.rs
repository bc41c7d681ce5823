//! chunkup entry point.

mod config;
mod console;
mod render;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chunkup_transfer::{
    ChunkTransport, FileHandle, HttpChunkTransport, destination_for, save_object,
};
use chunkup_uploader::{
    ProgressReporter, SessionId, SessionRegistry, SessionSnapshot, UploadEvent, UploadState,
    UploaderConfig,
};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use crate::config::CliConfig;
use crate::console::Command as ConsoleCommand;
use crate::render::ProgressView;

const USER_AGENT: &str = concat!("chunkup", "/", env!("CARGO_PKG_VERSION"));

#[derive(Parser)]
#[clap(version, about = "Pausable, resumable chunked uploads")]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Uploads files in chunks; type `help` while it runs for controls.
    Upload(UploadArgs),
    /// Fetches a stored object and saves it under its name.
    Download(DownloadArgs),
}

#[derive(Args)]
struct UploadArgs {
    /// Files to upload.
    #[clap(required = true)]
    files: Vec<PathBuf>,
    /// Destination URL template; `{name}` is replaced by the file name.
    #[clap(long)]
    destination: Option<String>,
    /// Chunk size in bytes.
    #[clap(long)]
    chunk_size: Option<u64>,
}

#[derive(Args)]
struct DownloadArgs {
    /// Name of the stored object.
    name: String,
    /// Destination URL template; `{name}` is replaced by the file name.
    #[clap(long)]
    destination: Option<String>,
    /// Directory to save into.
    #[clap(long)]
    out: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match CliConfig::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load config, using defaults: {e}");
            CliConfig::default()
        }
    };

    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting chunkup");

    match cli.command {
        Command::Upload(args) => upload(args, &config).await,
        Command::Download(args) => download(args, &config).await,
    }
}

fn transport() -> Result<Arc<dyn ChunkTransport>> {
    let http = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .context("failed to build HTTP client")?;
    Ok(Arc::new(HttpChunkTransport::new(http)))
}

fn destination_template(flag: Option<String>, config: &CliConfig) -> Result<String> {
    let template = flag.unwrap_or_else(|| config.destination.clone());
    if template.is_empty() {
        bail!("no destination: pass --destination or set `destination` in the config file");
    }
    Ok(template)
}

async fn upload(args: UploadArgs, config: &CliConfig) -> Result<()> {
    let uploader_config = UploaderConfig {
        chunk_size: args.chunk_size.unwrap_or(config.chunk_size),
        destination: destination_template(args.destination, config)?,
        progress_interval_ms: config.progress_interval_ms,
        ..UploaderConfig::default()
    };

    let mut files = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let file = FileHandle::open(path)
            .await
            .with_context(|| format!("cannot upload {}", path.display()))?;
        files.push(file);
    }

    let registry = SessionRegistry::new(transport()?, uploader_config);
    let mut events = registry
        .take_events()
        .context("upload events already taken")?;
    registry.upload(files);

    let view = Arc::new(ProgressView::new());
    let reporter = ProgressReporter::new(registry.clone());
    {
        let view = Arc::clone(&view);
        reporter.on_progress(Box::new(move |snapshot| println!("{}", view.line(snapshot))));
    }
    reporter.start();

    let download_dir = PathBuf::from(&config.download_dir);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    while !settled(&registry.sessions(), stdin_open) {
        tokio::select! {
            Some(event) = events.recv() => report_event(&registry, &view, event),
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match console::parse(&line) {
                    Some(Ok(ConsoleCommand::Quit)) => break,
                    Some(Ok(command)) => {
                        let out = console::apply(&registry, command, &download_dir).await;
                        println!("{out}");
                    }
                    Some(Err(e)) => println!("{e}"),
                    None => {}
                },
                Ok(None) => stdin_open = false,
                Err(e) => {
                    tracing::warn!(error = %e, "stdin closed");
                    stdin_open = false;
                }
            },
            else => break,
        }
    }
    reporter.stop();

    for snapshot in registry.sessions() {
        println!("{}", render::status_line(&snapshot));
    }
    Ok(())
}

/// Every session completed. Failed and paused sessions keep the console
/// open for `resume`; once stdin is gone it is enough that nothing runs.
fn settled(sessions: &[SessionSnapshot], stdin_open: bool) -> bool {
    let completed = sessions.iter().all(|s| s.state == UploadState::Completed);
    completed || (!stdin_open && sessions.iter().all(|s| !s.loop_active))
}

fn report_event(registry: &SessionRegistry, view: &ProgressView, event: UploadEvent) {
    let name = |id: SessionId| {
        registry
            .snapshot(id)
            .map(|s| s.name)
            .unwrap_or_else(|| id.to_string())
    };
    match event {
        UploadEvent::Completed { id } => {
            view.forget(id);
            println!("{}: upload complete", name(id));
        }
        UploadEvent::Paused { id } => println!("{}: paused", name(id)),
        UploadEvent::Failed { id, error } => {
            view.forget(id);
            println!("{}: failed: {error} (resume to retry)", name(id));
        }
        UploadEvent::Cancelled { id } => view.forget(id),
        UploadEvent::Started { .. } | UploadEvent::Progress { .. } => {}
    }
}

async fn download(args: DownloadArgs, config: &CliConfig) -> Result<()> {
    let template = destination_template(args.destination, config)?;
    let destination = destination_for(&template, &args.name);
    let dir = args
        .out
        .unwrap_or_else(|| PathBuf::from(&config.download_dir));

    let data = transport()?
        .fetch(&destination)
        .await
        .with_context(|| format!("download of {} failed", args.name))?;
    let path = save_object(&dir, &args.name, &data).await?;

    println!(
        "{}: saved {} to {}",
        args.name,
        render::format_bytes(data.len() as u64),
        path.display()
    );
    Ok(())
}

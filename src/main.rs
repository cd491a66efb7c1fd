//! Songloader - music track downloader and converter
//!
//! Fetches tracks from Spotify (through spotdl) and Yandex Music, keeps a
//! list of the downloaded files and converts them with ffmpeg.

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use songloader::backend::{BackendActor, BackendCommand, BackendEvent};
use songloader::queue::JobEvent;
use songloader::registry::ListRow;
use songloader::sources::{DownloadRequest, Platform};
use songloader::utils::config::{AppConfig, CONFIG_FILE_NAME};
use songloader::utils::{logging, platform, tools};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{error, info, Level};

/// Environment variable consulted when `--token` is not given
const TOKEN_ENV: &str = "YANDEX_MUSIC_TOKEN";

#[derive(Parser)]
#[command(name = "songloader", version, about = "Download and convert music tracks")]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = CONFIG_FILE_NAME)]
    config: PathBuf,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download one or more tracks
    Download(DownloadArgs),
    /// Convert downloaded files to another format
    Convert(ConvertArgs),
    /// List known files
    List,
    /// Check that the external tools are installed
    Probe,
}

#[derive(Args)]
struct DownloadArgs {
    /// Track URLs (or bare Yandex Music track ids)
    #[arg(required = true)]
    urls: Vec<String>,

    /// Platform to download from; guessed from the URL when omitted
    #[arg(short, long)]
    platform: Option<Platform>,

    /// Yandex Music OAuth token
    #[arg(long)]
    token: Option<String>,
}

#[derive(Args)]
struct ConvertArgs {
    /// Files to convert; they must be in the download or converted directory
    files: Vec<PathBuf>,

    /// Convert every known file
    #[arg(long, conflicts_with = "files")]
    all: bool,

    /// Target format; defaults to the configured one
    #[arg(short, long)]
    format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let log_guard = logging::init(level, &platform::log_dir());

    if let Command::Probe = cli.command {
        return probe_tools().await;
    }

    // The transcoder is required for the whole session
    if let Err(e) = tools::require(tools::FFMPEG).await {
        error!("{}", e);
        eprintln!("Error: {}", e);
        drop(log_guard);
        std::process::exit(1);
    }

    let config = AppConfig::load(&cli.config);
    let (cmd_tx, cmd_rx) = mpsc::channel::<BackendCommand>(32);
    let (event_tx, event_rx) = mpsc::channel::<BackendEvent>(256);
    let backend = tokio::spawn(BackendActor::new(config, cmd_rx, event_tx).run());

    let mut session = Session::new(cmd_tx.clone(), event_rx);
    let outcome = match cli.command {
        Command::Download(args) => session.download(args).await,
        Command::Convert(args) => session.convert(args).await,
        Command::List => session.list().await,
        Command::Probe => Ok(()),
    };

    let _ = cmd_tx.send(BackendCommand::Shutdown).await;
    session.drain().await;
    match backend.await {
        Ok(config) => {
            if let Err(e) = config.save(&cli.config) {
                error!("Failed to save config: {:#}", e);
            }
        }
        Err(e) => error!("Backend task failed: {}", e),
    }

    outcome
}

async fn probe_tools() -> Result<()> {
    let mut missing = Vec::new();
    for tool in [tools::FFMPEG, tools::SPOTDL] {
        match tools::require(tool).await {
            Ok(path) => println!("{:<8} {}", tool, path.display()),
            Err(e) => {
                println!("{:<8} missing", tool);
                missing.push(e);
            }
        }
    }
    match missing.into_iter().find(|e| e.is_fatal()) {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

/// Front-end side of one CLI invocation
struct Session {
    commands: mpsc::Sender<BackendCommand>,
    events: mpsc::Receiver<BackendEvent>,
}

impl Session {
    fn new(commands: mpsc::Sender<BackendCommand>, events: mpsc::Receiver<BackendEvent>) -> Self {
        Self { commands, events }
    }

    async fn send(&self, command: BackendCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| anyhow::anyhow!("backend stopped unexpectedly"))
    }

    async fn download(&mut self, args: DownloadArgs) -> Result<()> {
        let token = args.token.or_else(|| std::env::var(TOKEN_ENV).ok());

        let mut submitted = 0;
        let mut skipped = 0;
        for url in &args.urls {
            let platform = match args.platform.or_else(|| Platform::detect(url)) {
                Some(platform) => platform,
                None => {
                    eprintln!("Cannot tell the platform of {}; pass --platform", url);
                    skipped += 1;
                    continue;
                }
            };
            if platform.needs_token() && token.is_none() {
                eprintln!(
                    "{} needs an OAuth token; pass --token or set {}",
                    platform.label(),
                    TOKEN_ENV
                );
            }
            let mut request = DownloadRequest::new(platform, url.as_str());
            if let Some(token) = &token {
                request = request.with_token(token.as_str());
            }
            self.send(BackendCommand::Download(request)).await?;
            submitted += 1;
        }

        let failed = skipped + self.wait_for_jobs(submitted).await;
        if failed > 0 {
            bail!("{} of {} downloads failed", failed, args.urls.len());
        }
        Ok(())
    }

    async fn convert(&mut self, args: ConvertArgs) -> Result<()> {
        self.send(BackendCommand::Refresh).await?;
        self.file_list_reply().await?;
        if args.all {
            self.send(BackendCommand::SelectAll).await?;
        } else {
            self.send(BackendCommand::Select(args.files)).await?;
        }
        self.file_list_reply().await?;
        self.send(BackendCommand::ConvertSelected {
            target_format: args.format,
        })
        .await?;

        let failed = self.wait_for_jobs(1).await;
        if failed > 0 {
            bail!("conversion failed");
        }
        Ok(())
    }

    async fn list(&mut self) -> Result<()> {
        self.send(BackendCommand::Refresh).await?;
        while let Some(event) = self.events.recv().await {
            match event {
                BackendEvent::FilesRefreshed(rows) => {
                    print_rows(&rows);
                    return Ok(());
                }
                BackendEvent::Error(message) => bail!(message),
                _ => {}
            }
        }
        bail!("backend stopped unexpectedly")
    }

    /// Wait for the answer to a file list command.
    /// A refresh error is reported but does not end the session.
    async fn file_list_reply(&mut self) -> Result<()> {
        while let Some(event) = self.events.recv().await {
            match event {
                BackendEvent::FilesRefreshed(_) => return Ok(()),
                BackendEvent::Error(message) => {
                    eprintln!("Warning: {}", message);
                    return Ok(());
                }
                BackendEvent::Stopped => break,
                _ => {}
            }
        }
        bail!("backend stopped unexpectedly")
    }

    /// Print job progress until `expected` jobs have ended or were rejected.
    /// Returns how many did not succeed.
    async fn wait_for_jobs(&mut self, mut expected: usize) -> usize {
        let mut failed = 0;
        let mut interrupted = false;

        while expected > 0 {
            let event = tokio::select! {
                event = self.events.recv() => event,
                _ = tokio::signal::ctrl_c(), if !interrupted => {
                    interrupted = true;
                    eprintln!("Cancelling...");
                    let _ = self.commands.send(BackendCommand::CancelAll).await;
                    continue;
                }
            };
            let Some(event) = event else { break };

            match event {
                BackendEvent::Job(event) => {
                    if print_job_event(&event) {
                        expected -= 1;
                        if !matches!(event, JobEvent::Completed { .. }) {
                            failed += 1;
                        }
                    }
                }
                BackendEvent::QueueFull { capacity } => {
                    eprintln!("Queue is full ({} jobs waiting); try again later", capacity);
                    expected -= 1;
                    failed += 1;
                }
                BackendEvent::Error(message) => {
                    eprintln!("Error: {}", message);
                    expected -= 1;
                    failed += 1;
                }
                BackendEvent::FilesRefreshed(_) => {}
                BackendEvent::Stopped => break,
            }
        }
        failed
    }

    /// Consume the remaining events until the backend reports it stopped
    async fn drain(&mut self) {
        while let Some(event) = self.events.recv().await {
            if let BackendEvent::Stopped = event {
                info!("Backend stopped");
                break;
            }
        }
    }
}

/// Print one job event; true when it is the job's last
fn print_job_event(event: &JobEvent) -> bool {
    match event {
        JobEvent::Queued { job_id, label, .. } => println!("[{}] queued: {}", job_id, label),
        JobEvent::Started { .. } | JobEvent::Progress { .. } => {}
        JobEvent::Status {
            job_id, message, ..
        } => println!("[{}] {}", job_id, message),
        JobEvent::ItemFinished {
            job_id,
            input,
            output,
            error,
            ..
        } => match (output, error) {
            (Some(output), _) => println!("[{}] {} -> {}", job_id, input.display(), output.display()),
            (None, Some(error)) => println!("[{}] {} failed: {}", job_id, input.display(), error),
            (None, None) => {}
        },
        JobEvent::Completed {
            job_id, outputs, ..
        } => {
            for output in outputs {
                println!("[{}] saved {}", job_id, output.display());
            }
            println!("[{}] done", job_id);
        }
        JobEvent::Failed { job_id, error, .. } => eprintln!("[{}] failed: {}", job_id, error),
        JobEvent::Cancelled { job_id, .. } => println!("[{}] cancelled", job_id),
    }
    event.is_terminal()
}

fn print_rows(rows: &[ListRow]) {
    for row in rows {
        println!("{}", row);
    }
}

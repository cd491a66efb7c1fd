//! spotdl wrapper for Spotify tracks
//!
//! spotdl is run as a child process. Its stdout is human-readable progress
//! text; the exit code is the only success signal, and spotdl does not say
//! which file it wrote.

use crate::sources::models::{DownloadRequest, Platform};
use crate::sources::traits::TrackSource;
use crate::utils::error::SongloaderError;
use crate::utils::tools::{self, SPOTDL};
use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::SystemTime;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command as AsyncCommand;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Codec spotdl is asked to produce
pub const SPOTDL_FORMAT: &str = "mp3";

/// Spotify source backed by the spotdl executable
pub struct SpotdlSource {
    program: Option<PathBuf>,
    bitrate: String,
    threads: usize,
}

impl SpotdlSource {
    /// Use whichever spotdl is found on this machine
    pub fn new(bitrate: impl Into<String>, threads: usize) -> Self {
        Self {
            program: None,
            bitrate: bitrate.into(),
            threads: threads.max(1),
        }
    }

    /// Use a specific spotdl executable
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = Some(program.into());
        self
    }

    /// Arguments for one download into `output_dir`
    pub fn build_args(&self, url: &str, output_dir: &Path) -> Vec<String> {
        vec![
            "download".to_string(),
            url.to_string(),
            "--format".to_string(),
            SPOTDL_FORMAT.to_string(),
            "--bitrate".to_string(),
            self.bitrate.clone(),
            "--output".to_string(),
            output_dir.to_string_lossy().to_string(),
            "--preload".to_string(),
            "--threads".to_string(),
            self.threads.to_string(),
        ]
    }

    async fn resolve_program(&self) -> Result<PathBuf, SongloaderError> {
        match &self.program {
            Some(program) if tools::probe(program).await => Ok(program.clone()),
            Some(program) => {
                error!("spotdl is not usable at {}", program.display());
                Err(SongloaderError::ToolMissing(SPOTDL.to_string()))
            }
            None => tools::require(SPOTDL).await,
        }
    }
}

#[async_trait]
impl TrackSource for SpotdlSource {
    fn id(&self) -> &'static str {
        "spotdl"
    }

    fn platform(&self) -> Platform {
        Platform::Spotify
    }

    async fn fetch(
        &self,
        request: &DownloadRequest,
        output_dir: &Path,
        status: &watch::Sender<String>,
    ) -> Result<PathBuf> {
        info!("Starting Spotify download for URL: {}", request.url);

        // Probed on every attempt; a missing spotdl only fails this download
        let program = self.resolve_program().await?;

        tokio::fs::create_dir_all(output_dir).await?;

        let args = self.build_args(&request.url, output_dir);
        debug!("Executing command: {} {}", program.display(), args.join(" "));

        let mut child = AsyncCommand::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        status.send_replace("Downloading from Spotify...".to_string());

        // Drain stderr alongside stdout so a chatty child never blocks on a full pipe
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf).await;
                String::from_utf8_lossy(&buf).trim().to_string()
            })
        });

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                info!("spotdl output: {}", line);
                status.send_replace(format!("Download progress: {}", line));
            }
        }

        let exit = child.wait().await?;
        let stderr = match stderr_task {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };

        if !exit.success() {
            error!("Spotify download failed with {}: {}", exit, stderr);
            status.send_replace("Download failed".to_string());
            let reason = if stderr.is_empty() {
                format!("spotdl exited with {}", exit)
            } else {
                stderr
            };
            return Err(SongloaderError::DownloadFailure(reason).into());
        }

        // FIXME: newest-file lookup can pick another job's output when two
        // downloads finish together; spotdl has no machine-readable result.
        match newest_file_with_extension(output_dir, SPOTDL_FORMAT).await? {
            Some(path) => {
                info!("Spotify download completed: {}", path.display());
                status.send_replace("Download completed".to_string());
                Ok(path)
            }
            None => {
                warn!("spotdl exited cleanly but no .{} file was found", SPOTDL_FORMAT);
                status.send_replace("Download failed".to_string());
                Err(SongloaderError::DownloadFailure(format!(
                    "spotdl finished but no .{} file appeared in {}",
                    SPOTDL_FORMAT,
                    output_dir.display()
                ))
                .into())
            }
        }
    }
}

/// The most recently created (or, where creation time is unavailable,
/// modified) file in `dir` whose extension matches `ext`
pub async fn newest_file_with_extension(dir: &Path, ext: &str) -> Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut newest: Option<(SystemTime, PathBuf)> = None;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let matches = path
            .extension()
            .map(|e| e.to_string_lossy().eq_ignore_ascii_case(ext))
            .unwrap_or(false);
        if !matches {
            continue;
        }

        let metadata = match entry.metadata().await {
            Ok(m) if m.is_file() => m,
            _ => continue,
        };
        let stamp = metadata
            .created()
            .or_else(|_| metadata.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);

        if newest.as_ref().map_or(true, |(best, _)| stamp > *best) {
            newest = Some((stamp, path));
        }
    }

    Ok(newest.map(|(_, path)| path))
}

//! ffmpeg wrapper for audio conversion

use crate::utils::error::SongloaderError;
use crate::utils::platform::find_tool;
use crate::utils::tools::FFMPEG;
use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::Command as AsyncCommand;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How a single transcode ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscodeOutcome {
    Finished,
    /// Cancelled while the process was running; no output was kept
    Cancelled,
}

/// Converts one audio file into another container/codec
#[async_trait]
pub trait Transcoder: Send + Sync {
    fn id(&self) -> &'static str;

    /// Convert `input` into `output`, overwriting it.
    ///
    /// Fails with [`SongloaderError::ConversionFailure`] carrying the tool's
    /// diagnostics when the conversion does not succeed.
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<TranscodeOutcome>;
}

/// Transcoder backed by the ffmpeg executable
pub struct FfmpegTranscoder {
    program: PathBuf,
}

impl FfmpegTranscoder {
    /// Use whichever ffmpeg is found on this machine
    pub fn new() -> Self {
        Self {
            program: find_tool(FFMPEG).unwrap_or_else(|| PathBuf::from(FFMPEG)),
        }
    }

    /// Use a specific ffmpeg executable
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Overwrite the output and drop every non-audio stream (cover art, video)
    pub fn build_args(input: &Path, output: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-vn".to_string(),
            output.to_string_lossy().to_string(),
        ]
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    fn id(&self) -> &'static str {
        "ffmpeg"
    }

    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<TranscodeOutcome> {
        let args = Self::build_args(input, output);
        debug!("Executing ffmpeg command: {} {}", self.program.display(), args.join(" "));

        let mut child = AsyncCommand::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                error!("Failed to start {}: {}", self.program.display(), e);
                SongloaderError::ToolMissing(FFMPEG.to_string())
            })?;

        // ffmpeg writes its whole log to stderr; keep draining it so the child never stalls
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf).await;
                String::from_utf8_lossy(&buf).trim().to_string()
            })
        });

        let status = tokio::select! {
            status = child.wait() => status?,
            _ = cancel.cancelled() => {
                warn!("Cancelling ffmpeg for {}", input.display());
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill ffmpeg: {}", e);
                }
                if let Err(e) = tokio::fs::remove_file(output).await {
                    debug!("No partial output to remove at {}: {}", output.display(), e);
                }
                return Ok(TranscodeOutcome::Cancelled);
            }
        };

        let stderr = match stderr_task {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };

        if status.success() {
            info!("Successfully converted: {}", output.display());
            Ok(TranscodeOutcome::Finished)
        } else {
            error!("FFmpeg error for {}: {}", input.display(), stderr);
            let reason = if stderr.is_empty() {
                format!("ffmpeg exited with {}", status)
            } else {
                stderr
            };
            Err(SongloaderError::ConversionFailure(reason).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_args() {
        let args = FfmpegTranscoder::build_args(
            Path::new("downloads/a.mp3"),
            Path::new("converted/a.flac"),
        );
        assert_eq!(
            args,
            vec!["-y", "-i", "downloads/a.mp3", "-vn", "converted/a.flac"]
        );
    }

    #[tokio::test]
    async fn test_missing_program_is_tool_missing() {
        let transcoder = FfmpegTranscoder::with_program("songloader-no-such-ffmpeg");
        let err = transcoder
            .transcode(
                Path::new("in.mp3"),
                Path::new("out.wav"),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SongloaderError>(),
            Some(SongloaderError::ToolMissing(_))
        ));
    }
}

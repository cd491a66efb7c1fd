//! Sequential conversion of a batch of files
//!
//! Items run strictly in the given order. One failure never aborts the
//! batch. Cancellation is checked before every item and also interrupts the
//! item in flight.

use crate::converter::ffmpeg::{TranscodeOutcome, Transcoder};
use crate::queue::job::JobProgress;
use crate::registry::FileRegistry;
use crate::utils::error::SongloaderError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Progress reported while a batch runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConversionEvent {
    /// Item `index` of `total` (1-based) is about to run
    Started {
        index: usize,
        total: usize,
        input: PathBuf,
        fraction: f32,
    },
    Converted {
        index: usize,
        total: usize,
        input: PathBuf,
        output: PathBuf,
    },
    Failed {
        index: usize,
        total: usize,
        input: PathBuf,
        reason: String,
    },
    /// Sent once after the last item, unless the batch was cancelled
    Finished { succeeded: usize, failed: usize },
}

/// Result of a batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    pub succeeded: Vec<PathBuf>,
    /// Inputs that could not be converted
    pub failed: Vec<PathBuf>,
    pub cancelled: bool,
}

impl BatchOutcome {
    /// Items that ran to a verdict
    pub fn processed(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Runs conversion batches into the converted directory
pub struct BatchRunner {
    transcoder: Arc<dyn Transcoder>,
    registry: Arc<FileRegistry>,
    converted_dir: PathBuf,
    supported_formats: Vec<String>,
}

impl BatchRunner {
    pub fn new(
        transcoder: Arc<dyn Transcoder>,
        registry: Arc<FileRegistry>,
        converted_dir: impl Into<PathBuf>,
        supported_formats: Vec<String>,
    ) -> Self {
        Self {
            transcoder,
            registry,
            converted_dir: converted_dir.into(),
            supported_formats,
        }
    }

    /// `<converted_dir>/<input stem>.<target_format>`
    pub fn output_path(&self, input: &Path, target_format: &str) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "output".to_string());
        self.converted_dir
            .join(format!("{}.{}", stem, target_format))
    }

    /// Convert `inputs` to `target_format`.
    ///
    /// Only an unsupported target format is an error; per-item problems are
    /// recorded in the outcome.
    pub async fn convert_batch(
        &self,
        inputs: &[PathBuf],
        target_format: &str,
        progress_tx: Option<mpsc::Sender<ConversionEvent>>,
        cancel: &CancellationToken,
    ) -> Result<BatchOutcome> {
        let target_format = target_format.trim().to_ascii_lowercase();
        if !self
            .supported_formats
            .iter()
            .any(|f| f.eq_ignore_ascii_case(&target_format))
        {
            return Err(SongloaderError::UnsupportedFormat(target_format).into());
        }

        let total = inputs.len();
        let mut outcome = BatchOutcome::default();
        let mut progress = JobProgress::new();
        info!("Converting {} files to {}", total, target_format);

        for (i, input) in inputs.iter().enumerate() {
            let index = i + 1;
            if cancel.is_cancelled() {
                info!("Conversion cancelled before item {}/{}", index, total);
                outcome.cancelled = true;
                break;
            }

            if !tokio::fs::try_exists(input).await.unwrap_or(false) {
                error!("File not found: {}", input.display());
                outcome.failed.push(input.clone());
                emit(
                    &progress_tx,
                    ConversionEvent::Failed {
                        index,
                        total,
                        input: input.clone(),
                        reason: SongloaderError::NotFound(input.clone()).to_string(),
                    },
                )
                .await;
                continue;
            }

            progress.advance_to_item(index, total);
            emit(
                &progress_tx,
                ConversionEvent::Started {
                    index,
                    total,
                    input: input.clone(),
                    fraction: progress.fraction(),
                },
            )
            .await;

            match self.convert_one(input, &target_format, cancel).await {
                Ok(Some(output)) => {
                    self.registry.append(output.clone());
                    outcome.succeeded.push(output.clone());
                    emit(
                        &progress_tx,
                        ConversionEvent::Converted {
                            index,
                            total,
                            input: input.clone(),
                            output,
                        },
                    )
                    .await;
                }
                Ok(None) => {
                    info!("Conversion cancelled during {}", input.display());
                    outcome.cancelled = true;
                    break;
                }
                Err(e) => {
                    outcome.failed.push(input.clone());
                    emit(
                        &progress_tx,
                        ConversionEvent::Failed {
                            index,
                            total,
                            input: input.clone(),
                            reason: format!("{:#}", e),
                        },
                    )
                    .await;
                }
            }
        }

        info!(
            "Conversion batch done: {} converted, {} failed{}",
            outcome.succeeded.len(),
            outcome.failed.len(),
            if outcome.cancelled { " (cancelled)" } else { "" }
        );

        if !outcome.cancelled {
            emit(
                &progress_tx,
                ConversionEvent::Finished {
                    succeeded: outcome.succeeded.len(),
                    failed: outcome.failed.len(),
                },
            )
            .await;
        }

        Ok(outcome)
    }

    /// `Ok(None)` means the item was cancelled mid-flight
    async fn convert_one(
        &self,
        input: &Path,
        target_format: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<PathBuf>> {
        let input_ext = input
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if input_ext == target_format {
            warn!(
                "{} is already {}. Skipping conversion.",
                input.display(),
                target_format
            );
            return Ok(Some(input.to_path_buf()));
        }

        tokio::fs::create_dir_all(&self.converted_dir).await?;
        let output = self.output_path(input, target_format);
        debug!("Converting {} -> {}", input.display(), output.display());

        match self.transcoder.transcode(input, &output, cancel).await? {
            TranscodeOutcome::Finished => Ok(Some(output)),
            TranscodeOutcome::Cancelled => Ok(None),
        }
    }
}

async fn emit(progress_tx: &Option<mpsc::Sender<ConversionEvent>>, event: ConversionEvent) {
    if let Some(tx) = progress_tx {
        // Best-effort: a closed receiver must not fail the batch
        let _ = tx.send(event).await;
    }
}

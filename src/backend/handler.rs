//! Runs queued jobs on the download orchestrator and the conversion batch runner

use crate::converter::{BatchRunner, ConversionEvent};
use crate::downloader::DownloadOrchestrator;
use crate::queue::{Job, JobEvent, JobHandler, JobKind, JobReporter};
use crate::sources::DownloadRequest;
use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

pub struct JobRunner {
    orchestrator: Arc<DownloadOrchestrator>,
    batch: Arc<BatchRunner>,
}

impl JobRunner {
    pub fn new(orchestrator: Arc<DownloadOrchestrator>, batch: Arc<BatchRunner>) -> Self {
        Self { orchestrator, batch }
    }

    async fn download(
        &self,
        job: &Job,
        request: &DownloadRequest,
        reporter: &JobReporter,
    ) -> Result<Vec<PathBuf>> {
        let (status_tx, mut status_rx) = watch::channel(String::new());
        let orchestrator = &self.orchestrator;

        // The sender moves into the download so the forwarder ends with it
        let download = async move { orchestrator.download(request, &status_tx).await };
        let forward = async {
            while status_rx.changed().await.is_ok() {
                let message = status_rx.borrow_and_update().clone();
                reporter.status(message).await;
            }
        };

        let work = async { tokio::join!(download, forward).0 };

        tokio::select! {
            result = work => Ok(vec![result?]),
            _ = job.cancel.cancelled() => {
                info!("Download job {} cancelled", job.id);
                Ok(Vec::new())
            }
        }
    }

    async fn convert(
        &self,
        job: &Job,
        inputs: &[PathBuf],
        target_format: &str,
        reporter: &JobReporter,
    ) -> Result<Vec<PathBuf>> {
        let (progress_tx, mut progress_rx) = mpsc::channel::<ConversionEvent>(32);
        let batch = &self.batch;
        let cancel = &job.cancel;

        let run = async move {
            batch
                .convert_batch(inputs, target_format, Some(progress_tx), cancel)
                .await
        };
        let forward = async {
            while let Some(event) = progress_rx.recv().await {
                forward_conversion_event(reporter, event).await;
            }
        };

        let (outcome, ()) = tokio::join!(run, forward);
        let outcome = outcome?;
        debug!(
            "Job {} converted {} of {} files",
            job.id,
            outcome.succeeded.len(),
            inputs.len()
        );
        Ok(outcome.succeeded)
    }
}

async fn forward_conversion_event(reporter: &JobReporter, event: ConversionEvent) {
    let job_id = reporter.job_id();
    match event {
        ConversionEvent::Started {
            index,
            total,
            input,
            fraction,
        } => {
            let name = input
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            reporter
                .status(format!("Converting {}/{}: {}", index, total, name))
                .await;
            reporter.progress(fraction).await;
        }
        ConversionEvent::Converted { input, output, .. } => {
            reporter
                .report(JobEvent::item_converted(job_id, input, output))
                .await;
        }
        ConversionEvent::Failed { input, reason, .. } => {
            reporter
                .report(JobEvent::item_failed(job_id, input, reason))
                .await;
        }
        ConversionEvent::Finished { succeeded, failed } => {
            reporter
                .status(format!(
                    "Conversion completed: {} succeeded, {} failed",
                    succeeded, failed
                ))
                .await;
        }
    }
}

#[async_trait]
impl JobHandler for JobRunner {
    async fn run(&self, job: &Job, reporter: &JobReporter) -> Result<Vec<PathBuf>> {
        match &job.kind {
            JobKind::Download(request) => self.download(job, request, reporter).await,
            JobKind::Convert {
                inputs,
                target_format,
            } => self.convert(job, inputs, target_format, reporter).await,
        }
    }
}

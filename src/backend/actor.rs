use super::handler::JobRunner;
use super::messages::{BackendCommand, BackendEvent};
use crate::converter::{BatchRunner, FfmpegTranscoder, Transcoder};
use crate::downloader::DownloadOrchestrator;
use crate::queue::{JobEvent, JobKind, WorkerPool};
use crate::registry::FileRegistry;
use crate::sources::{SpotdlSource, TrackSource, YandexConnector, YandexSource};
use crate::utils::config::AppConfig;
use crate::utils::error::SongloaderError;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Capacity of the channel carrying job events out of the pool
const JOB_EVENT_BUFFER: usize = 100;

/// Owns configuration, registry, sources and workers.
///
/// The front end talks to it only through [`BackendCommand`]s and listens
/// for [`BackendEvent`]s; nothing here ever blocks the front end.
pub struct BackendActor {
    receiver: mpsc::Receiver<BackendCommand>,
    sender: mpsc::Sender<BackendEvent>,

    config: AppConfig,
    registry: Arc<FileRegistry>,
    pool: WorkerPool,
    forwarder: JoinHandle<()>,
}

impl BackendActor {
    /// Backend wired to spotdl, the Yandex Music API and ffmpeg
    pub fn new(
        config: AppConfig,
        receiver: mpsc::Receiver<BackendCommand>,
        sender: mpsc::Sender<BackendEvent>,
    ) -> Self {
        let spotdl: Arc<dyn TrackSource> = Arc::new(SpotdlSource::new(
            config.spotify_bitrate.clone(),
            config.spotify_threads,
        ));
        let yandex: Arc<dyn TrackSource> = Arc::new(YandexSource::new(Arc::new(
            YandexConnector::new(config.yandex_bitrate_kbps),
        )));
        let transcoder: Arc<dyn Transcoder> = Arc::new(FfmpegTranscoder::new());

        Self::with_parts(config, vec![spotdl, yandex], transcoder, receiver, sender)
    }

    /// Backend over caller-supplied sources and transcoder
    pub fn with_parts(
        config: AppConfig,
        sources: Vec<Arc<dyn TrackSource>>,
        transcoder: Arc<dyn Transcoder>,
        receiver: mpsc::Receiver<BackendCommand>,
        sender: mpsc::Sender<BackendEvent>,
    ) -> Self {
        let registry = Arc::new(FileRegistry::from_config(&config));

        let mut orchestrator = DownloadOrchestrator::new(registry.clone(), config.output_dir());
        for source in sources {
            orchestrator.register(source);
        }
        let batch = BatchRunner::new(
            transcoder,
            registry.clone(),
            config.converted_dir(),
            config.supported_formats.clone(),
        );
        let runner = Arc::new(JobRunner::new(Arc::new(orchestrator), Arc::new(batch)));

        let (job_tx, mut job_rx) = mpsc::channel::<JobEvent>(JOB_EVENT_BUFFER);
        let pool = WorkerPool::new(
            runner,
            config.max_concurrent_downloads,
            config.queue_depth,
            job_tx,
        );

        // A completed job changed the file list; follow it with the new rows
        let events = sender.clone();
        let rows_from = registry.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = job_rx.recv().await {
                let refresh = matches!(event, JobEvent::Completed { .. });
                if events.send(BackendEvent::Job(event)).await.is_err() {
                    continue;
                }
                if refresh {
                    let _ = events.send(BackendEvent::FilesRefreshed(rows_from.rows())).await;
                }
            }
        });

        Self {
            receiver,
            sender,
            config,
            registry,
            pool,
            forwarder,
        }
    }

    pub fn registry(&self) -> Arc<FileRegistry> {
        self.registry.clone()
    }

    /// Process commands until `Shutdown` or until the front end goes away.
    ///
    /// Queued jobs are drained before returning. The configuration is handed
    /// back so the caller can persist it.
    pub async fn run(mut self) -> AppConfig {
        info!("BackendActor started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                BackendCommand::Download(request) => {
                    self.submit(JobKind::Download(request)).await;
                }
                BackendCommand::ConvertSelected { target_format } => {
                    self.handle_convert(target_format).await;
                }
                BackendCommand::CancelJob(id) => {
                    if !self.pool.cancel(id) {
                        warn!("Job {} is not running", id);
                    }
                }
                BackendCommand::CancelAll => {
                    self.pool.cancel_all();
                }
                BackendCommand::Refresh => {
                    self.handle_refresh().await;
                }
                BackendCommand::Clear => {
                    self.registry.clear();
                    self.send_rows().await;
                }
                BackendCommand::Select(paths) => {
                    let count = self.registry.select(&paths[..]);
                    if count < paths.len() {
                        warn!(
                            "{} of {} paths are not in the file list",
                            paths.len() - count,
                            paths.len()
                        );
                    }
                    self.send_rows().await;
                }
                BackendCommand::SelectAll => {
                    self.registry.select_all();
                    self.send_rows().await;
                }
                BackendCommand::Shutdown => {
                    info!("BackendActor shutting down");
                    break;
                }
            }
        }

        self.pool.shutdown().await;
        if let Err(e) = self.forwarder.await {
            error!("Event forwarder panicked: {}", e);
        }
        let _ = self.sender.send(BackendEvent::Stopped).await;
        self.config
    }

    async fn submit(&self, kind: JobKind) {
        if let Err(e) = self.pool.submit(kind).await {
            match e.downcast_ref::<SongloaderError>() {
                Some(SongloaderError::QueueFull(capacity)) => {
                    let _ = self
                        .sender
                        .send(BackendEvent::QueueFull {
                            capacity: *capacity,
                        })
                        .await;
                }
                _ => self.send_error(format!("{:#}", e)).await,
            }
        }
    }

    async fn handle_convert(&self, target_format: Option<String>) {
        let inputs = self.registry.selected();
        if inputs.is_empty() {
            self.send_error("Please select files to convert".to_string()).await;
            return;
        }

        let target_format = target_format
            .unwrap_or_else(|| self.config.default_format.clone())
            .to_ascii_lowercase();
        if !self.config.supports_format(&target_format) {
            self.send_error(SongloaderError::UnsupportedFormat(target_format).to_string())
                .await;
            return;
        }

        self.submit(JobKind::Convert {
            inputs,
            target_format,
        })
        .await;
    }

    async fn handle_refresh(&self) {
        match self.registry.refresh().await {
            Ok(rows) => {
                let _ = self.sender.send(BackendEvent::FilesRefreshed(rows)).await;
            }
            Err(e) => {
                error!("Error refreshing file list: {:#}", e);
                self.send_error(format!("Error refreshing file list: {:#}", e)).await;
            }
        }
    }

    async fn send_rows(&self) {
        let _ = self
            .sender
            .send(BackendEvent::FilesRefreshed(self.registry.rows()))
            .await;
    }

    async fn send_error(&self, message: String) {
        let _ = self.sender.send(BackendEvent::Error(message)).await;
    }
}

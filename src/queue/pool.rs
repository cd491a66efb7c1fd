//! Bounded worker pool
//!
//! A fixed number of workers pull jobs from one bounded queue. Submitting to
//! a full queue fails immediately with [`SongloaderError::QueueFull`]; nothing
//! ever waits for space.

use crate::queue::events::JobEvent;
use crate::queue::job::{JobId, JobKind, JobStatus};
use crate::utils::error::SongloaderError;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A unit of work waiting for or running on a worker
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub cancel: CancellationToken,
}

/// Sends a job's intermediate events back to the front end
#[derive(Debug, Clone)]
pub struct JobReporter {
    job_id: JobId,
    events: mpsc::Sender<JobEvent>,
}

impl JobReporter {
    pub fn new(job_id: JobId, events: mpsc::Sender<JobEvent>) -> Self {
        Self { job_id, events }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Best-effort: a vanished listener never fails the job
    pub async fn report(&self, event: JobEvent) {
        if self.events.send(event).await.is_err() {
            debug!("Event listener gone; dropping event for job {}", self.job_id);
        }
    }

    pub async fn status(&self, message: impl Into<String>) {
        self.report(JobEvent::status(self.job_id, message)).await;
    }

    pub async fn progress(&self, fraction: f32) {
        self.report(JobEvent::progress(self.job_id, fraction)).await;
    }
}

/// Runs the jobs a pool hands out
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    /// Run one job to completion and return the files it produced.
    ///
    /// A handler observing `job.cancel` should return early with `Ok`; the
    /// pool reports such a job as cancelled.
    async fn run(&self, job: &Job, reporter: &JobReporter) -> Result<Vec<PathBuf>>;
}

/// Finished jobs whose status stays queryable
pub const FINISHED_HISTORY: usize = 64;

/// Live jobs plus a bounded tail of finished ones
#[derive(Default)]
struct JobTable {
    entries: HashMap<JobId, (JobStatus, CancellationToken)>,
    finished: VecDeque<JobId>,
}

impl JobTable {
    fn insert(&mut self, id: JobId, token: CancellationToken) {
        self.entries.insert(id, (JobStatus::Queued, token));
    }

    fn set(&mut self, id: JobId, status: JobStatus) {
        let finished = status.is_finished();
        let Some(entry) = self.entries.get_mut(&id) else {
            return;
        };
        entry.0 = status;
        if finished {
            self.finished.push_back(id);
            while self.finished.len() > FINISHED_HISTORY {
                if let Some(oldest) = self.finished.pop_front() {
                    self.entries.remove(&oldest);
                }
            }
        }
    }
}

type Statuses = Arc<Mutex<JobTable>>;

/// Fixed-size pool of workers over a bounded queue
pub struct WorkerPool {
    sender: Option<mpsc::Sender<Job>>,
    events: mpsc::Sender<JobEvent>,
    workers: Vec<JoinHandle<()>>,
    statuses: Statuses,
    root: CancellationToken,
    queue_depth: usize,
}

impl WorkerPool {
    /// Spawn `workers` workers sharing a queue of `queue_depth` slots
    pub fn new(
        handler: Arc<dyn JobHandler>,
        workers: usize,
        queue_depth: usize,
        events: mpsc::Sender<JobEvent>,
    ) -> Self {
        let workers = workers.max(1);
        let queue_depth = queue_depth.max(1);
        let (sender, receiver) = mpsc::channel::<Job>(queue_depth);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let statuses: Statuses = Arc::new(Mutex::new(JobTable::default()));

        info!("Starting {} workers with queue depth {}", workers, queue_depth);

        let handles = (0..workers)
            .map(|worker| {
                let receiver = Arc::clone(&receiver);
                let handler = Arc::clone(&handler);
                let events = events.clone();
                let statuses = Arc::clone(&statuses);
                tokio::spawn(async move {
                    worker_loop(worker, receiver, handler, events, statuses).await;
                })
            })
            .collect();

        Self {
            sender: Some(sender),
            events,
            workers: handles,
            statuses,
            root: CancellationToken::new(),
            queue_depth,
        }
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Jobs accepted but not yet picked up by a worker
    pub fn queued(&self) -> usize {
        self.sender
            .as_ref()
            .map_or(0, |s| s.max_capacity() - s.capacity())
    }

    /// Enqueue a job, failing with `QueueFull` when no slot is free
    pub async fn submit(&self, kind: JobKind) -> Result<JobId> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("worker pool is shut down"))?;

        // Reserve first so a rejected job never shows up as queued
        let permit = match sender.try_reserve() {
            Ok(permit) => permit,
            Err(mpsc::error::TrySendError::Full(())) => {
                warn!("Job queue is full ({} slots)", self.queue_depth);
                return Err(SongloaderError::QueueFull(self.queue_depth).into());
            }
            Err(mpsc::error::TrySendError::Closed(())) => {
                return Err(anyhow::anyhow!("worker pool is shut down"));
            }
        };

        let job = Job {
            id: JobId::new(),
            kind,
            cancel: self.root.child_token(),
        };
        let id = job.id;
        info!("Queued job {}: {}", id, job.kind.label());

        lock(&self.statuses).insert(id, job.cancel.clone());
        let _ = self.events.send(JobEvent::queued(id, job.kind.label())).await;
        permit.send(job);

        Ok(id)
    }

    /// Request cancellation of a queued or running job
    pub fn cancel(&self, id: JobId) -> bool {
        match lock(&self.statuses).entries.get(&id) {
            Some((status, token)) if !status.is_finished() => {
                info!("Cancelling job {}", id);
                token.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn cancel_all(&self) {
        self.root.cancel();
    }

    /// Status of a live job or one of the last [`FINISHED_HISTORY`] finished ones
    pub fn status(&self, id: JobId) -> Option<JobStatus> {
        lock(&self.statuses)
            .entries
            .get(&id)
            .map(|(status, _)| status.clone())
    }

    /// Jobs whose status is still held
    pub fn tracked(&self) -> usize {
        lock(&self.statuses).entries.len()
    }

    /// Stop accepting jobs and wait for the queued ones to drain
    pub async fn shutdown(mut self) {
        self.sender.take();
        for handle in self.workers.drain(..) {
            if let Err(e) = handle.await {
                error!("Worker task panicked: {}", e);
            }
        }
        info!("Worker pool stopped");
    }
}

fn lock(statuses: &Statuses) -> std::sync::MutexGuard<'_, JobTable> {
    statuses.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn set_status(statuses: &Statuses, id: JobId, status: JobStatus) {
    lock(statuses).set(id, status);
}

async fn worker_loop(
    worker: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>,
    handler: Arc<dyn JobHandler>,
    events: mpsc::Sender<JobEvent>,
    statuses: Statuses,
) {
    debug!("Worker {} started", worker);
    loop {
        let job = {
            let mut receiver = receiver.lock().await;
            receiver.recv().await
        };
        let Some(job) = job else { break };

        let terminal = if job.cancel.is_cancelled() {
            info!("Job {} cancelled before it started", job.id);
            JobEvent::cancelled(job.id)
        } else {
            set_status(&statuses, job.id, JobStatus::Running);
            let _ = events.send(JobEvent::started(job.id)).await;
            debug!("Worker {} running job {}", worker, job.id);

            let reporter = JobReporter::new(job.id, events.clone());
            match handler.run(&job, &reporter).await {
                Ok(_) if job.cancel.is_cancelled() => {
                    info!("Job {} cancelled", job.id);
                    JobEvent::cancelled(job.id)
                }
                Ok(outputs) => {
                    info!("Job {} completed", job.id);
                    JobEvent::completed(job.id, outputs)
                }
                Err(e) => {
                    error!("Job {} failed: {:#}", job.id, e);
                    JobEvent::failed(job.id, format!("{:#}", e))
                }
            }
        };

        if let Some(status) = terminal.job_status() {
            set_status(&statuses, job.id, status);
        }
        let _ = events.send(terminal).await;
    }
    debug!("Worker {} stopped", worker);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{DownloadRequest, Platform};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn download(url: &str) -> JobKind {
        JobKind::Download(DownloadRequest::new(Platform::Spotify, url))
    }

    /// Blocks every job until `gate` is cancelled
    struct GatedHandler {
        gate: CancellationToken,
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl JobHandler for GatedHandler {
        async fn run(&self, job: &Job, reporter: &JobReporter) -> Result<Vec<PathBuf>> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            reporter.status("working").await;
            tokio::select! {
                _ = self.gate.cancelled() => {}
                _ = job.cancel.cancelled() => {}
            }
            self.running.fetch_sub(1, Ordering::SeqCst);
            if let JobKind::Download(request) = &job.kind {
                if request.url.contains("fail") {
                    anyhow::bail!(SongloaderError::DownloadFailure("nope".into()));
                }
            }
            Ok(vec![PathBuf::from("out.mp3")])
        }
    }

    fn gated() -> Arc<GatedHandler> {
        Arc::new(GatedHandler {
            gate: CancellationToken::new(),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    async fn wait_for_terminal(rx: &mut mpsc::Receiver<JobEvent>, count: usize) -> Vec<JobEvent> {
        let mut terminal = Vec::new();
        while terminal.len() < count {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for job events")
                .expect("event channel closed");
            if event.is_terminal() {
                terminal.push(event);
            }
        }
        terminal
    }

    #[tokio::test]
    async fn test_full_queue_is_rejected() {
        let handler = gated();
        let (tx, _rx) = mpsc::channel(64);
        let pool = WorkerPool::new(handler.clone(), 1, 2, tx);

        // One running, two queued
        pool.submit(download("a")).await.unwrap();
        while handler.running.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        pool.submit(download("b")).await.unwrap();
        pool.submit(download("c")).await.unwrap();

        let err = pool.submit(download("d")).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SongloaderError>(),
            Some(SongloaderError::QueueFull(2))
        ));
        assert_eq!(pool.queued(), 2);

        handler.gate.cancel();
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_worker_count() {
        let handler = gated();
        let (tx, mut rx) = mpsc::channel(256);
        let pool = WorkerPool::new(handler.clone(), 3, 16, tx);

        for i in 0..10 {
            pool.submit(download(&format!("t{}", i))).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        handler.gate.cancel();

        let terminal = wait_for_terminal(&mut rx, 10).await;
        assert!(terminal
            .iter()
            .all(|e| matches!(e, JobEvent::Completed { .. })));
        assert!(handler.peak.load(Ordering::SeqCst) <= 3);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_failure_and_cancellation_are_reported() {
        let handler = gated();
        let (tx, mut rx) = mpsc::channel(64);
        let pool = WorkerPool::new(handler.clone(), 2, 4, tx);

        let failing = pool.submit(download("fail")).await.unwrap();
        let cancelled = pool.submit(download("slow")).await.unwrap();
        while handler.running.load(Ordering::SeqCst) < 2 {
            tokio::task::yield_now().await;
        }

        assert!(pool.cancel(cancelled));
        let first = wait_for_terminal(&mut rx, 1).await;
        assert!(matches!(first[0], JobEvent::Cancelled { job_id, .. } if job_id == cancelled));
        assert_eq!(pool.status(cancelled), Some(JobStatus::Cancelled));
        assert!(!pool.cancel(cancelled));

        handler.gate.cancel();
        let second = wait_for_terminal(&mut rx, 1).await;
        assert_eq!(second[0].job_id(), failing);
        assert!(matches!(pool.status(failing), Some(JobStatus::Failed(_))));
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_cancelled_before_start_never_runs() {
        let handler = gated();
        let (tx, mut rx) = mpsc::channel(64);
        let pool = WorkerPool::new(handler.clone(), 1, 4, tx);

        let first = pool.submit(download("a")).await.unwrap();
        while handler.running.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        let waiting = pool.submit(download("b")).await.unwrap();
        assert!(pool.cancel(waiting));
        handler.gate.cancel();

        let terminal = wait_for_terminal(&mut rx, 2).await;
        assert_eq!(terminal[0].job_id(), first);
        assert!(matches!(terminal[1], JobEvent::Cancelled { .. }));
        assert_eq!(handler.peak.load(Ordering::SeqCst), 1);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_submit_after_events_dropped_still_runs() {
        let handler = gated();
        handler.gate.cancel();
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let pool = WorkerPool::new(handler.clone(), 1, 1, tx);

        let id = pool.submit(download("a")).await.unwrap();
        let pool_status = loop {
            match pool.status(id) {
                Some(status) if status.is_finished() => break status,
                _ => tokio::task::yield_now().await,
            }
        };
        assert_eq!(pool_status, JobStatus::Completed);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_finished_jobs_are_forgotten_beyond_history() {
        const JOBS: usize = 500;
        let handler = gated();
        handler.gate.cancel();
        let (tx, mut rx) = mpsc::channel(4 * JOBS);
        let pool = WorkerPool::new(handler, 2, JOBS, tx);

        let mut ids = Vec::with_capacity(JOBS);
        for i in 0..JOBS {
            ids.push(pool.submit(download(&format!("t{}", i))).await.unwrap());
        }
        wait_for_terminal(&mut rx, JOBS).await;

        assert_eq!(pool.tracked(), FINISHED_HISTORY);
        let remembered = ids.iter().filter(|id| pool.status(**id).is_some()).count();
        assert_eq!(remembered, FINISHED_HISTORY);
        assert!(!pool.cancel(ids[0]));
        pool.shutdown().await;
    }
}

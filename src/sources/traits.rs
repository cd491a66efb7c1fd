use crate::sources::models::{DownloadRequest, Platform};
use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::watch;

/// Core trait for all track sources
///
/// This trait isolates the orchestrator from the specific fetch method
/// (external process, HTTP client library, ...).
#[async_trait]
pub trait TrackSource: Send + Sync {
    /// Returns a unique identifier for this source (e.g., "spotdl", "yandex-api")
    fn id(&self) -> &'static str;

    /// The platform tag this source serves
    fn platform(&self) -> Platform;

    /// Fetch the track into `output_dir` and return the written file.
    ///
    /// `status` always holds the latest human-readable progress line.
    async fn fetch(
        &self,
        request: &DownloadRequest,
        output_dir: &Path,
        status: &watch::Sender<String>,
    ) -> Result<PathBuf>;
}

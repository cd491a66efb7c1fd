use crate::registry::FileRegistry;
use crate::sources::{DownloadRequest, Platform, TrackSource};
use crate::utils::error::SongloaderError;
use anyhow::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Routes download requests to the source serving their platform
///
/// Every successful download is appended to the shared registry.
pub struct DownloadOrchestrator {
    sources: HashMap<Platform, Arc<dyn TrackSource>>,
    registry: Arc<FileRegistry>,
    output_dir: PathBuf,
}

impl DownloadOrchestrator {
    pub fn new(registry: Arc<FileRegistry>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            sources: HashMap::new(),
            registry,
            output_dir: output_dir.into(),
        }
    }

    /// Register `source` for its platform, replacing any previous one
    pub fn with_source(mut self, source: Arc<dyn TrackSource>) -> Self {
        self.register(source);
        self
    }

    pub fn register(&mut self, source: Arc<dyn TrackSource>) {
        debug!("Registering source {} for {}", source.id(), source.platform());
        self.sources.insert(source.platform(), source);
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn supports(&self, platform: Platform) -> bool {
        self.sources.contains_key(&platform)
    }

    fn find_source(&self, platform: Platform) -> Result<&Arc<dyn TrackSource>> {
        self.sources.get(&platform).ok_or_else(|| {
            SongloaderError::InvalidUrl(format!("no source registered for {}", platform.label()))
                .into()
        })
    }

    /// Fetch one track and register the written file
    pub async fn download(
        &self,
        request: &DownloadRequest,
        status: &watch::Sender<String>,
    ) -> Result<PathBuf> {
        if request.url.is_empty() {
            status.send_replace("Please enter a URL".to_string());
            return Err(SongloaderError::InvalidUrl("empty URL".into()).into());
        }

        let source = self.find_source(request.platform)?;
        debug!("Routing {} to source {}", request.url, source.id());

        match source.fetch(request, &self.output_dir, status).await {
            Ok(path) => {
                if self.registry.append(path.clone()) {
                    debug!("Registered {}", path.display());
                }
                info!("Downloaded {} from {}", path.display(), request.platform.label());
                Ok(path)
            }
            Err(e) => {
                error!("Error downloading {}: {:#}", request.url, e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// Writes `<output_dir>/<last url segment>.mp3`
    struct StubSource {
        platform: Platform,
    }

    #[async_trait]
    impl TrackSource for StubSource {
        fn id(&self) -> &'static str {
            "stub"
        }

        fn platform(&self) -> Platform {
            self.platform
        }

        async fn fetch(
            &self,
            request: &DownloadRequest,
            output_dir: &Path,
            status: &watch::Sender<String>,
        ) -> Result<PathBuf> {
            if request.url.contains("broken") {
                status.send_replace("Download failed".to_string());
                return Err(SongloaderError::DownloadFailure("stub refused".into()).into());
            }
            tokio::fs::create_dir_all(output_dir).await?;
            let name = request.url.rsplit('/').next().unwrap_or("track");
            let path = output_dir.join(format!("{}.mp3", name));
            tokio::fs::write(&path, b"mp3").await?;
            status.send_replace("Download completed".to_string());
            Ok(path)
        }
    }

    fn orchestrator(temp: &TempDir) -> (DownloadOrchestrator, Arc<FileRegistry>) {
        let out = temp.path().join("downloads");
        let registry = Arc::new(FileRegistry::new(&out, temp.path().join("converted")));
        let orchestrator = DownloadOrchestrator::new(registry.clone(), out).with_source(Arc::new(
            StubSource {
                platform: Platform::Spotify,
            },
        ));
        (orchestrator, registry)
    }

    #[tokio::test]
    async fn test_success_appends_to_registry() {
        let temp = TempDir::new().unwrap();
        let (orchestrator, registry) = orchestrator(&temp);
        let (status, rx) = watch::channel(String::new());

        let request = DownloadRequest::new(Platform::Spotify, "https://open.spotify.com/track/abc");
        let path = orchestrator.download(&request, &status).await.unwrap();

        assert_eq!(path, temp.path().join("downloads/abc.mp3"));
        assert_eq!(registry.len(), 1);
        assert_eq!(*rx.borrow(), "Download completed");
    }

    #[tokio::test]
    async fn test_repeat_download_does_not_duplicate_entry() {
        let temp = TempDir::new().unwrap();
        let (orchestrator, registry) = orchestrator(&temp);
        let (status, _rx) = watch::channel(String::new());
        let request = DownloadRequest::new(Platform::Spotify, "https://open.spotify.com/track/abc");

        orchestrator.download(&request, &status).await.unwrap();
        orchestrator.download(&request, &status).await.unwrap();

        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_failure_leaves_registry_untouched() {
        let temp = TempDir::new().unwrap();
        let (orchestrator, registry) = orchestrator(&temp);
        let (status, _rx) = watch::channel(String::new());

        let request = DownloadRequest::new(Platform::Spotify, "https://open.spotify.com/track/broken");
        let err = orchestrator.download(&request, &status).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<SongloaderError>(),
            Some(SongloaderError::DownloadFailure(_))
        ));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_unregistered_platform_is_rejected() {
        let temp = TempDir::new().unwrap();
        let (orchestrator, _) = orchestrator(&temp);
        let (status, _rx) = watch::channel(String::new());

        assert!(!orchestrator.supports(Platform::Yandex));
        let request = DownloadRequest::new(Platform::Yandex, "https://music.yandex.ru/track/1");
        assert!(orchestrator.download(&request, &status).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_url_is_rejected() {
        let temp = TempDir::new().unwrap();
        let (orchestrator, _) = orchestrator(&temp);
        let (status, rx) = watch::channel(String::new());

        let request = DownloadRequest::new(Platform::Spotify, "   ");
        let err = orchestrator.download(&request, &status).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SongloaderError>(),
            Some(SongloaderError::InvalidUrl(_))
        ));
        assert_eq!(*rx.borrow(), "Please enter a URL");
    }
}

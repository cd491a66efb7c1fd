//! Yandex Music source
//!
//! Tracks are resolved and fetched through the Yandex Music HTTP API. The
//! client is created lazily from the first token supplied and then reused
//! for every later download.

use crate::sources::models::{DownloadRequest, Platform, TrackInfo};
use crate::sources::traits::TrackSource;
use crate::utils::error::SongloaderError;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use md5::{Digest, Md5};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::{watch, OnceCell};
use tracing::{debug, error, info, warn};

pub const API_BASE: &str = "https://api.music.yandex.net";
const SIGN_SALT: &str = "XGRlBW9FXlekgbPrRHuSiA";
const TRACK_CODEC: &str = "mp3";

/// The part of a music catalog the downloader needs
#[async_trait]
pub trait MusicCatalog: Send + Sync {
    /// Resolve a track id to its metadata
    async fn track(&self, track_id: &str) -> Result<TrackInfo>;

    /// Write the audio of `track` to `destination`
    async fn download(&self, track: &TrackInfo, destination: &Path) -> Result<()>;
}

/// Creates an authenticated catalog client from a token
#[async_trait]
pub trait CatalogConnector: Send + Sync {
    async fn connect(&self, token: &str) -> Result<Arc<dyn MusicCatalog>>;
}

// ============================================================
// API payloads
// ============================================================

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct AccountStatus {
    account: Account,
}

#[derive(Debug, Deserialize)]
struct Account {
    uid: Option<u64>,
    login: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiTrack {
    title: String,
    #[serde(default)]
    artists: Vec<ApiArtist>,
    #[serde(default = "default_available")]
    available: bool,
}

fn default_available() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct ApiArtist {
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadInfo {
    codec: String,
    bitrate_in_kbps: u32,
    download_info_url: String,
}

/// Fields of the download-info XML document
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename = "download-info")]
pub struct DirectLinkParts {
    pub host: String,
    pub path: String,
    pub ts: String,
    pub s: String,
}

impl DirectLinkParts {
    /// Parse `<download-info><host>..</host><path>..</path><ts>..</ts><s>..</s></download-info>`
    pub fn parse(xml: &str) -> Result<Self> {
        quick_xml::de::from_str(xml).context("Malformed download info")
    }

    /// Signed link to the audio stream
    pub fn direct_url(&self, codec: &str) -> String {
        let path_tail = self.path.strip_prefix('/').unwrap_or(&self.path);
        let mut hasher = Md5::new();
        hasher.update(SIGN_SALT.as_bytes());
        hasher.update(path_tail.as_bytes());
        hasher.update(self.s.as_bytes());
        let sign = hex::encode(hasher.finalize());
        format!(
            "https://{}/get-{}/{}/{}{}",
            self.host, codec, sign, self.ts, self.path
        )
    }
}

/// Stream `chunks` into `destination` through a `.part` side file.
///
/// The side file is removed on any error, so a broken transfer never looks
/// like a finished track. Returns the number of bytes written.
async fn save_stream<S, B, E>(chunks: S, destination: &Path) -> Result<u64>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::error::Error + Send + Sync + 'static,
{
    let partial = destination.with_extension("part");
    let result: Result<u64> = async {
        let mut file = File::create(&partial).await?;
        let mut chunks = std::pin::pin!(chunks);
        let mut written = 0u64;
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            file.write_all(chunk.as_ref()).await?;
            written += chunk.as_ref().len() as u64;
        }
        file.flush().await?;
        drop(file);
        tokio::fs::rename(&partial, destination).await?;
        Ok(written)
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(&partial).await;
    }
    result
}

/// Extract a track id from a Yandex Music URL or accept a bare id.
///
/// Accepted forms: `https://music.yandex.ru/album/<album>/track/<id>`,
/// `https://music.yandex.com/track/<id>`, `<id>` and `<id>:<album>`.
pub fn extract_track_id(input: &str) -> Result<String, SongloaderError> {
    let input = input.trim();
    let is_id = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());

    if let Some((track, album)) = input.split_once(':') {
        if is_id(track) && is_id(album) {
            return Ok(track.to_string());
        }
    }
    if is_id(input) {
        return Ok(input.to_string());
    }

    let url = Url::parse(input).map_err(|_| SongloaderError::InvalidUrl(input.to_string()))?;
    let segments: Vec<&str> = url.path_segments().map(|s| s.collect()).unwrap_or_default();
    segments
        .windows(2)
        .find(|pair| pair[0] == "track" && is_id(pair[1]))
        .map(|pair| pair[1].to_string())
        .ok_or_else(|| SongloaderError::InvalidUrl(input.to_string()))
}

// ============================================================
// HTTP client
// ============================================================

/// Authenticated Yandex Music API client
pub struct YandexClient {
    http: Client,
    base_url: String,
    bitrate_kbps: u32,
}

impl YandexClient {
    pub fn new(token: &str, base_url: &str, bitrate_kbps: u32) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("OAuth {}", token))
            .map_err(|_| SongloaderError::AuthFailure("token contains invalid characters".into()))?;
        headers.insert(AUTHORIZATION, auth);

        let http = Client::builder()
            .default_headers(headers)
            .user_agent(concat!("songloader/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(15))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            bitrate_kbps,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SongloaderError::AuthFailure(format!("{} rejected the token", url)).into());
        }
        if !status.is_success() {
            return Err(anyhow!("HTTP error {} from {}", status, url));
        }
        let body: ApiResponse<T> = response.json().await?;
        Ok(body.result)
    }

    /// Check the token by fetching the account status
    pub async fn verify(&self) -> Result<()> {
        let status: AccountStatus = self.get_json("/account/status").await?;
        match status.account.uid {
            Some(uid) => {
                info!(
                    "Yandex Music client initialized for {} ({})",
                    status.account.login.as_deref().unwrap_or("unknown login"),
                    uid
                );
                Ok(())
            }
            None => Err(SongloaderError::AuthFailure("token is not linked to an account".into()).into()),
        }
    }

    fn pick_variant(&self, variants: &[DownloadInfo]) -> Option<DownloadInfo> {
        let mut mp3: Vec<&DownloadInfo> = variants
            .iter()
            .filter(|v| v.codec.eq_ignore_ascii_case(TRACK_CODEC))
            .collect();
        mp3.sort_by_key(|v| v.bitrate_in_kbps);
        mp3.iter()
            .find(|v| v.bitrate_in_kbps == self.bitrate_kbps)
            .or_else(|| mp3.last())
            .map(|v| (*v).clone())
    }

    async fn direct_link(&self, track_id: &str) -> Result<String> {
        let variants: Vec<DownloadInfo> = self
            .get_json(&format!("/tracks/{}/download-info", track_id))
            .await?;
        let variant = self
            .pick_variant(&variants)
            .ok_or_else(|| anyhow!("no {} stream offered for track {}", TRACK_CODEC, track_id))?;
        debug!(
            "Using {} stream at {} kbps",
            variant.codec, variant.bitrate_in_kbps
        );

        let xml = self
            .http
            .get(&variant.download_info_url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(DirectLinkParts::parse(&xml)?.direct_url(TRACK_CODEC))
    }
}

#[async_trait]
impl MusicCatalog for YandexClient {
    async fn track(&self, track_id: &str) -> Result<TrackInfo> {
        let tracks: Vec<ApiTrack> = self.get_json(&format!("/tracks/{}", track_id)).await?;
        let track = tracks
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("track {} not found", track_id))?;
        if !track.available {
            return Err(anyhow!("track {} is not available", track_id));
        }
        Ok(TrackInfo {
            id: track_id.to_string(),
            title: track.title,
            artists: track.artists.into_iter().map(|a| a.name).collect(),
        })
    }

    async fn download(&self, track: &TrackInfo, destination: &Path) -> Result<()> {
        let url = self.direct_link(&track.id).await?;
        let response = self.http.get(&url).send().await?.error_for_status()?;

        let written = save_stream(response.bytes_stream(), destination).await?;
        debug!("Wrote {} bytes to {}", written, destination.display());
        Ok(())
    }
}

/// Connects [`YandexClient`]s against the public API
pub struct YandexConnector {
    base_url: String,
    bitrate_kbps: u32,
}

impl YandexConnector {
    pub fn new(bitrate_kbps: u32) -> Self {
        Self {
            base_url: API_BASE.to_string(),
            bitrate_kbps,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl CatalogConnector for YandexConnector {
    async fn connect(&self, token: &str) -> Result<Arc<dyn MusicCatalog>> {
        let client = YandexClient::new(token, &self.base_url, self.bitrate_kbps)?;
        client.verify().await?;
        Ok(Arc::new(client))
    }
}

// ============================================================
// Track source
// ============================================================

/// Yandex Music source with a lazily created, shared client
pub struct YandexSource {
    connector: Arc<dyn CatalogConnector>,
    client: OnceCell<Arc<dyn MusicCatalog>>,
}

impl YandexSource {
    pub fn new(connector: Arc<dyn CatalogConnector>) -> Self {
        Self {
            connector,
            client: OnceCell::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.client.initialized()
    }

    async fn client(&self, token: &str) -> Result<&Arc<dyn MusicCatalog>, SongloaderError> {
        self.client
            .get_or_try_init(|| async {
                self.connector.connect(token).await.map_err(|e| {
                    error!("Error initializing Yandex Music client: {:#}", e);
                    SongloaderError::AuthFailure(format!("{:#}", e))
                })
            })
            .await
    }
}

#[async_trait]
impl TrackSource for YandexSource {
    fn id(&self) -> &'static str {
        "yandex-api"
    }

    fn platform(&self) -> Platform {
        Platform::Yandex
    }

    async fn fetch(
        &self,
        request: &DownloadRequest,
        output_dir: &Path,
        status: &watch::Sender<String>,
    ) -> Result<PathBuf> {
        let token = request
            .token
            .as_deref()
            .ok_or_else(|| SongloaderError::AuthFailure("Please enter your Yandex Music token".into()))?;
        let track_id = extract_track_id(&request.url)?;
        info!("Starting Yandex download for track ID: {}", track_id);

        let client = self.client(token).await?;
        status.send_replace("Downloading from Yandex Music...".to_string());

        let result: Result<PathBuf> = async {
            let track = client.track(&track_id).await?;
            tokio::fs::create_dir_all(output_dir).await?;
            let path = output_dir.join(track.file_name(TRACK_CODEC));
            if path.exists() {
                warn!("{} already exists and will be replaced", path.display());
            }
            client.download(&track, &path).await?;
            Ok(path)
        }
        .await;

        match result {
            Ok(path) => {
                info!("Successfully downloaded: {}", path.display());
                status.send_replace("Download completed".to_string());
                Ok(path)
            }
            Err(e) => {
                error!("Error downloading Yandex track {}: {:#}", track_id, e);
                status.send_replace("Download failed".to_string());
                Err(SongloaderError::DownloadFailure(format!("{:#}", e)).into())
            }
        }
    }
}

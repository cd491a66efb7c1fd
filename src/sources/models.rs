//! Data structures shared by the track sources

use crate::utils::error::SongloaderError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which service a URL belongs to, and therefore which fetch strategy runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Fetched by the external `spotdl` process
    Spotify,
    /// Fetched through the Yandex Music HTTP API
    Yandex,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Spotify => "spotify",
            Platform::Yandex => "yandex",
        }
    }

    /// Display name for status messages
    pub fn label(&self) -> &'static str {
        match self {
            Platform::Spotify => "Spotify",
            Platform::Yandex => "Yandex Music",
        }
    }

    /// Whether downloads from this platform need a credential token
    pub fn needs_token(&self) -> bool {
        matches!(self, Platform::Yandex)
    }

    /// Guess the platform from a URL
    pub fn detect(url: &str) -> Option<Self> {
        if url.contains("open.spotify.com") || url.starts_with("spotify:") {
            Some(Platform::Spotify)
        } else if url.contains("music.yandex.") {
            Some(Platform::Yandex)
        } else {
            None
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = SongloaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "spotify" => Ok(Platform::Spotify),
            "yandex" | "yandex-music" | "yandex_music" => Ok(Platform::Yandex),
            other => Err(SongloaderError::InvalidUrl(format!(
                "unknown platform '{}'",
                other
            ))),
        }
    }
}

/// One user-initiated download
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub platform: Platform,
    /// Track URL, or a bare track id for Yandex Music
    pub url: String,
    /// OAuth token for credential-gated platforms
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
}

impl DownloadRequest {
    pub fn new(platform: Platform, url: impl Into<String>) -> Self {
        Self {
            platform,
            url: url.into().trim().to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into().trim().to_string();
        self.token = if token.is_empty() { None } else { Some(token) };
        self
    }
}

/// Track metadata resolved from a catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub artists: Vec<String>,
}

impl TrackInfo {
    /// `<first artist> - <title>.<ext>`, safe to use as a single path component
    pub fn file_name(&self, ext: &str) -> String {
        let artist = self
            .artists
            .first()
            .map(String::as_str)
            .unwrap_or("Unknown Artist");
        format!(
            "{} - {}.{}",
            sanitize_component(artist),
            sanitize_component(&self.title),
            ext
        )
    }
}

/// Replace characters that would split or escape a path component
pub fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim().trim_matches('.');
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

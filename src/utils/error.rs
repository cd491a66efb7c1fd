//! Error handling for Songloader

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Songloader
#[derive(Debug, Error)]
pub enum SongloaderError {
    #[error("{0} not found. Please install it and make sure it is on PATH")]
    ToolMissing(String),

    #[error("Authentication failed: {0}")]
    AuthFailure(String),

    #[error("Download failed: {0}")]
    DownloadFailure(String),

    #[error("Conversion failed: {0}")]
    ConversionFailure(String),

    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Job queue is full ({0} jobs waiting)")]
    QueueFull(usize),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SongloaderError {
    /// Whether the application can keep running after this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, SongloaderError::ToolMissing(tool) if tool == crate::utils::tools::FFMPEG)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_missing_transcoder_is_fatal() {
        assert!(SongloaderError::ToolMissing("ffmpeg".into()).is_fatal());
        assert!(!SongloaderError::ToolMissing("spotdl".into()).is_fatal());
        assert!(!SongloaderError::AuthFailure("bad token".into()).is_fatal());
    }

    #[test]
    fn test_not_found_mentions_path() {
        let err = SongloaderError::NotFound(PathBuf::from("downloads/missing.mp3"));
        assert!(err.to_string().contains("missing.mp3"));
    }
}

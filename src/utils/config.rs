//! Application configuration
//!
//! The configuration file is a JSON object. Keys missing from the file keep
//! their default values. A key whose value has the wrong type is skipped on
//! its own and keeps its default; unknown keys are dropped and will not
//! survive the next save.

use crate::utils::platform::expand_home;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

/// Default configuration file name, resolved against the working directory
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Where fresh downloads land
    pub output_dir: PathBuf,

    /// Where converted files land
    pub converted_dir: PathBuf,

    /// Conversion targets offered to the user, in display order
    pub supported_formats: Vec<String>,

    /// Preselected conversion target
    pub default_format: String,

    /// Number of background workers
    pub max_concurrent_downloads: usize,

    /// Bitrate passed to spotdl
    pub spotify_bitrate: String,

    /// Thread count passed to spotdl
    pub spotify_threads: usize,

    /// Jobs that may wait for a free worker before submissions are rejected
    pub queue_depth: usize,

    /// Preferred Yandex Music stream bitrate
    pub yandex_bitrate_kbps: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("downloads"),
            converted_dir: PathBuf::from("converted"),
            supported_formats: ["mp3", "wav", "m4a", "flac"]
                .iter()
                .map(|f| f.to_string())
                .collect(),
            default_format: "mp3".to_string(),
            max_concurrent_downloads: 3,
            spotify_bitrate: "128k".to_string(),
            spotify_threads: 7,
            queue_depth: 8,
            yandex_bitrate_kbps: 192,
        }
    }
}

impl AppConfig {
    /// Load configuration from `path`, overlaying it on the defaults.
    ///
    /// A missing file yields the defaults. A file that cannot be read or
    /// parsed is logged and also yields the defaults, so startup never fails
    /// because of a bad config.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Self::default();
        }

        match Self::read(path) {
            Ok(config) => {
                info!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                error!("Error loading config: {:#}", e);
                Self::default()
            }
        }
    }

    fn read(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_json(&raw)
    }

    /// Parse a (possibly partial) JSON document over the defaults.
    ///
    /// Each key is applied separately, so one bad value never discards the
    /// others.
    pub fn from_json(raw: &str) -> Result<Self> {
        let overrides: Map<String, Value> =
            serde_json::from_str(raw).context("Config file is not a valid settings object")?;

        let Value::Object(mut merged) = serde_json::to_value(Self::default())? else {
            bail!("Default settings do not serialize to an object");
        };
        for (key, value) in overrides {
            let mut candidate = merged.clone();
            candidate.insert(key.clone(), value);
            match serde_json::from_value::<AppConfig>(Value::Object(candidate.clone())) {
                Ok(_) => merged = candidate,
                Err(e) => warn!("Ignoring config key {}: {}", key, e),
            }
        }

        let config: AppConfig = serde_json::from_value(Value::Object(merged))?;
        Ok(config.sanitized())
    }

    /// Write the whole configuration back to `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Output directory with `~` expanded
    pub fn output_dir(&self) -> PathBuf {
        expand_home(&self.output_dir)
    }

    /// Converted directory with `~` expanded
    pub fn converted_dir(&self) -> PathBuf {
        expand_home(&self.converted_dir)
    }

    /// Whether `format` is one of the configured conversion targets
    pub fn supports_format(&self, format: &str) -> bool {
        self.supported_formats
            .iter()
            .any(|f| f.eq_ignore_ascii_case(format))
    }

    // Enforce sane minimums
    fn sanitized(mut self) -> Self {
        if self.max_concurrent_downloads == 0 {
            self.max_concurrent_downloads = 1;
        }
        if self.spotify_threads == 0 {
            self.spotify_threads = 1;
        }
        if self.supported_formats.is_empty() {
            self.supported_formats = Self::default().supported_formats;
        }
        let mut seen = Vec::with_capacity(self.supported_formats.len());
        for format in self.supported_formats.drain(..) {
            let format = format.to_ascii_lowercase();
            if !seen.contains(&format) {
                seen.push(format);
            }
        }
        self.supported_formats = seen;
        self
    }
}

//! Availability probes for the external tools Songloader drives

use crate::utils::error::SongloaderError;
use crate::utils::platform::find_tool;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

/// The transcoder. Required at startup.
pub const FFMPEG: &str = "ffmpeg";

/// The Spotify downloader. Checked lazily before each download.
pub const SPOTDL: &str = "spotdl";

fn version_flag(tool: &str) -> &'static str {
    // ffmpeg only understands the single-dash form
    if tool == FFMPEG {
        "-version"
    } else {
        "--version"
    }
}

/// Run `program` with its version flag; a clean exit means it is usable.
///
/// Any launch failure (not found, permission denied) or non-zero exit counts
/// as unavailable.
pub async fn probe(program: impl AsRef<Path>) -> bool {
    let program = program.as_ref();
    let name = program
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let status = Command::new(program)
        .arg(version_flag(&name))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    match status {
        Ok(status) if status.success() => {
            debug!("{} is available", program.display());
            true
        }
        Ok(status) => {
            warn!("{} exited with {}", program.display(), status);
            false
        }
        Err(e) => {
            debug!("Failed to launch {}: {}", program.display(), e);
            false
        }
    }
}

/// Resolve `tool` and make sure it answers a version query
pub async fn require(tool: &str) -> Result<PathBuf, SongloaderError> {
    let path = find_tool(tool).unwrap_or_else(|| PathBuf::from(tool));
    if probe(&path).await {
        info!("{} is available at {}", tool, path.display());
        Ok(path)
    } else {
        error!("{} is not installed or not found in PATH", tool);
        Err(SongloaderError::ToolMissing(tool.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_missing_program() {
        assert!(!probe("songloader-no-such-binary").await);
    }

    #[tokio::test]
    async fn test_require_missing_tool_is_tool_missing() {
        let err = require("songloader-no-such-binary").await.unwrap_err();
        assert!(matches!(err, SongloaderError::ToolMissing(name) if name == "songloader-no-such-binary"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_probe_non_zero_exit_is_unavailable() {
        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("broken-tool");
        std::fs::write(&script, "#!/bin/sh\nexit 3\n").unwrap();
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        assert!(!probe(&script).await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_probe_clean_exit_is_available() {
        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("good-tool");
        std::fs::write(&script, "#!/bin/sh\necho 1.0\n").unwrap();
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        assert!(probe(&script).await);
    }
}

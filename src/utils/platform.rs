//! Platform-specific utilities for Songloader
//!
//! This module provides cross-platform abstractions for:
//! - Locating external executables (spotdl, ffmpeg)
//! - Home directory expansion in configured paths
//! - Log file location

use std::path::{Path, PathBuf};
use tracing::debug;

/// Expand a leading `~` to the user's home directory
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

/// Returns the log directory
/// - macOS: ~/Library/Logs/Songloader
/// - Windows: %APPDATA%\Songloader\logs
/// - Linux: ~/.local/state/songloader
pub fn log_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Library/Logs/Songloader")
    }

    #[cfg(target_os = "windows")]
    {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Songloader")
            .join("logs")
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("songloader")
    }
}

/// Platform-specific executable name
pub fn exe_name(tool: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("{}.exe", tool)
    } else {
        tool.to_string()
    }
}

/// Find an executable with priority:
/// 1. System PATH
/// 2. Next to the running binary (bundled tools)
/// 3. Common installation paths
pub fn find_tool(tool: &str) -> Option<PathBuf> {
    if let Ok(path) = which::which(tool) {
        debug!("Found {} on PATH: {:?}", tool, path);
        return Some(path);
    }

    if let Some(bundled) = find_bundled(tool) {
        debug!("Found bundled {}: {:?}", tool, bundled);
        return Some(bundled);
    }

    let found = find_in_common_paths(tool);
    if let Some(path) = &found {
        debug!("Found {} in common location: {:?}", tool, path);
    }
    found
}

fn find_bundled(tool: &str) -> Option<PathBuf> {
    let exe_path = std::env::current_exe().ok()?;
    let exe_dir = exe_path.parent()?;

    let adjacent = exe_dir.join(exe_name(tool));
    if adjacent.is_file() && is_executable(&adjacent) {
        return Some(adjacent);
    }

    // Structure: Songloader.app/Contents/MacOS/songloader
    // Resource:  Songloader.app/Contents/Resources/bin/<tool>
    if exe_dir.ends_with("MacOS") {
        let bundle_path = exe_dir.parent()?.join("Resources").join("bin").join(tool);
        if bundle_path.is_file() && is_executable(&bundle_path) {
            return Some(bundle_path);
        }
    }

    None
}

fn find_in_common_paths(tool: &str) -> Option<PathBuf> {
    let common_dirs = [
        // macOS Homebrew (Apple Silicon)
        "/opt/homebrew/bin",
        // macOS Homebrew (Intel)
        "/usr/local/bin",
        // System
        "/usr/bin",
        // pip --user installs (spotdl)
        "~/.local/bin",
    ];

    common_dirs
        .iter()
        .map(|dir| expand_home(Path::new(dir)).join(exe_name(tool)))
        .find(|candidate| candidate.is_file() && is_executable(candidate))
}

/// Check if a file is executable
pub fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        std::fs::metadata(path)
            .map(|metadata| metadata.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    {
        path.exists()
    }
}

//! Registry of known audio files, mirrored to a selectable list view

use anyhow::{Context, Result};
use path_absolutize::Absolutize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::utils::config::AppConfig;

/// Text of the single row shown when no files are known
pub const NO_FILES_PLACEHOLDER: &str = "No files found.";

/// A file the registry knows about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredFile {
    /// Path as discovered or reported by the job that produced it
    pub path: PathBuf,
    /// Base file name shown to the user
    pub display_name: String,
    id: PathBuf,
}

impl RegisteredFile {
    fn new(path: PathBuf) -> Self {
        let display_name = display_name(&path);
        let id = identity(&path);
        Self {
            path,
            display_name,
            id,
        }
    }

    /// Stable identity: the absolute, normalized path
    pub fn id(&self) -> &Path {
        &self.id
    }
}

/// One row of the list view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListRow {
    File {
        path: PathBuf,
        display_name: String,
        selected: bool,
    },
    /// Shown instead of an empty list
    Placeholder,
}

impl ListRow {
    pub fn is_placeholder(&self) -> bool {
        matches!(self, ListRow::Placeholder)
    }

    pub fn is_selected(&self) -> bool {
        matches!(self, ListRow::File { selected: true, .. })
    }
}

impl fmt::Display for ListRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListRow::File { display_name, .. } => f.write_str(display_name),
            ListRow::Placeholder => f.write_str(NO_FILES_PLACEHOLDER),
        }
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    files: Vec<RegisteredFile>,
    selection: HashSet<PathBuf>,
}

/// Ordered list of known files plus the user's selection.
///
/// All mutation goes through one lock, so jobs finishing on different
/// workers can append concurrently.
#[derive(Debug)]
pub struct FileRegistry {
    output_dir: PathBuf,
    converted_dir: PathBuf,
    state: Mutex<RegistryState>,
}

impl FileRegistry {
    pub fn new(output_dir: impl Into<PathBuf>, converted_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            converted_dir: converted_dir.into(),
            state: Mutex::new(RegistryState::default()),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.output_dir(), config.converted_dir())
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Rebuild the registry from the two directories.
    ///
    /// Output-directory files come first, then converted files, each group
    /// sorted by name. Missing directories are created. The previous
    /// selection is restored for every path that still exists.
    pub async fn refresh(&self) -> Result<Vec<ListRow>> {
        let mut discovered = list_files(&self.output_dir).await?;
        discovered.extend(list_files(&self.converted_dir).await?);

        {
            let mut guard = self.state();
            let state = &mut *guard;
            let previous = std::mem::take(&mut state.selection);
            state.files = discovered.into_iter().map(RegisteredFile::new).collect();
            state.selection = state
                .files
                .iter()
                .filter(|f| previous.contains(&f.id))
                .map(|f| f.id.clone())
                .collect();
            info!(
                "Refreshed file list: {} files, {} selected",
                state.files.len(),
                state.selection.len()
            );
        }

        Ok(self.rows())
    }

    /// Record a freshly produced file. Returns false if it was already known.
    pub fn append(&self, path: impl Into<PathBuf>) -> bool {
        let file = RegisteredFile::new(path.into());
        let mut state = self.state();
        if state.files.iter().any(|f| f.id == file.id) {
            debug!("{} already registered", file.path.display());
            return false;
        }
        debug!("Registered {}", file.path.display());
        state.files.push(file);
        true
    }

    /// Forget every file and the selection
    pub fn clear(&self) {
        let mut state = self.state();
        state.files.clear();
        state.selection.clear();
    }

    /// Replace the selection. Paths the registry does not know are ignored.
    pub fn select<P: AsRef<Path>>(&self, paths: &[P]) -> usize {
        let wanted: HashSet<PathBuf> = paths.iter().map(|p| identity(p.as_ref())).collect();
        let mut state = self.state();
        let selection: HashSet<PathBuf> = state
            .files
            .iter()
            .filter(|f| wanted.contains(&f.id))
            .map(|f| f.id.clone())
            .collect();
        if selection.len() < wanted.len() {
            warn!(
                "Ignoring {} unknown paths in selection",
                wanted.len() - selection.len()
            );
        }
        state.selection = selection;
        state.selection.len()
    }

    /// Select rows by position in the current list
    pub fn select_indices(&self, indices: &[usize]) -> usize {
        let paths: Vec<PathBuf> = {
            let state = self.state();
            indices
                .iter()
                .filter_map(|&i| state.files.get(i).map(|f| f.path.clone()))
                .collect()
        };
        self.select(&paths)
    }

    pub fn select_all(&self) -> usize {
        let mut guard = self.state();
        let state = &mut *guard;
        state.selection = state.files.iter().map(|f| f.id.clone()).collect();
        state.selection.len()
    }

    /// Selected paths, in list order
    pub fn selected(&self) -> Vec<PathBuf> {
        let state = self.state();
        state
            .files
            .iter()
            .filter(|f| state.selection.contains(&f.id))
            .map(|f| f.path.clone())
            .collect()
    }

    pub fn files(&self) -> Vec<RegisteredFile> {
        self.state().files.clone()
    }

    pub fn path_at(&self, index: usize) -> Option<PathBuf> {
        self.state().files.get(index).map(|f| f.path.clone())
    }

    pub fn len(&self) -> usize {
        self.state().files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().files.is_empty()
    }

    /// The list view: one row per file, or the placeholder row
    pub fn rows(&self) -> Vec<ListRow> {
        let state = self.state();
        if state.files.is_empty() {
            return vec![ListRow::Placeholder];
        }
        state
            .files
            .iter()
            .map(|f| ListRow::File {
                path: f.path.clone(),
                display_name: f.display_name.clone(),
                selected: state.selection.contains(&f.id),
            })
            .collect()
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn converted_dir(&self) -> &Path {
        &self.converted_dir
    }
}

async fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to list {}", dir.display()))?;

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        match entry.file_type().await {
            Ok(kind) if kind.is_file() => files.push(entry.path()),
            Ok(_) => {}
            Err(e) => warn!("Skipping {}: {}", entry.path().display(), e),
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

fn identity(path: &Path) -> PathBuf {
    path.absolutize()
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| path.to_path_buf())
}

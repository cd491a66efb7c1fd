use crate::queue::{JobEvent, JobId};
use crate::registry::ListRow;
use crate::sources::DownloadRequest;
use std::path::PathBuf;

/// Commands sent from the front end to the backend
#[derive(Debug, Clone)]
pub enum BackendCommand {
    Download(DownloadRequest),
    /// Convert the current selection; `None` uses the configured default format
    ConvertSelected {
        target_format: Option<String>,
    },
    CancelJob(JobId),
    CancelAll,
    // Registry
    Refresh,
    Clear,
    Select(Vec<PathBuf>),
    SelectAll,
    // System
    Shutdown,
}

/// Events sent from the backend to the front end
#[derive(Debug, Clone)]
pub enum BackendEvent {
    /// Lifecycle and progress of a background job
    Job(JobEvent),

    /// The file list changed; rows are in registry order
    FilesRefreshed(Vec<ListRow>),

    /// A submission was rejected because every queue slot is taken
    QueueFull { capacity: usize },

    Error(String),

    /// The backend has drained its jobs and stopped
    Stopped,
}

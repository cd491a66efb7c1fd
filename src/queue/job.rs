//! Job bookkeeping shared by downloads and conversion batches

use crate::sources::models::DownloadRequest;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Identifier handed back when a job is submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The first block is enough to tell jobs apart on screen
        let id = self.0.to_string();
        f.write_str(&id[..8])
    }
}

/// Work a background worker can run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobKind {
    Download(DownloadRequest),
    Convert {
        inputs: Vec<PathBuf>,
        target_format: String,
    },
}

impl JobKind {
    pub fn label(&self) -> String {
        match self {
            JobKind::Download(request) => {
                format!("{} download of {}", request.platform.label(), request.url)
            }
            JobKind::Convert {
                inputs,
                target_format,
            } => format!("conversion of {} files to {}", inputs.len(), target_format),
        }
    }
}

/// Lifecycle of a job
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum JobStatus {
    #[default]
    Queued,
    Running,
    Completed,
    Failed(String),
    Cancelled,
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed(_) | JobStatus::Cancelled
        )
    }
}

/// Progress fraction in `[0, 1]` that never moves backwards
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JobProgress {
    fraction: f32,
}

impl JobProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move forward to `fraction`. Returns false (and changes nothing) if
    /// that would not advance.
    pub fn advance(&mut self, fraction: f32) -> bool {
        if !fraction.is_finite() {
            return false;
        }
        let fraction = fraction.clamp(0.0, 1.0);
        if fraction <= self.fraction {
            return false;
        }
        self.fraction = fraction;
        true
    }

    /// Fraction for item `index` (1-based) of `total`
    pub fn advance_to_item(&mut self, index: usize, total: usize) -> bool {
        if total == 0 {
            return false;
        }
        self.advance(index as f32 / total as f32)
    }

    pub fn complete(&mut self) {
        self.fraction = 1.0;
    }

    pub fn fraction(&self) -> f32 {
        self.fraction
    }

    /// Get progress percentage (0.0 to 100.0)
    pub fn percentage(&self) -> f32 {
        self.fraction * 100.0
    }
}

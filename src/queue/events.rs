use crate::queue::job::{JobId, JobStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Events that describe the life of a background job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobEvent {
    /// The job was accepted into the queue
    Queued {
        job_id: JobId,
        label: String,
        timestamp: DateTime<Utc>,
    },
    /// A worker picked the job up
    Started {
        job_id: JobId,
        timestamp: DateTime<Utc>,
    },
    /// Latest human-readable status line
    Status {
        job_id: JobId,
        message: String,
        timestamp: DateTime<Utc>,
    },
    Progress {
        job_id: JobId,
        fraction: f32,
        timestamp: DateTime<Utc>,
    },
    /// One item of a batch reached a verdict
    ItemFinished {
        job_id: JobId,
        input: PathBuf,
        output: Option<PathBuf>,
        error: Option<String>,
        timestamp: DateTime<Utc>,
    },
    Completed {
        job_id: JobId,
        outputs: Vec<PathBuf>,
        timestamp: DateTime<Utc>,
    },
    Failed {
        job_id: JobId,
        error: String,
        timestamp: DateTime<Utc>,
    },
    Cancelled {
        job_id: JobId,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    pub fn queued(job_id: JobId, label: impl Into<String>) -> Self {
        JobEvent::Queued {
            job_id,
            label: label.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn started(job_id: JobId) -> Self {
        JobEvent::Started {
            job_id,
            timestamp: Utc::now(),
        }
    }

    pub fn status(job_id: JobId, message: impl Into<String>) -> Self {
        JobEvent::Status {
            job_id,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn progress(job_id: JobId, fraction: f32) -> Self {
        JobEvent::Progress {
            job_id,
            fraction,
            timestamp: Utc::now(),
        }
    }

    pub fn item_converted(job_id: JobId, input: PathBuf, output: PathBuf) -> Self {
        JobEvent::ItemFinished {
            job_id,
            input,
            output: Some(output),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn item_failed(job_id: JobId, input: PathBuf, error: impl Into<String>) -> Self {
        JobEvent::ItemFinished {
            job_id,
            input,
            output: None,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn completed(job_id: JobId, outputs: Vec<PathBuf>) -> Self {
        JobEvent::Completed {
            job_id,
            outputs,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(job_id: JobId, error: impl Into<String>) -> Self {
        JobEvent::Failed {
            job_id,
            error: error.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn cancelled(job_id: JobId) -> Self {
        JobEvent::Cancelled {
            job_id,
            timestamp: Utc::now(),
        }
    }

    pub fn job_id(&self) -> JobId {
        match self {
            JobEvent::Queued { job_id, .. }
            | JobEvent::Started { job_id, .. }
            | JobEvent::Status { job_id, .. }
            | JobEvent::Progress { job_id, .. }
            | JobEvent::ItemFinished { job_id, .. }
            | JobEvent::Completed { job_id, .. }
            | JobEvent::Failed { job_id, .. }
            | JobEvent::Cancelled { job_id, .. } => *job_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            JobEvent::Queued { timestamp, .. }
            | JobEvent::Started { timestamp, .. }
            | JobEvent::Status { timestamp, .. }
            | JobEvent::Progress { timestamp, .. }
            | JobEvent::ItemFinished { timestamp, .. }
            | JobEvent::Completed { timestamp, .. }
            | JobEvent::Failed { timestamp, .. }
            | JobEvent::Cancelled { timestamp, .. } => *timestamp,
        }
    }

    /// The job status this event moves to, if it is a lifecycle event
    pub fn job_status(&self) -> Option<JobStatus> {
        match self {
            JobEvent::Queued { .. } => Some(JobStatus::Queued),
            JobEvent::Started { .. } => Some(JobStatus::Running),
            JobEvent::Completed { .. } => Some(JobStatus::Completed),
            JobEvent::Failed { error, .. } => Some(JobStatus::Failed(error.clone())),
            JobEvent::Cancelled { .. } => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    /// True for the last event a job ever emits
    pub fn is_terminal(&self) -> bool {
        self.job_status().map_or(false, |s| s.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_statuses() {
        let id = JobId::new();
        assert_eq!(JobEvent::queued(id, "x").job_status(), Some(JobStatus::Queued));
        assert_eq!(JobEvent::started(id).job_status(), Some(JobStatus::Running));
        assert_eq!(JobEvent::progress(id, 0.5).job_status(), None);
        assert_eq!(
            JobEvent::failed(id, "boom").job_status(),
            Some(JobStatus::Failed("boom".into()))
        );
    }

    #[test]
    fn test_terminal_events() {
        let id = JobId::new();
        assert!(JobEvent::completed(id, vec![]).is_terminal());
        assert!(JobEvent::failed(id, "e").is_terminal());
        assert!(JobEvent::cancelled(id).is_terminal());
        assert!(!JobEvent::started(id).is_terminal());
        assert!(!JobEvent::status(id, "Downloading").is_terminal());
    }

    #[test]
    fn test_event_serializes_with_job_id() {
        let id = JobId::new();
        let event = JobEvent::item_failed(id, PathBuf::from("a.mp3"), "File not found");
        let json = serde_json::to_string(&event).unwrap();
        let back: JobEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.job_id(), id);
        assert_eq!(back, event);
    }
}

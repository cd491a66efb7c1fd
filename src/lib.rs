//! Songloader library
//!
//! Download orchestration for Spotify and Yandex Music tracks, a file
//! registry kept in sync with the download directories, and batch
//! conversion through ffmpeg, all driven by a backend actor.

pub mod backend;
pub mod converter;
pub mod downloader;
pub mod queue;
pub mod registry;
pub mod sources;
pub mod utils;

// Re-export main types for easier use
pub use backend::{BackendActor, BackendCommand, BackendEvent};
pub use converter::{BatchOutcome, BatchRunner, FfmpegTranscoder, Transcoder};
pub use downloader::DownloadOrchestrator;
pub use queue::{JobEvent, JobId, JobKind, JobStatus, WorkerPool};
pub use registry::{FileRegistry, ListRow};
pub use sources::{DownloadRequest, Platform, TrackSource};
pub use utils::{AppConfig, SongloaderError};

//! Background jobs: bookkeeping, events and the worker pool

pub mod events;
pub mod job;
pub mod pool;

pub use events::JobEvent;
pub use job::{JobId, JobKind, JobProgress, JobStatus};
pub use pool::{Job, JobHandler, JobReporter, WorkerPool, FINISHED_HISTORY};

//! Download orchestration

pub mod orchestrator;

pub use orchestrator::DownloadOrchestrator;

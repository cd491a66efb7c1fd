//! Logging setup: human-readable output on stderr plus a plain log file

use std::fs::{File, OpenOptions};
use std::path::Path;
use tracing::Level;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub use tracing_appender::non_blocking::WorkerGuard as LogGuard;

/// Log file name inside the log directory
pub const LOG_FILE_NAME: &str = "songloader.log";

fn open_log_file(dir: &Path) -> std::io::Result<File> {
    std::fs::create_dir_all(dir)?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(LOG_FILE_NAME))
}

/// Install the global subscriber.
///
/// File output goes through a background writer; keep the returned guard
/// alive until exit so buffered lines are flushed. If the log file cannot be
/// opened the application keeps logging to stderr only and no guard is
/// returned.
pub fn init(level: Level, log_dir: &Path) -> Option<LogGuard> {
    let filter = tracing_subscriber::filter::LevelFilter::from_level(level);
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    match open_log_file(log_dir) {
        Ok(file) => {
            let (writer, guard) = tracing_appender::non_blocking(file);
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(file_layer)
                .init();
            Some(guard)
        }
        Err(e) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
            tracing::warn!("Could not open log file in {}: {}", log_dir.display(), e);
            None
        }
    }
}

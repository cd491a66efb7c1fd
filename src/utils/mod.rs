//! Configuration, errors, logging and external tool lookup

pub mod config;
pub mod error;
pub mod logging;
pub mod platform;
pub mod tools;

// Re-export for convenience
pub use config::AppConfig;
pub use error::SongloaderError;

//! Known-file registry and the list view kept in sync with it

pub mod files;

pub use files::{FileRegistry, ListRow, RegisteredFile, NO_FILES_PLACEHOLDER};

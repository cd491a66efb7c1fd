pub mod actor;
pub mod handler;
pub mod messages;

pub use actor::BackendActor;
pub use handler::JobRunner;
pub use messages::{BackendCommand, BackendEvent};

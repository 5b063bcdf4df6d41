//! In-memory collaborators and fixtures shared by Switchboard tests.

mod credentials;
mod fixtures;
mod host;
mod repository;
mod session;

pub use credentials::{MemoryConnections, MemoryVault, StaticRefresher};
pub use fixtures::*;
pub use host::{HostCall, RecordingHost};
pub use repository::MemoryRepository;
pub use session::MemorySession;

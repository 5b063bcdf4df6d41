pub mod builtin;
pub mod params;
pub mod registry;
pub mod retry;
pub mod schema;

pub use registry::{IntegrationEnv, ToolBuilder, ToolRegistry};
pub use retry::with_auth_retry;

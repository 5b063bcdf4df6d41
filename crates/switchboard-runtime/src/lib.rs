pub mod agent;
pub mod cache;
pub mod capture;
pub mod factory;
pub mod launcher;
pub mod loader;
pub mod providers;
pub mod session;
pub mod transfer;

pub use agent::Agent;
pub use cache::ConfigCache;
pub use capture::VariableCaptureTool;
pub use factory::AgentFactory;
pub use launcher::{SessionLauncher, WorkflowTarget};
pub use loader::GraphLoader;
pub use session::{SessionRuntime, ToolReply, UserData};
pub use transfer::TransferTool;

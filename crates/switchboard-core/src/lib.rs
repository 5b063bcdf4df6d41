pub mod config;
pub mod error;
pub mod event;
pub mod graph;
pub mod records;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{Result, SwitchboardError};
pub use event::EventBus;
pub use graph::{AgentConfig, DataType, PathConfig, PathVariableConfig, ToolConfig, ToolParameterConfig, WorkflowGraph};
pub use types::*;

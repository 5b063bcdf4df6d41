pub mod bundle;
pub mod connections;
pub mod store;

pub use bundle::WorkflowBundle;
pub use store::SqliteStore;

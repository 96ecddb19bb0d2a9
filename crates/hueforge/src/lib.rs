//! Compiles room configurations into Hue bridge rules and keeps the bridge
//! in sync with them.

pub mod compile;
pub mod error;
pub mod hub;
pub mod sync;

pub use compile::Compiler;
pub use compile::Program;
pub use error::ConfigError;
pub use error::SyncError;
pub use hub::HubClient;
pub use hub::HubError;
pub use sync::ConfigureReport;
pub use sync::DriftWarning;
pub use sync::Synchronizer;

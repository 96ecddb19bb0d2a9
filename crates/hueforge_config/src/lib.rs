//! Declarative configuration for hueforge: the room data model, time
//! literals, bridge settings and diagnostics for configuration files.

mod diagnostics;
pub mod model;
mod room;
mod settings;
pub mod time;

pub use diagnostics::format_diagnostics;
pub use diagnostics::DefinitionLocation;
pub use diagnostics::Diagnostic;
pub use diagnostics::Diagnostics;
pub use diagnostics::DuplicateError;
pub use diagnostics::Error;
pub use diagnostics::LoadError;
pub use diagnostics::SourceInfo;
pub use diagnostics::ValidationError;
pub use diagnostics::Warning;
pub use model::*;
pub use room::RoomConfig;
pub use settings::LogLevel;
pub use settings::LoggingConfig;
pub use settings::Settings;
pub use settings::DEFAULT_EXTERNAL_SENSOR;
pub use time::HmsDuration;
pub use time::TimeWindow;

//! # Core Runtime
//!
//! Ambient runtime services shared by every crate in the workspace:
//!
//! - **Events** ([`events`]): typed broadcast bus for sync/watch/drive
//!   notifications
//! - **Logging** ([`logging`]): `tracing` subscriber setup with format and
//!   filter configuration
//! - **Config** ([`config`]): builder-validated core configuration

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{CoreConfig, CoreConfigBuilder};
pub use error::{Error, Result};
pub use events::{CoreEvent, DriveEvent, EventBus, EventSeverity, SyncEvent, WatchEvent};
pub use logging::{init_logging, LogFormat, LogLevel, LoggingConfig};

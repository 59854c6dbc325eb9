//! Configuration and wiring for the `docward` binary.

pub mod config;
pub mod context;
pub mod notify;

pub use config::{BackendConfig, Config, ConfigError};
pub use context::{AppContext, SyncOnRegister};
pub use notify::WebhookNotifier;

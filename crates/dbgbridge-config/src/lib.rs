//! Configuration for the dbgbridge control server.
//!
//! Settings are read from TOML, layered `defaults <- global <- project`,
//! and validated before use.

pub mod config;
pub mod error;
pub mod load;
pub mod merge;
pub mod validate;

pub use config::{
    AdapterConfig, CallbackConfig, Config, LaunchTarget, LogConfig, LogLevel, ServerConfig,
    SessionConfig, WatchPolicy,
};
pub use error::ConfigError;
pub use load::{load_config, load_file, load_from_str};

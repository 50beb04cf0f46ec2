use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Port the control server listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 45210;

/// Launch configuration name whose stop events are correlated with callbacks.
pub const DEFAULT_CONFIGURATION_NAME: &str = "Launch Program";

/// Log verbosity level.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Most verbose.
    Trace,
    /// Debug messages.
    Debug,
    /// Informational messages (default).
    #[default]
    Info,
    /// Warnings only.
    Warn,
    /// Errors only.
    Error,
}

impl LogLevel {
    /// The `tracing` filter directive for this level.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// What happens to a callback registration after it fires.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchPolicy {
    /// Keep notifying on every subsequent hit.
    #[default]
    Persistent,
    /// Drop the registration after the first delivery.
    OneShot,
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the control endpoint binds to.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
}

fn default_bind() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT))
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Debug session behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Only stop events from a session with this configuration name are
    /// matched against callbacks.
    #[serde(default = "default_configuration_name")]
    pub configuration_name: String,
    /// How long to wait for the adapter to answer a request.
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Function names armed as function breakpoints on every launch.
    #[serde(default)]
    pub function_breakpoints: Vec<String>,
}

fn default_configuration_name() -> String {
    DEFAULT_CONFIGURATION_NAME.to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            configuration_name: default_configuration_name(),
            request_timeout_secs: default_timeout_secs(),
            function_breakpoints: Vec::new(),
        }
    }
}

/// The debug adapter process spawned for each launch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Executable of the adapter.
    #[serde(default = "default_adapter_command")]
    pub command: String,
    /// Command-line arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// `adapterID` sent in the `initialize` request.
    #[serde(default = "default_adapter_id")]
    pub adapter_id: String,
}

fn default_adapter_command() -> String {
    "lldb-dap".to_string()
}

fn default_adapter_id() -> String {
    "lldb".to_string()
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            command: default_adapter_command(),
            args: Vec::new(),
            adapter_id: default_adapter_id(),
        }
    }
}

/// A named program that `/launch?target=<name>` can start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LaunchTarget {
    /// Program to debug.
    pub program: String,
    /// Program arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory for the debuggee.
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    /// Stop at the program entry point.
    #[serde(default)]
    pub stop_on_entry: bool,
    /// Extra environment variables.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Outbound callback delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackConfig {
    /// Upper bound on a single callback request.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Whether registrations survive their first delivery.
    #[serde(default)]
    pub watch: WatchPolicy,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            watch: WatchPolicy::Persistent,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log verbosity level.
    #[serde(default)]
    pub level: LogLevel,
    /// Optional path to a log file. Logs go to stderr when unset.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            file: None,
        }
    }
}

/// Top-level dbgbridge configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// HTTP listener.
    #[serde(default)]
    pub server: ServerConfig,
    /// Debug session behaviour.
    #[serde(default)]
    pub session: SessionConfig,
    /// Debug adapter process.
    #[serde(default)]
    pub adapter: AdapterConfig,
    /// Launchable targets, keyed by name.
    #[serde(default)]
    pub targets: HashMap<String, LaunchTarget>,
    /// Callback delivery.
    #[serde(default)]
    pub callback: CallbackConfig,
    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = Config::default();
        assert_eq!(cfg.server.bind, "127.0.0.1:45210".parse().unwrap());
        assert_eq!(cfg.session.configuration_name, "Launch Program");
        assert_eq!(cfg.session.request_timeout_secs, 10);
        assert!(cfg.session.function_breakpoints.is_empty());
        assert_eq!(cfg.adapter.command, "lldb-dap");
        assert_eq!(cfg.adapter.adapter_id, "lldb");
        assert!(cfg.targets.is_empty());
        assert_eq!(cfg.callback.timeout_secs, 10);
        assert_eq!(cfg.callback.watch, WatchPolicy::Persistent);
        assert_eq!(cfg.log.level, LogLevel::Info);
        assert!(cfg.log.file.is_none());
    }

    #[test]
    fn serde_roundtrip_preserves_values() {
        let mut targets = HashMap::new();
        targets.insert(
            "Launch Program".to_string(),
            LaunchTarget {
                program: "/usr/bin/app".into(),
                args: vec!["--verbose".into()],
                cwd: Some(PathBuf::from("/work")),
                stop_on_entry: true,
                env: HashMap::from([("RUST_BACKTRACE".to_string(), "1".to_string())]),
            },
        );
        let cfg = Config {
            server: ServerConfig {
                bind: "0.0.0.0:9000".parse().unwrap(),
            },
            session: SessionConfig {
                configuration_name: "Attach".into(),
                request_timeout_secs: 30,
                function_breakpoints: vec!["rust_panic".into()],
            },
            adapter: AdapterConfig {
                command: "python3".into(),
                args: vec!["-m".into(), "debugpy.adapter".into()],
                adapter_id: "debugpy".into(),
            },
            targets,
            callback: CallbackConfig {
                timeout_secs: 3,
                watch: WatchPolicy::OneShot,
            },
            log: LogConfig {
                level: LogLevel::Debug,
                file: Some(PathBuf::from("/tmp/dbgbridge.log")),
            },
        };

        let toml_str = toml::to_string(&cfg).expect("serialize");
        let deserialized: Config = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(cfg, deserialized);
    }

    #[test]
    fn parse_from_toml_string() {
        let input = r#"
[server]
bind = "127.0.0.1:8123"

[callback]
watch = "one_shot"

[targets."Launch Program"]
program = "./target/debug/demo"
"#;
        let cfg: Config = toml::from_str(input).expect("parse toml");
        assert_eq!(cfg.server.bind.port(), 8123);
        assert_eq!(cfg.callback.watch, WatchPolicy::OneShot);
        // Unspecified fields keep defaults via serde(default)
        assert_eq!(cfg.callback.timeout_secs, 10);
        let target = &cfg.targets["Launch Program"];
        assert_eq!(target.program, "./target/debug/demo");
        assert!(target.args.is_empty());
        assert!(!target.stop_on_entry);
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let cfg: Config = toml::from_str("").expect("parse empty toml");
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn log_level_filters() {
        assert_eq!(LogLevel::Trace.as_filter(), "trace");
        assert_eq!(LogLevel::Warn.as_filter(), "warn");
        assert_eq!(LogLevel::default().as_filter(), "info");
    }
}

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::ConfigError;
use crate::merge::merge_configs;
use crate::validate::validate;

/// Content written into a newly-created default config file.
const DEFAULT_CONFIG_CONTENT: &str = r#"# dbgbridge configuration
# Uncomment and edit settings below to override defaults.

# [server]
# bind = "127.0.0.1:45210"

# [session]
# configuration_name = "Launch Program"
# request_timeout_secs = 10
# function_breakpoints = ["rust_panic"]

# [adapter]
# command = "lldb-dap"
# args = []
# adapter_id = "lldb"

# [targets."Launch Program"]
# program = "./target/debug/app"
# args = []
# stop_on_entry = false

# [callback]
# timeout_secs = 10
# watch = "persistent"

# [log]
# level = "info"
"#;

/// Load and merge configuration.
///
/// 1. Reads the global config from `config_dir/config.toml`.
///    If the file does not exist it is created with commented-out
///    defaults.
/// 2. Optionally reads a project config from
///    `project_dir/.dbgbridge/config.toml` (walks upward).
/// 3. Merges: `Config::default() <- global <- project`.
/// 4. Validates the merged result.
///
/// # Errors
///
/// Fails when a file cannot be read or written, does not parse, or holds
/// out-of-range values.
pub fn load_config(config_dir: &Path, project_dir: Option<&Path>) -> Result<Config, ConfigError> {
    let global_path = config_dir.join("config.toml");

    if !config_dir.exists() {
        std::fs::create_dir_all(config_dir)?;
    }

    if !global_path.exists() {
        std::fs::write(&global_path, DEFAULT_CONFIG_CONTENT)
            .map_err(|source| ConfigError::CreateDefault {
                path: global_path.clone(),
                source,
            })?;
        tracing::info!("Created default config at {}", global_path.display());
    }

    let mut config = Config::default();

    let global_content = std::fs::read_to_string(&global_path)?;
    if has_non_comment_content(&global_content) {
        config = merge_configs(&config, &global_content)?;
    }

    if let Some(proj) = project_dir {
        if let Some(project_path) = find_project_config(proj) {
            tracing::debug!("Merging project config {}", project_path.display());
            let project_content = std::fs::read_to_string(&project_path)?;
            config = merge_configs(&config, &project_content)?;
        }
    }

    check(&config)?;
    Ok(config)
}

/// Load a single explicit config file on top of the defaults.
///
/// Unlike [`load_config`], a missing file is an error and nothing is
/// created.
///
/// # Errors
///
/// Returns [`ConfigError::NotFound`] when `path` does not exist, otherwise
/// the same errors as [`load_from_str`].
pub fn load_file(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    let config = merge_configs(&Config::default(), &content)?;
    check(&config)?;
    Ok(config)
}

/// Walk from `start` upward looking for `.dbgbridge/config.toml`.
fn find_project_config(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(".dbgbridge").join("config.toml");
        if candidate.exists() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

/// Returns `true` when the content has at least one
/// non-empty, non-comment line.
fn has_non_comment_content(content: &str) -> bool {
    content.lines().any(|l| {
        let trimmed = l.trim();
        !trimmed.is_empty() && !trimmed.starts_with('#')
    })
}

/// Report the first validation violation, if any.
fn check(config: &Config) -> Result<(), ConfigError> {
    validate(config).map_err(|errors| {
        errors
            .into_iter()
            .next()
            .unwrap_or_else(|| ConfigError::Validation {
                field: "unknown".to_string(),
                message: "validation failed".to_string(),
            })
    })
}

/// Parse a TOML string directly into a validated [`Config`].
///
/// # Errors
///
/// Returns [`ConfigError`] on parse or validation failure.
pub fn load_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
    check(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WatchPolicy;
    use tempfile::TempDir;

    #[test]
    fn load_config_creates_default_when_missing() {
        let tmp = TempDir::new().unwrap();
        let cfg_dir = tmp.path().join("config");

        let config = load_config(&cfg_dir, None).unwrap();
        assert_eq!(config, Config::default());
        assert!(cfg_dir.join("config.toml").exists());
    }

    #[test]
    fn load_config_reads_existing_global() {
        let tmp = TempDir::new().unwrap();
        let cfg_dir = tmp.path().join("config");
        std::fs::create_dir_all(&cfg_dir).unwrap();
        std::fs::write(cfg_dir.join("config.toml"), "[callback]\ntimeout_secs = 3\n").unwrap();

        let config = load_config(&cfg_dir, None).unwrap();
        assert_eq!(config.callback.timeout_secs, 3);
        // Unmodified fields keep defaults
        assert_eq!(config.callback.watch, WatchPolicy::Persistent);
    }

    #[test]
    fn load_config_merges_project_over_global() {
        let tmp = TempDir::new().unwrap();
        let cfg_dir = tmp.path().join("config");
        std::fs::create_dir_all(&cfg_dir).unwrap();
        std::fs::write(cfg_dir.join("config.toml"), "[callback]\ntimeout_secs = 3\n").unwrap();

        let proj_dir = tmp.path().join("project");
        let local = proj_dir.join(".dbgbridge");
        std::fs::create_dir_all(&local).unwrap();
        std::fs::write(local.join("config.toml"), "[callback]\ntimeout_secs = 7\n").unwrap();

        let config = load_config(&cfg_dir, Some(&proj_dir)).unwrap();
        assert_eq!(config.callback.timeout_secs, 7);
    }

    #[test]
    fn load_file_reads_explicit_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bridge.toml");
        std::fs::write(&path, "[session]\nconfiguration_name = \"Debug Tests\"\n").unwrap();

        let config = load_file(&path).unwrap();
        assert_eq!(config.session.configuration_name, "Debug Tests");
        assert_eq!(config.session.request_timeout_secs, 10);
    }

    #[test]
    fn load_file_missing_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = load_file(&tmp.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn load_from_str_parses_valid_toml() {
        let config = load_from_str("[server]\nbind = \"127.0.0.1:9999\"\n").unwrap();
        assert_eq!(config.server.bind.port(), 9999);
    }

    #[test]
    fn load_from_str_rejects_invalid_toml() {
        assert!(load_from_str("{{bad}}").is_err());
    }

    #[test]
    fn load_from_str_rejects_invalid_values() {
        let result = load_from_str("[callback]\ntimeout_secs = 0\n");
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn find_project_config_walks_up() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("repo");
        let local = root.join(".dbgbridge");
        std::fs::create_dir_all(&local).unwrap();
        std::fs::write(local.join("config.toml"), "[log]\nlevel = \"debug\"\n").unwrap();

        let deep = root.join("src").join("module");
        std::fs::create_dir_all(&deep).unwrap();

        let found = find_project_config(&deep);
        assert!(found.unwrap().ends_with(".dbgbridge/config.toml"));
    }

    #[test]
    fn default_config_content_parses_as_defaults() {
        assert!(!has_non_comment_content(DEFAULT_CONFIG_CONTENT));
    }

    #[test]
    fn has_non_comment_content_detects_values() {
        assert!(!has_non_comment_content(""));
        assert!(!has_non_comment_content("# comment\n"));
        assert!(has_non_comment_content("# comment\n[log]\n"));
    }
}

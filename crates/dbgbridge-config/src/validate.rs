use crate::config::Config;
use crate::error::ConfigError;

/// Longest timeout accepted for adapter requests and callbacks.
const MAX_TIMEOUT_SECS: u64 = 300;

/// Validate a [`Config`], returning all detected violations.
///
/// Returns `Ok(())` when the config is valid, or `Err` with a
/// vector of every validation error found.
pub fn validate(config: &Config) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.session.configuration_name.trim().is_empty() {
        errors.push(ConfigError::Validation {
            field: "session.configuration_name".to_string(),
            message: "must not be empty".to_string(),
        });
    }

    check_timeout(
        &mut errors,
        "session.request_timeout_secs",
        config.session.request_timeout_secs,
    );
    check_timeout(
        &mut errors,
        "callback.timeout_secs",
        config.callback.timeout_secs,
    );

    if !config.targets.is_empty() && config.adapter.command.trim().is_empty() {
        errors.push(ConfigError::Validation {
            field: "adapter.command".to_string(),
            message: "must not be empty when targets are configured".to_string(),
        });
    }

    let mut names: Vec<&String> = config.targets.keys().collect();
    names.sort();
    for name in names {
        if config.targets[name].program.trim().is_empty() {
            errors.push(ConfigError::Validation {
                field: format!("targets.{name}.program"),
                message: "must not be empty".to_string(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_timeout(errors: &mut Vec<ConfigError>, field: &str, value: u64) {
    if value == 0 || value > MAX_TIMEOUT_SECS {
        errors.push(ConfigError::Validation {
            field: field.to_string(),
            message: format!("must be 1\u{2013}{MAX_TIMEOUT_SECS}, got {value}"),
        });
    }
}

use std::path::PathBuf;
use thiserror::Error;

/// Why a configuration could not be produced.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested file does not exist.
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    /// The commented default file could not be written.
    #[error("could not write default config to {path}: {source}")]
    CreateDefault {
        /// Where the default file was to be written.
        path: PathBuf,
        /// Underlying write failure.
        #[source]
        source: std::io::Error,
    },

    /// The text is not valid TOML or does not fit the schema.
    #[error("invalid config: {0}")]
    Parse(String),

    /// A value parsed but is out of range.
    #[error("{field}: {message}")]
    Validation {
        /// Dotted field path, e.g. `callback.timeout_secs`.
        field: String,
        /// What is wrong with the value.
        message: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_default_names_path() {
        let err = ConfigError::CreateDefault {
            path: PathBuf::from("/etc/dbgbridge/config.toml"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/etc/dbgbridge/config.toml"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn validation_reads_as_field_then_problem() {
        let err = ConfigError::Validation {
            field: "session.configuration_name".into(),
            message: "must not be empty".into(),
        };
        assert_eq!(err.to_string(), "session.configuration_name: must not be empty");
    }

    #[test]
    fn io_error_is_transparent() {
        let err = ConfigError::from(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file missing",
        ));
        assert_eq!(err.to_string(), "file missing");
    }
}

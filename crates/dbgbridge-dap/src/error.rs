//! Failures surfaced by the debug session.

use thiserror::Error;

/// Anything that can go wrong while driving the debug adapter.
#[derive(Debug, Error)]
pub enum DapError {
    /// The adapter binary could not be started.
    #[error("could not start debug adapter `{command}`: {source}")]
    AdapterSpawnFailed {
        /// Program that failed to start.
        command: String,
        /// Underlying spawn failure.
        #[source]
        source: std::io::Error,
    },

    #[error("adapter connection failed: {0}")]
    Transport(String),

    /// No response arrived within the request timeout.
    #[error("no response to `{command}` before the deadline")]
    Timeout {
        /// The DAP command or event that was awaited.
        command: String,
    },

    /// The adapter answered with `success: false`, or the request is not
    /// valid in the current session state.
    #[error("adapter refused: {message}")]
    Rejected {
        /// Reason reported by the adapter.
        message: String,
    },

    #[error("malformed adapter message: {0}")]
    InvalidResponse(String),

    #[error("debug session has not completed initialize")]
    NotInitialized,

    #[error("debug session has ended")]
    Terminated,

    /// No `[targets.<name>]` entry matches the requested name.
    #[error("unknown launch target: {0}")]
    UnknownTarget(String),

    #[error("no active debug session")]
    NoSession,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn spawn_failure_names_command_and_keeps_source() {
        let err = DapError::AdapterSpawnFailed {
            command: "js-debug".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "binary missing"),
        };
        let text = err.to_string();
        assert!(text.contains("`js-debug`"), "{text}");
        assert!(text.contains("binary missing"), "{text}");
        assert!(err.source().is_some());
    }

    #[test]
    fn timeout_names_awaited_command() {
        let err = DapError::Timeout {
            command: "stackTrace".into(),
        };
        assert_eq!(err.to_string(), "no response to `stackTrace` before the deadline");
    }

    #[test]
    fn session_lookup_errors() {
        assert_eq!(
            DapError::UnknownTarget("Launch Tests".into()).to_string(),
            "unknown launch target: Launch Tests"
        );
        assert_eq!(DapError::NoSession.to_string(), "no active debug session");
    }
}

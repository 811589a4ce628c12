use std::path::PathBuf;
use thiserror::Error;

use crate::llm::GatewayError;

/// Flowscribe error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config validation error: {0}")]
    ConfigValidation(String),

    #[error("Cannot scan {path}: {message}")]
    Scan { path: PathBuf, message: String },

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Failed to persist {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Glob pattern error: {0}")]
    GlobPattern(#[from] glob::PatternError),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for Flowscribe operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a config validation error
    pub fn config_validation(msg: impl Into<String>) -> Self {
        Error::ConfigValidation(msg.into())
    }

    /// Create a scan error for an unusable root
    pub fn scan(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::Scan {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a persistence error
    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Persistence {
            path: path.into(),
            source,
        }
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("IO error"));
    }

    #[test]
    fn test_scan_error_display() {
        let err = Error::scan("/some/repo", "does not exist");
        assert_eq!(err.to_string(), "Cannot scan /some/repo: does not exist");
    }

    #[test]
    fn test_persistence_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err = Error::persistence("/state/run.json", io_err);
        assert!(err.to_string().contains("/state/run.json"));
        assert!(err.to_string().contains("read-only"));
    }

    #[test]
    fn test_gateway_error_conversion() {
        let err: Error = GatewayError::Timeout { seconds: 30 }.into();
        assert!(err.to_string().contains("30"));
        assert!(matches!(err, Error::Gateway(GatewayError::Timeout { .. })));
    }

    #[test]
    fn test_config_validation_display() {
        let err = Error::config_validation("retry_count must be at least 1");
        assert_eq!(
            err.to_string(),
            "Config validation error: retry_count must be at least 1"
        );
    }

    #[test]
    fn test_other_error() {
        let err = Error::other("something went wrong");
        assert_eq!(err.to_string(), "something went wrong");
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}

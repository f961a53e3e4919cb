//! Error handling for the NovaDE core layer.
//!
//! The main error type for this crate is [`CoreError`], which wraps the more
//! specific [`ConfigError`] and [`LoggingError`].

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Core error type shared by the NovaDE compositing crates.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Errors related to configuration loading, parsing, or validation.
    #[error("Configuration Error: {0}")]
    Config(#[from] ConfigError),

    /// Errors that occur while installing the global tracing subscriber.
    #[error("Logging Error: {0}")]
    Logging(#[from] LoggingError),

    /// Filesystem operations (creating directories, reading files) that are
    /// not covered by a more specific variant.
    #[error("Filesystem Error: {message} (Path: {path:?})")]
    Filesystem {
        message: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("I/O Error: {0}")]
    Io(#[from] io::Error),
}

/// Error type for configuration-related operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file from {path:?}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse configuration file: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid values after successful parsing.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    /// A required base directory (e.g. XDG config/state home) could not be
    /// determined.
    #[error("Could not determine base directory for {dir_type}")]
    DirectoryUnavailable { dir_type: String },
}

/// Error type for logging initialization.
#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Failed to initialize logging: {0}")]
    InitializationFailure(String),

    /// The configured level is not one of trace, debug, info, warn, error.
    #[error("Invalid log level in config: {0}")]
    InvalidLevel(String),

    #[error("Logging I/O error: {0}")]
    IoError(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::io::ErrorKind;

    #[test]
    fn test_core_error_config_variant() {
        let core_err = CoreError::from(ConfigError::ValidationError("bad backend".to_string()));
        assert_eq!(
            core_err.to_string(),
            "Configuration Error: Configuration validation failed: bad backend"
        );
        match core_err.source().and_then(|s| s.downcast_ref::<ConfigError>()) {
            Some(ConfigError::ValidationError(msg)) => assert_eq!(msg, "bad backend"),
            other => panic!("Incorrect source for CoreError::Config: {:?}", other),
        }
    }

    #[test]
    fn test_core_error_logging_variant() {
        let core_err = CoreError::from(LoggingError::InvalidLevel("loud".to_string()));
        assert_eq!(core_err.to_string(), "Logging Error: Invalid log level in config: loud");
    }

    #[test]
    fn test_core_error_filesystem_variant() {
        let path = PathBuf::from("/tmp/compositor.log");
        let core_err = CoreError::Filesystem {
            message: "Failed to create directory".to_string(),
            path: path.clone(),
            source: io::Error::new(ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(
            core_err.to_string(),
            format!("Filesystem Error: Failed to create directory (Path: {:?})", path)
        );
        let kind = core_err
            .source()
            .and_then(|s| s.downcast_ref::<io::Error>())
            .map(|e| e.kind());
        assert_eq!(kind, Some(ErrorKind::PermissionDenied));
    }

    #[test]
    fn test_config_error_parse_error_variant() {
        let toml_err: toml::de::Error = toml::from_str::<toml::Value>("this is not = = toml").unwrap_err();
        let display = toml_err.to_string();
        let config_err = ConfigError::ParseError(toml_err);
        assert_eq!(config_err.to_string(), format!("Failed to parse configuration file: {}", display));
        assert!(config_err.source().unwrap().is::<toml::de::Error>());
    }

    #[test]
    fn test_config_error_directory_unavailable_variant() {
        let config_err = ConfigError::DirectoryUnavailable { dir_type: "App Config".to_string() };
        assert_eq!(config_err.to_string(), "Could not determine base directory for App Config");
        assert!(config_err.source().is_none());
    }
}

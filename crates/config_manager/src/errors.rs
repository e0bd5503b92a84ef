//! Configuration system error types.
//!
//! Domain-specific errors for loading, parsing and validating the access
//! control configuration files.

use thiserror::Error;

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;

/// Configuration system errors.
///
/// File level problems carry the path of the offending file so that the
/// message points at the right document when several files are included.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("Failed to access configuration file: {path} - {reason}")]
    FileAccessError { path: String, reason: String },

    #[error("Failed to parse configuration file: {path} - {reason}")]
    ParseError { path: String, reason: String },

    #[error("Checksum file not found for configuration file: {path}")]
    ChecksumMissing { path: String },

    #[error("Checksum mismatch for configuration file {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("{kind} '{name}' is defined more than once (again in {path})")]
    DuplicateDefinition {
        kind: String,
        name: String,
        path: String,
    },

    #[error("Included configuration file {path} may not include further files")]
    NestedInclude { path: String },

    #[error("Invalid bot username pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Configuration validation failed with {error_count} error(s): {}", .errors.join("; "))]
    ValidationFailed {
        error_count: usize,
        errors: Vec<String>,
    },
}

/// Result type alias for configuration operations.
pub type ConfigurationResult<T> = Result<T, ConfigurationError>;

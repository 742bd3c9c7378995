//! Error Handling Infrastructure
//!
//! This module defines all error types used throughout Drupalgate.
//! All errors are structured and map to specific error codes for JSON output.
//!
//! # Error Categories
//! - `ConfigParse`: settings.php could not be parsed (fatal at startup)
//! - `ConnectionFailed`: Database connection errors
//! - `Validation`: Query guard rejections (not-select, multiple statements, ...)
//! - `NotFound`: Well-formed lookup that matched zero rows/tables
//! - `Timeout`: Execution exceeded the caller-supplied bound
//! - `Database`: Engine-level failure not otherwise classified

use thiserror::Error;

/// Main error type for Drupalgate operations
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Configuration file could not be parsed into a connection profile
    #[error("Config parse error ({reason}): {detail}")]
    ConfigParse { reason: ConfigParseReason, detail: String },

    /// Database connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query guard rejected the statement
    #[error("Validation failed ({reason}): {detail}")]
    Validation { reason: ValidationReason, detail: String },

    /// Lookup was well-formed but matched nothing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Execution exceeded the caller-supplied timeout
    #[error("Timed out after {0}ms")]
    Timeout(u64),

    /// Engine-level database error
    #[error("Database error ({engine}): {detail}")]
    Database { engine: String, detail: String },
}

/// Why configuration parsing failed
///
/// Reason codes are stable; agents and tests can branch on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigParseReason {
    /// No `$databases[target][replica]` assignment in the file
    AssignmentNotFound,
    /// A mandatory key (driver, database, username) was absent
    MissingKey,
    /// The bracket-matching scan ran off the end of input
    UnbalancedLiteral,
    /// Port value was present but not numeric
    InvalidPort,
    /// Driver string does not name a supported engine
    UnknownDriver,
    /// Settings file could not be read
    UnreadableFile,
}

impl ConfigParseReason {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AssignmentNotFound => "assignment_not_found",
            Self::MissingKey => "missing_key",
            Self::UnbalancedLiteral => "unbalanced_literal",
            Self::InvalidPort => "invalid_port",
            Self::UnknownDriver => "unknown_driver",
            Self::UnreadableFile => "unreadable_file",
        }
    }
}

impl std::fmt::Display for ConfigParseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why the query guard rejected a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationReason {
    /// First token was not SELECT
    NotSelect,
    /// A statement separator appeared outside a string literal
    MultipleStatements,
    /// A mutating keyword appeared outside a string literal
    ForbiddenKeyword,
    /// Paragraph field machine name does not follow the naming convention
    ParagraphField,
    /// Malformed or missing argument
    InvalidInput,
}

impl ValidationReason {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotSelect => "not_select",
            Self::MultipleStatements => "multiple_statements",
            Self::ForbiddenKeyword => "forbidden_keyword",
            Self::ParagraphField => "paragraph_field",
            Self::InvalidInput => "invalid_input",
        }
    }
}

impl std::fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl GatewayError {
    /// Convert error to error code string for JSON output
    ///
    /// Error codes are stable and suitable for programmatic handling by agents.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigParse { .. } => "CONFIG_PARSE",
            Self::ConnectionFailed(_) => "CONNECTION_FAILED",
            Self::Validation { .. } => "VALIDATION",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Timeout(_) => "TIMEOUT",
            Self::Database { .. } => "DATABASE_ERROR",
        }
    }

    /// Get human-readable error message (agent-appropriate, no sensitive data)
    ///
    /// Safe to include in JSON output: no credentials, no driver stack traces.
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Create a config parse error
    pub fn config_parse(reason: ConfigParseReason, detail: impl Into<String>) -> Self {
        Self::ConfigParse { reason, detail: detail.into() }
    }

    /// Create a connection failed error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed(message.into())
    }

    /// Create a validation error
    pub fn validation(reason: ValidationReason, detail: impl Into<String>) -> Self {
        Self::Validation { reason, detail: detail.into() }
    }

    /// Create a not-found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create an engine-specific database error
    pub fn database(engine: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Database { engine: engine.into(), detail: detail.into() }
    }
}

/// Result type alias for Drupalgate operations
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            GatewayError::config_parse(ConfigParseReason::MissingKey, "x").error_code(),
            "CONFIG_PARSE"
        );
        assert_eq!(GatewayError::connection_failed("test").error_code(), "CONNECTION_FAILED");
        assert_eq!(
            GatewayError::validation(ValidationReason::NotSelect, "x").error_code(),
            "VALIDATION"
        );
        assert_eq!(GatewayError::not_found("test").error_code(), "NOT_FOUND");
        assert_eq!(GatewayError::Timeout(5000).error_code(), "TIMEOUT");
        assert_eq!(GatewayError::database("mysql", "test").error_code(), "DATABASE_ERROR");
    }

    #[test]
    fn test_reason_codes_distinguishable() {
        let not_found = GatewayError::config_parse(
            ConfigParseReason::AssignmentNotFound,
            "no $databases assignment",
        );
        let incomplete = GatewayError::config_parse(ConfigParseReason::MissingKey, "no driver");

        assert!(not_found.message().contains("assignment_not_found"));
        assert!(incomplete.message().contains("missing_key"));
    }

    #[test]
    fn test_validation_reasons() {
        let err = GatewayError::validation(ValidationReason::ForbiddenKeyword, "DROP");
        assert!(err.message().contains("forbidden_keyword"));
        assert!(err.message().contains("DROP"));

        assert_eq!(ValidationReason::NotSelect.as_str(), "not_select");
        assert_eq!(ValidationReason::MultipleStatements.as_str(), "multiple_statements");
    }

    #[test]
    fn test_timeout_distinct_from_connection() {
        let timeout = GatewayError::Timeout(250);
        let conn = GatewayError::connection_failed("refused");
        assert_ne!(timeout.error_code(), conn.error_code());
        assert!(timeout.message().contains("250"));
    }
}

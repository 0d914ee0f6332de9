//! Error types for shellpilot-tools

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tool error type
#[derive(Debug, Error)]
pub enum Error {
    /// Tool not found
    #[error("tool not found: {0}")]
    NotFound(String),

    /// Tool execution failed
    #[error("execution failed: {0}")]
    Execution(String),

    /// Invalid input
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Command refused by the security validator
    #[error("command blocked: {0}")]
    ValidationBlocked(String),

    /// The shell process could not be started
    #[error("failed to start shell: {0}")]
    ProcessSpawn(String),

    /// Timeout
    #[error("timeout after {0}ms")]
    Timeout(u64),

    /// Every retry attempt failed
    #[error("retries exhausted after {attempts} attempts: {message}")]
    RetryExhausted {
        /// Number of attempts made
        attempts: u32,
        /// Description of the last failure
        message: String,
    },

    /// Session not found
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Session cap reached
    #[error("session capacity exceeded (max {0} active sessions)")]
    CapacityExceeded(usize),

    /// Operation not valid for the session's current state
    #[error("invalid session state: {0}")]
    InvalidState(String),

    /// Template not found
    #[error("template not found: {0}")]
    TemplateNotFound(String),

    /// Template placeholders without a value
    #[error("missing template parameters: {}", .0.join(", "))]
    TemplateParameterMissing(Vec<String>),

    /// Wait interrupted by a kill or shutdown
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Stable machine-readable code for this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Execution(_) => ErrorKind::Execution,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::ValidationBlocked(_) => ErrorKind::ValidationBlocked,
            Self::ProcessSpawn(_) => ErrorKind::ProcessSpawn,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::RetryExhausted { .. } => ErrorKind::RetryExhausted,
            Self::SessionNotFound(_) => ErrorKind::SessionNotFound,
            Self::CapacityExceeded(_) => ErrorKind::CapacityExceeded,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::TemplateNotFound(_) => ErrorKind::TemplateNotFound,
            Self::TemplateParameterMissing(_) => ErrorKind::TemplateParameterMissing,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::Io(_) => ErrorKind::Io,
            Self::Serialization(_) => ErrorKind::Serialization,
        }
    }
}

/// Failure taxonomy carried in results that cross the tool boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Command never ran
    ValidationBlocked,
    /// Command ran but the validator flagged it
    ValidationWarn,
    /// Shell could not start
    ProcessSpawn,
    /// Attempt aborted, the process may still be alive
    Timeout,
    /// All attempts failed
    RetryExhausted,
    /// Unknown session id
    SessionNotFound,
    /// Session cap reached
    CapacityExceeded,
    /// Operation rejected for the current session state
    InvalidState,
    /// Unknown template
    TemplateNotFound,
    /// Unresolved placeholders
    TemplateParameterMissing,
    /// Wait interrupted
    Cancelled,
    /// Bad tool input
    InvalidInput,
    /// Unknown tool
    NotFound,
    /// Generic execution failure
    Execution,
    /// IO failure
    Io,
    /// JSON failure
    Serialization,
}

impl ErrorKind {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationBlocked => "validation_blocked",
            Self::ValidationWarn => "validation_warn",
            Self::ProcessSpawn => "process_spawn",
            Self::Timeout => "timeout",
            Self::RetryExhausted => "retry_exhausted",
            Self::SessionNotFound => "session_not_found",
            Self::CapacityExceeded => "capacity_exceeded",
            Self::InvalidState => "invalid_state",
            Self::TemplateNotFound => "template_not_found",
            Self::TemplateParameterMissing => "template_parameter_missing",
            Self::Cancelled => "cancelled",
            Self::InvalidInput => "invalid_input",
            Self::NotFound => "not_found",
            Self::Execution => "execution",
            Self::Io => "io",
            Self::Serialization => "serialization",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_codes() {
        assert_eq!(
            Error::CapacityExceeded(3).kind(),
            ErrorKind::CapacityExceeded
        );
        assert_eq!(Error::Timeout(10).kind().as_str(), "timeout");
        let missing = Error::TemplateParameterMissing(vec!["host".into(), "port".into()]);
        assert_eq!(missing.to_string(), "missing template parameters: host, port");
        assert_eq!(
            serde_json::to_value(ErrorKind::RetryExhausted).unwrap(),
            serde_json::json!("retry_exhausted")
        );
    }
}

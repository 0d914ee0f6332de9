//! Command validation - pure, table-driven risk analysis
//!
//! Commands are scored against an ordered table of rules before they
//! reach a shell:
//!
//! ```text
//! critical  recursive root deletion, disk overwrite, fork bombs  -> BLOCK
//! high      remote code piped to a shell, denied paths, injection -> CONFIRM
//! medium    privilege escalation, recursive chmod/chown on /     -> CONFIRM
//! low       network tools, process signalling, file deletion     -> ALLOW
//! ```
//!
//! Validation never fails: malformed input still yields a verdict.

mod config;
mod rules;
mod validator;

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};

pub use config::SecurityConfig;
pub use validator::Validator;

/// Ordinal destructiveness of a command.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Nothing matched
    #[default]
    None,
    /// Informational
    Low,
    /// Needs a second look
    Medium,
    /// Dangerous
    High,
    /// Never executed
    Critical,
}

impl Severity {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Base risk score for this severity.
    #[must_use]
    pub fn base_score(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::Low => 25,
            Self::Medium => 50,
            Self::High => 75,
            Self::Critical => 100,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One matched rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationWarning {
    /// Rule category, e.g. `recursive_delete`
    #[serde(rename = "type")]
    pub kind: String,
    /// Human-readable explanation
    pub message: String,
    /// Severity of this rule
    pub severity: Severity,
}

/// Outcome of validating one command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    /// Trimmed command with control characters removed
    pub sanitized_command: String,
    /// True when nothing at medium severity or above matched
    pub safe: bool,
    /// Highest matched severity
    pub severity: Severity,
    /// The command must not run
    pub blocked: bool,
    /// The command should run only after explicit confirmation
    pub requires_confirmation: bool,
    /// Every matched rule, in table order
    pub warnings: Vec<ValidationWarning>,
    /// 0-100, monotonic in severity
    pub risk_score: u8,
    /// `BLOCK: ...`, `CONFIRM: ...` or `ALLOW`
    pub recommendation: String,
}

impl ValidationVerdict {
    /// Whether any rule matched.
    #[must_use]
    pub fn is_flagged(&self) -> bool {
        !self.warnings.is_empty()
    }
}

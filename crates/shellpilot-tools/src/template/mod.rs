//! Command templates
//!
//! A template is a named list of shell commands with `{{key}}`
//! placeholders. Running one substitutes every placeholder from the
//! caller's parameters and feeds the commands to the session manager in
//! one of three chain modes.

mod store;

#[cfg(test)]
mod tests;

pub use store::TemplateStore;

use crate::error::{Error, Result};
use crate::session::CommandResult;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.-]*)\s*\}\}")
        .expect("PLACEHOLDER is a compile-time constant")
});

/// A named, parameterized command sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    /// Unique name
    pub name: String,
    /// What the template is for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Commands, possibly containing `{{key}}` placeholders
    pub commands: Vec<String>,
    /// First saved
    pub created_at: DateTime<Utc>,
    /// Last saved
    pub updated_at: DateTime<Utc>,
}

impl Template {
    /// Placeholder names used by the commands, in order of first use.
    #[must_use]
    pub fn parameters(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for command in &self.commands {
            for cap in PLACEHOLDER.captures_iter(command) {
                let name = &cap[1];
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }
        names
    }

    /// Substitute `parameters` into every command.
    ///
    /// Fails with [`Error::TemplateParameterMissing`] naming every
    /// unresolved placeholder; nothing is returned partially rendered.
    pub fn render(&self, parameters: &HashMap<String, Value>) -> Result<Vec<String>> {
        let missing: Vec<String> = self
            .parameters()
            .into_iter()
            .filter(|name| !parameters.contains_key(name))
            .collect();
        if !missing.is_empty() {
            return Err(Error::TemplateParameterMissing(missing));
        }

        Ok(self
            .commands
            .iter()
            .map(|command| {
                PLACEHOLDER
                    .replace_all(command, |caps: &regex::Captures<'_>| {
                        parameters
                            .get(&caps[1])
                            .map(value_text)
                            .unwrap_or_default()
                    })
                    .into_owned()
            })
            .collect())
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// How template steps are chained
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainMode {
    /// One after another on the caller's session
    #[default]
    Sequential,
    /// Concurrently, each step on its own session
    Parallel,
    /// One after another; a step runs only if the previous one exited 0
    Conditional,
}

impl ChainMode {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Parallel => "parallel",
            Self::Conditional => "conditional",
        }
    }
}

impl std::fmt::Display for ChainMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ChainMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "parallel" => Ok(Self::Parallel),
            "conditional" => Ok(Self::Conditional),
            other => Err(Error::InvalidInput(format!("unknown chain mode '{}'", other))),
        }
    }
}

/// What happened to one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Ran and succeeded
    Succeeded,
    /// Ran and failed, or could not run
    Failed,
    /// Not run because an earlier step failed
    Skipped,
}

/// Result of one template step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    /// 1-based position in the template
    pub index: usize,
    /// The rendered command
    pub command: String,
    /// Outcome
    pub status: StepStatus,
    /// Session the step ran in
    pub session_id: String,
    /// The command result, when the step ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<CommandResult>,
    /// Why the step could not run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepReport {
    pub(crate) fn skipped(index: usize, command: String, session_id: &str) -> Self {
        Self {
            index,
            command,
            status: StepStatus::Skipped,
            session_id: session_id.to_string(),
            result: None,
            error: None,
        }
    }
}

/// Result of running a template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateReport {
    /// Template name
    pub template: String,
    /// Chain mode used
    pub chain_mode: ChainMode,
    /// One entry per command, in template order
    pub steps: Vec<StepReport>,
    /// Steps that actually ran
    pub steps_executed: usize,
    /// Steps that succeeded
    pub succeeded: usize,
    /// Steps that failed
    pub failed: usize,
    /// Steps not run
    pub skipped: usize,
    /// Every step ran and succeeded
    pub success: bool,
    /// Wall time of the whole run
    pub duration_ms: u64,
}

impl TemplateReport {
    pub(crate) fn new(
        template: &str,
        chain_mode: ChainMode,
        steps: Vec<StepReport>,
        duration_ms: u64,
    ) -> Self {
        let count = |status| steps.iter().filter(|s| s.status == status).count();
        let succeeded = count(StepStatus::Succeeded);
        let failed = count(StepStatus::Failed);
        let skipped = count(StepStatus::Skipped);
        Self {
            template: template.to_string(),
            chain_mode,
            steps_executed: succeeded + failed,
            succeeded,
            failed,
            skipped,
            success: failed == 0 && skipped == 0,
            steps,
            duration_ms,
        }
    }
}

/// Options for running a template
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateRun {
    /// Values for the placeholders
    pub parameters: HashMap<String, Value>,
    /// How steps are chained
    pub chain_mode: ChainMode,
    /// Stop a sequential run at the first failure
    pub stop_on_error: bool,
    /// Session for sequential and conditional runs; prefix for parallel ones
    pub session_id: String,
    /// Per-step timeout in seconds
    #[serde(rename = "timeout")]
    pub timeout_secs: Option<u64>,
}

impl Default for TemplateRun {
    fn default() -> Self {
        Self {
            parameters: HashMap::new(),
            chain_mode: ChainMode::Sequential,
            stop_on_error: true,
            session_id: crate::constants::DEFAULT_SESSION_ID.to_string(),
            timeout_secs: None,
        }
    }
}

impl TemplateRun {
    /// Set one parameter
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Set the chain mode
    #[must_use]
    pub fn with_chain_mode(mut self, chain_mode: ChainMode) -> Self {
        self.chain_mode = chain_mode;
        self
    }

    /// Set whether a failure stops a sequential run
    #[must_use]
    pub fn with_stop_on_error(mut self, stop_on_error: bool) -> Self {
        self.stop_on_error = stop_on_error;
        self
    }

    /// Set the session
    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    /// Set the per-step timeout
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }
}

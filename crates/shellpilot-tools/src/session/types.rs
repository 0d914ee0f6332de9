//! Session data types

use crate::constants::DEFAULT_SESSION_ID;
use crate::error::ErrorKind;
use crate::retry::RetryOutcome;
use crate::security::ValidationVerdict;
use crate::stream::StreamEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Ready for a command
    Active,
    /// A program is waiting for input
    AwaitingInput,
    /// The shell is gone
    Terminated,
}

impl SessionStatus {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::AwaitingInput => "awaiting_input",
            Self::Terminated => "terminated",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Prompt captured while a session awaits input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPrompt {
    /// The prompt line as shown by the program
    pub message: String,
    /// The pattern that recognized it
    pub pattern: String,
}

/// One entry of a session's command history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRecord {
    /// Command as submitted
    pub command: String,
    /// When it was written to the shell
    pub started_at: DateTime<Utc>,
    /// Exit status, if the command completed
    pub exit_code: Option<i32>,
    /// Working directory at submission
    pub cwd_at_run: PathBuf,
    /// Wall time until completion or abort
    pub duration_ms: u64,
}

/// A request to run a command or answer a prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecuteRequest {
    /// Command line to run
    pub command: Option<String>,
    /// Text sent to a pending prompt (a newline is appended)
    pub input: Option<String>,
    /// Regex that marks the output as waiting for input
    pub expect_prompt: Option<String>,
    /// Target session, created on first use
    pub session_id: String,
    /// Seconds to wait for completion
    #[serde(rename = "timeout")]
    pub timeout_secs: Option<u64>,
    /// Working directory for a new session
    pub cwd: Option<PathBuf>,
    /// Extra environment for a new session
    pub env: HashMap<String, String>,
    /// `auto`, a shell name or a path
    pub shell: String,
    /// Classify output into events
    pub streaming: bool,
    /// Apply the retry policy
    pub retry: bool,
    /// Run the security validator first
    pub validate: bool,
}

impl Default for ExecuteRequest {
    fn default() -> Self {
        Self {
            command: None,
            input: None,
            expect_prompt: None,
            session_id: DEFAULT_SESSION_ID.to_string(),
            timeout_secs: None,
            cwd: None,
            env: HashMap::new(),
            shell: "auto".to_string(),
            streaming: true,
            retry: true,
            validate: true,
        }
    }
}

impl ExecuteRequest {
    /// Request running `command` in the default session.
    #[must_use]
    pub fn command(command: impl Into<String>) -> Self {
        Self {
            command: Some(command.into()),
            ..Self::default()
        }
    }

    /// Request answering the pending prompt with `input`.
    #[must_use]
    pub fn input(input: impl Into<String>) -> Self {
        Self {
            input: Some(input.into()),
            ..Self::default()
        }
    }

    /// Target a specific session.
    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    /// Also send `input` right after the command.
    #[must_use]
    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    /// Stop with a pending prompt when output matches `pattern`.
    #[must_use]
    pub fn with_expect_prompt(mut self, pattern: impl Into<String>) -> Self {
        self.expect_prompt = Some(pattern.into());
        self
    }

    /// Set the timeout in seconds.
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Set the working directory of a new session.
    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Add an environment variable for a new session.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Choose the shell of a new session.
    #[must_use]
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Enable or disable the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: bool) -> Self {
        self.retry = retry;
        self
    }

    /// Enable or disable validation.
    #[must_use]
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// Enable or disable output classification.
    #[must_use]
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }
}

/// Outcome of one `execute` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    /// Terminal output (stdout and stderr share the PTY)
    pub stdout: String,
    /// Notices from the engine itself, such as timeouts
    pub stderr: String,
    /// Exit status; `None` while pending, on timeout or when blocked
    pub exit_code: Option<i32>,
    /// The program is waiting for input
    pub is_prompt_pending: bool,
    /// The prompt line when one is pending
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_message: Option<String>,
    /// Session the command ran in
    pub session_id: String,
    /// Wall time of the final attempt
    pub duration_ms: u64,
    /// Completion time
    pub timestamp: DateTime<Utc>,
    /// Whether the validator considered the command harmless
    pub safe: bool,
    /// The final attempt hit its timeout
    pub timed_out: bool,
    /// Attempts made, including the first
    pub attempts_made: u32,
    /// Output was cut at the configured cap
    pub truncated: bool,
    /// Verdict, when the validator flagged the command
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationVerdict>,
    /// Classified output lines
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<StreamEvent>,
    /// Failure code when the result encodes one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip)]
    pub(crate) shell_exited: bool,
}

impl CommandResult {
    /// An empty result for `session_id`.
    #[must_use]
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            is_prompt_pending: false,
            prompt_message: None,
            session_id: session_id.into(),
            duration_ms: 0,
            timestamp: Utc::now(),
            safe: true,
            timed_out: false,
            attempts_made: 1,
            truncated: false,
            validation: None,
            events: Vec::new(),
            error_kind: None,
            shell_exited: false,
        }
    }

    /// Result for a command the validator refused. Nothing ran.
    #[must_use]
    pub fn blocked(session_id: impl Into<String>, verdict: ValidationVerdict) -> Self {
        Self {
            stderr: verdict.recommendation.clone(),
            safe: false,
            attempts_made: 0,
            error_kind: Some(ErrorKind::ValidationBlocked),
            validation: Some(verdict),
            ..Self::new(session_id)
        }
    }

    /// Completed with exit status 0, or stopped at a prompt.
    #[must_use]
    pub fn is_success(&self) -> bool {
        let failed = self
            .error_kind
            .is_some_and(|k| k != ErrorKind::ValidationWarn);
        !failed && (self.is_prompt_pending || self.exit_code == Some(0))
    }
}

impl RetryOutcome for CommandResult {
    fn retry_exit_code(&self) -> Option<i32> {
        if self.timed_out {
            Some(crate::constants::TIMEOUT_EXIT_CODE)
        } else {
            self.exit_code
        }
    }

    fn is_retry_exempt(&self) -> bool {
        self.is_prompt_pending
            || self.shell_exited
            || self.error_kind == Some(ErrorKind::ValidationBlocked)
    }

    fn record_attempts(&mut self, attempts: u32, exhausted: bool) {
        self.attempts_made = attempts;
        if exhausted {
            self.error_kind = Some(ErrorKind::RetryExhausted);
        }
    }
}

/// A classified output line, tagged with its session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEvent {
    /// Session that produced the line
    pub session_id: String,
    /// The classified line
    pub event: StreamEvent,
}

/// One row of `list_sessions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Session id
    pub session_id: String,
    /// Lifecycle state
    pub status: SessionStatus,
    /// Current working directory
    pub cwd: PathBuf,
    /// Last command start or finish
    pub last_activity_at: DateTime<Utc>,
    /// Shell program (detailed only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,
    /// Creation time (detailed only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Shell process id (detailed only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Commands run so far (detailed only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commands_run: Option<u64>,
    /// Pending prompt text (detailed only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_prompt: Option<String>,
}

/// Descriptive state of a session, live or persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Session id
    pub session_id: String,
    /// Lifecycle state
    pub status: SessionStatus,
    /// Shell program
    pub shell: String,
    /// Working directory
    pub cwd: PathBuf,
    /// Environment overrides given at creation
    pub env: HashMap<String, String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last command start or finish
    pub last_activity_at: DateTime<Utc>,
    /// Prompt awaiting input
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_prompt: Option<PendingPrompt>,
    /// Commands run so far
    pub commands_run: u64,
    /// Recent commands, oldest first
    #[serde(default)]
    pub history: Vec<CommandRecord>,
    /// Output of the most recent command
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_output: Option<String>,
    /// Whether the shell is still running
    pub live: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults_from_json() {
        let request: ExecuteRequest = serde_json::from_value(serde_json::json!({
            "command": "ls",
            "timeout": 5
        }))
        .unwrap();
        assert_eq!(request.session_id, "default");
        assert_eq!(request.timeout_secs, Some(5));
        assert_eq!(request.shell, "auto");
        assert!(request.streaming && request.retry && request.validate);
    }

    #[test]
    fn test_result_retry_code() {
        let mut result = CommandResult::new("s");
        result.exit_code = Some(7);
        assert_eq!(result.retry_exit_code(), Some(7));
        result.timed_out = true;
        result.exit_code = None;
        assert_eq!(result.retry_exit_code(), Some(124));

        result.record_attempts(4, true);
        assert_eq!(result.attempts_made, 4);
        assert_eq!(result.error_kind, Some(ErrorKind::RetryExhausted));
        assert!(!result.is_success());
    }

    #[test]
    fn test_prompt_pending_is_exempt_and_successful() {
        let mut result = CommandResult::new("s");
        result.is_prompt_pending = true;
        assert!(result.is_retry_exempt());
        assert!(result.is_success());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(SessionStatus::AwaitingInput).unwrap(),
            serde_json::json!("awaiting_input")
        );
    }
}

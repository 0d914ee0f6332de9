//! Terminal engine configuration types
//!
//! Every section deserializes with defaults so a partial TOML table (or
//! none at all) yields a working configuration.

use crate::constants::*;
use crate::retry::RetryPolicy;
use crate::security::SecurityConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Complete configuration for the session manager and its collaborators.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// Shell selection and environment.
    pub shell: ShellConfig,
    /// Session lifecycle limits.
    pub session: SessionConfig,
    /// Command validation.
    pub security: SecurityConfig,
    /// Default retry policy.
    pub retry: RetryPolicy,
    /// Output classification.
    pub streaming: StreamingConfig,
    /// Where templates and session snapshots are persisted.
    /// Nothing is written when unset.
    pub state_dir: Option<PathBuf>,
}

impl TerminalConfig {
    /// Path of the template file, if persistence is enabled.
    #[must_use]
    pub fn templates_path(&self) -> Option<PathBuf> {
        self.state_dir.as_ref().map(|d| d.join("templates.json"))
    }

    /// Directory for session snapshots, if persistence is enabled.
    #[must_use]
    pub fn snapshots_dir(&self) -> Option<PathBuf> {
        self.state_dir.as_ref().map(|d| d.join("sessions"))
    }
}

/// Shell selection and environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Shell used when a request says `auto`: a path or name, or `auto`
    /// to follow `$SHELL` and fall back to bash.
    pub default_shell: String,
    /// Extra environment per shell name (`bash`, `zsh`, `sh`).
    pub env_overrides: HashMap<String, HashMap<String, String>>,
    /// Variables copied from the host environment.
    pub env_whitelist: Vec<String>,
    /// How long a new shell may take to become ready.
    pub startup_timeout_ms: u64,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            default_shell: "auto".to_string(),
            env_overrides: HashMap::new(),
            env_whitelist: ENV_WHITELIST.iter().map(|s| (*s).to_string()).collect(),
            startup_timeout_ms: SHELL_STARTUP_TIMEOUT_MS,
        }
    }
}

/// Session lifecycle limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum number of live sessions.
    pub max_active_sessions: usize,
    /// Idle time after which a session is terminated.
    pub idle_timeout_secs: u64,
    /// Interval of the background idle sweep.
    pub sweep_interval_secs: u64,
    /// Commands kept in each session's history.
    pub history_limit: usize,
    /// Timeout applied when a request gives none.
    pub default_timeout_secs: u64,
    /// Upper bound for requested timeouts.
    pub max_timeout_secs: u64,
    /// Cap on returned output per command.
    pub max_output_bytes: usize,
    /// Wait between the requested signal and SIGKILL.
    pub kill_grace_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_active_sessions: MAX_ACTIVE_SESSIONS,
            idle_timeout_secs: SESSION_IDLE_TIMEOUT_SECS,
            sweep_interval_secs: SESSION_SWEEP_INTERVAL_SECS,
            history_limit: HISTORY_LIMIT,
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_timeout_secs: MAX_TIMEOUT_SECS,
            max_output_bytes: MAX_OUTPUT_BYTES,
            kill_grace_ms: KILL_GRACE_MS,
        }
    }
}

impl SessionConfig {
    /// Idle timeout as a [`Duration`].
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Clamp a requested timeout (seconds) to the configured bounds.
    #[must_use]
    pub fn clamp_timeout(&self, requested: Option<u64>) -> Duration {
        let secs = requested
            .unwrap_or(self.default_timeout_secs)
            .clamp(1, self.max_timeout_secs.max(1));
        Duration::from_secs(secs)
    }
}

/// Output classification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Classify output into events.
    pub enabled: bool,
    /// Treat a quiet trailing line matching `prompt_patterns` as a prompt
    /// when the caller gave no `expect_prompt`.
    pub detect_prompts: bool,
    /// Patterns for prompt detection and classification.
    pub prompt_patterns: Vec<String>,
    /// Quiet period before a trailing line is checked for a prompt.
    pub prompt_idle_ms: u64,
    /// Events kept per command result.
    pub max_events: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            detect_prompts: true,
            prompt_patterns: DEFAULT_PROMPT_PATTERNS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            prompt_idle_ms: PROMPT_IDLE_MS,
            max_events: MAX_STREAM_EVENTS,
        }
    }
}

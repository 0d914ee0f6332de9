//! Application configuration types

use serde::{Deserialize, Serialize};
use shellpilot_tools::TerminalConfig;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub terminal: TerminalConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directives, used when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable text
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "shellpilot=info,shellpilot_tools=info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Fill in the platform data directory when no state directory is set.
    pub fn with_default_state_dir(mut self) -> Self {
        if self.terminal.state_dir.is_none() {
            self.terminal.state_dir = dirs::data_local_dir().map(|d| d.join("shellpilot"));
        }
        self
    }
}

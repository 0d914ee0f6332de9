//! Validator configuration

use crate::constants::DEFAULT_DENIED_PATHS;
use serde::{Deserialize, Serialize};

/// Configuration for command validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Gate execution on the validator.
    pub enabled: bool,
    /// Block every command whose segments start with a command outside
    /// `allowed_commands`.
    pub whitelist_mode: bool,
    /// Commands allowed in whitelist mode.
    pub allowed_commands: Vec<String>,
    /// Paths a command may not touch. `~` expands to the home directory.
    pub denied_paths: Vec<String>,
    /// Mask credentials in returned output.
    pub mask_secrets: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            whitelist_mode: false,
            allowed_commands: Vec::new(),
            denied_paths: DEFAULT_DENIED_PATHS.iter().map(|s| (*s).to_string()).collect(),
            mask_secrets: true,
        }
    }
}

//! list_sessions and kill_session

use super::{default_true, parse_input};
use crate::error::Result;
use crate::registry::{RiskLevel, Tool, ToolCategory, ToolDefinition, ToolResult};
use crate::session::{KillSignal, SessionManager};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

#[derive(Deserialize)]
struct ListInput {
    #[serde(default)]
    detailed: bool,
}

/// Lists live sessions.
pub struct ListSessionsTool {
    definition: ToolDefinition,
    manager: Arc<SessionManager>,
}

impl ListSessionsTool {
    /// Create the tool over `manager`.
    #[must_use]
    pub fn new(manager: Arc<SessionManager>) -> Self {
        let definition = ToolDefinition::new(
            "list_sessions",
            "List live shell sessions with their status and working directory.",
        )
        .with_category(ToolCategory::Session)
        .with_risk_level(RiskLevel::Low)
        .with_parameters(serde_json::json!({
            "type": "object",
            "properties": {
                "detailed": {
                    "type": "boolean",
                    "description": "Include shell, pid, creation time and counters (default: false)"
                }
            }
        }));

        Self {
            definition,
            manager,
        }
    }
}

#[async_trait]
impl Tool for ListSessionsTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, input: serde_json::Value) -> Result<ToolResult> {
        let params: ListInput = parse_input(input)?;
        let start = Instant::now();

        let sessions = self.manager.list_sessions(params.detailed).await;
        Ok(ToolResult::success(
            serde_json::json!({
                "count": sessions.len(),
                "sessions": sessions,
            }),
            start.elapsed().as_millis() as u64,
        ))
    }
}

#[derive(Deserialize)]
struct KillInput {
    session_id: String,
    #[serde(default)]
    signal: Option<String>,
    #[serde(default = "default_true")]
    save_state: bool,
}

/// Terminates a session's shell and everything it started.
pub struct KillSessionTool {
    definition: ToolDefinition,
    manager: Arc<SessionManager>,
}

impl KillSessionTool {
    /// Create the tool over `manager`.
    #[must_use]
    pub fn new(manager: Arc<SessionManager>) -> Self {
        let definition = ToolDefinition::new(
            "kill_session",
            "Terminate a session. The signal goes to the shell's whole process \
             group; a shell still alive after the grace period gets SIGKILL.",
        )
        .with_category(ToolCategory::Session)
        .with_risk_level(RiskLevel::Medium)
        .with_parameters(serde_json::json!({
            "type": "object",
            "properties": {
                "session_id": {
                    "type": "string",
                    "description": "Session to terminate"
                },
                "signal": {
                    "type": "string",
                    "enum": ["SIGTERM", "SIGINT", "SIGHUP", "SIGQUIT", "SIGKILL"],
                    "description": "Signal to send first (default: SIGTERM)"
                },
                "save_state": {
                    "type": "boolean",
                    "description": "Persist a snapshot for get_session_state (default: true)"
                }
            },
            "required": ["session_id"]
        }));

        Self {
            definition,
            manager,
        }
    }
}

#[async_trait]
impl Tool for KillSessionTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, input: serde_json::Value) -> Result<ToolResult> {
        let params: KillInput = parse_input(input)?;
        let signal = match params.signal.as_deref() {
            Some(s) => s.parse::<KillSignal>()?,
            None => KillSignal::default(),
        };
        let start = Instant::now();

        info!(session_id = %params.session_id, signal = %signal, "kill_session");
        let report = self
            .manager
            .kill_session(&params.session_id, signal, params.save_state)
            .await?;

        Ok(ToolResult::success(
            serde_json::to_value(&report)?,
            start.elapsed().as_millis() as u64,
        ))
    }
}

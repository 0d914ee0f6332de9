//! get_session_state

use super::{default_session_id, default_true, parse_input};
use crate::constants::HISTORY_LIMIT;
use crate::error::Result;
use crate::registry::{RiskLevel, Tool, ToolCategory, ToolDefinition, ToolResult};
use crate::session::SessionManager;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;

fn default_history_limit() -> usize {
    HISTORY_LIMIT
}

#[derive(Deserialize)]
struct StateInput {
    #[serde(default = "default_session_id")]
    session_id: String,
    #[serde(default = "default_true")]
    include_history: bool,
    #[serde(default)]
    include_output: bool,
    #[serde(default = "default_history_limit")]
    history_limit: usize,
}

/// Describes a live session, or the last snapshot of a killed one.
pub struct SessionStateTool {
    definition: ToolDefinition,
    manager: Arc<SessionManager>,
}

impl SessionStateTool {
    /// Create the tool over `manager`.
    #[must_use]
    pub fn new(manager: Arc<SessionManager>) -> Self {
        let definition = ToolDefinition::new(
            "get_session_state",
            "Get a session's status, working directory, environment, pending \
             prompt and command history.",
        )
        .with_category(ToolCategory::Session)
        .with_risk_level(RiskLevel::Low)
        .with_parameters(serde_json::json!({
            "type": "object",
            "properties": {
                "session_id": {
                    "type": "string",
                    "description": "Session to describe (default: \"default\")"
                },
                "include_history": {
                    "type": "boolean",
                    "description": "Include command history (default: true)"
                },
                "include_output": {
                    "type": "boolean",
                    "description": "Include the last command's output (default: false)"
                },
                "history_limit": {
                    "type": "integer",
                    "description": format!("Most recent history entries to return (default {})", HISTORY_LIMIT)
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
impl Tool for SessionStateTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, input: serde_json::Value) -> Result<ToolResult> {
        let params: StateInput = parse_input(input)?;
        let start = Instant::now();

        let snapshot = self
            .manager
            .get_session_state(
                &params.session_id,
                params.include_history,
                params.include_output,
                params.history_limit,
            )
            .await?;

        Ok(ToolResult::success(
            serde_json::to_value(&snapshot)?,
            start.elapsed().as_millis() as u64,
        ))
    }
}

//! validate_command

use super::{default_true, parse_input};
use crate::error::Result;
use crate::registry::{RiskLevel, Tool, ToolCategory, ToolDefinition, ToolResult};
use crate::session::SessionManager;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;

#[derive(Deserialize)]
struct ValidateInput {
    command: String,
    #[serde(default = "default_true")]
    detailed: bool,
}

/// Risk analysis of a command. Never executes it.
pub struct ValidateCommandTool {
    definition: ToolDefinition,
    manager: Arc<SessionManager>,
}

impl ValidateCommandTool {
    /// Create the tool over the manager's validator.
    #[must_use]
    pub fn new(manager: Arc<SessionManager>) -> Self {
        let definition = ToolDefinition::new(
            "validate_command",
            "Analyze a shell command for destructive, privileged or sensitive \
             operations without running it. Returns severity, risk score and \
             whether it would be blocked.",
        )
        .with_category(ToolCategory::Security)
        .with_risk_level(RiskLevel::Low)
        .with_parameters(serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Command to analyze"
                },
                "dry_run": {
                    "type": "boolean",
                    "description": "Always true; the command is never run"
                },
                "detailed": {
                    "type": "boolean",
                    "description": "Include every matched rule (default: true)"
                }
            },
            "required": ["command"]
        }));

        Self {
            definition,
            manager,
        }
    }
}

#[async_trait]
impl Tool for ValidateCommandTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, input: serde_json::Value) -> Result<ToolResult> {
        let params: ValidateInput = parse_input(input)?;
        let start = Instant::now();

        let verdict = self.manager.validator().validate(&params.command);
        let mut output = serde_json::to_value(&verdict)?;
        if !params.detailed {
            if let Some(obj) = output.as_object_mut() {
                obj.remove("warnings");
                obj.insert(
                    "warning_count".to_string(),
                    serde_json::json!(verdict.warnings.len()),
                );
            }
        }

        Ok(ToolResult::success(output, start.elapsed().as_millis() as u64))
    }
}

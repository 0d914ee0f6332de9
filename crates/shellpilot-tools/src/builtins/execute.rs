//! execute_interactive_command

use super::parse_input;
use crate::error::Result;
use crate::registry::{RiskLevel, Tool, ToolCategory, ToolDefinition, ToolResult};
use crate::session::{CommandResult, ExecuteRequest, SessionManager};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Runs a command in a PTY session, or answers the session's pending prompt.
pub struct ExecuteCommandTool {
    definition: ToolDefinition,
    manager: Arc<SessionManager>,
}

impl ExecuteCommandTool {
    /// Create the tool over `manager`.
    #[must_use]
    pub fn new(manager: Arc<SessionManager>) -> Self {
        let session = &manager.config().session;
        let definition = ToolDefinition::new(
            "execute_interactive_command",
            "Execute a shell command in a persistent PTY session. Shell state \
             (cwd, variables) carries over between calls with the same session_id. \
             If the command stops at a prompt, the result has is_prompt_pending=true; \
             answer it with `input` on the same session.",
        )
        .with_category(ToolCategory::Exec)
        .with_risk_level(RiskLevel::High)
        .with_parameters(serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Command to run"
                },
                "input": {
                    "type": "string",
                    "description": "Reply to a pending prompt (sent with a trailing newline)"
                },
                "expect_prompt": {
                    "type": "string",
                    "description": "Regex for a prompt the command is expected to show"
                },
                "session_id": {
                    "type": "string",
                    "description": "Session to use (default: \"default\")"
                },
                "timeout": {
                    "type": "integer",
                    "description": format!(
                        "Timeout in seconds (default {}, max {})",
                        session.default_timeout_secs, session.max_timeout_secs
                    )
                },
                "cwd": {
                    "type": "string",
                    "description": "Working directory for a new session"
                },
                "env": {
                    "type": "object",
                    "additionalProperties": { "type": "string" },
                    "description": "Extra environment for a new session"
                },
                "shell": {
                    "type": "string",
                    "enum": ["auto", "bash", "zsh", "sh"],
                    "description": "Shell for a new session (default: auto)"
                },
                "streaming": {
                    "type": "boolean",
                    "description": "Classify output into events (default: true)"
                },
                "retry": {
                    "type": "boolean",
                    "description": "Retry transient failures (default: true)"
                },
                "validate": {
                    "type": "boolean",
                    "description": "Run the security validator first (default: true)"
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
impl Tool for ExecuteCommandTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, input: serde_json::Value) -> Result<ToolResult> {
        let request: ExecuteRequest = parse_input(input)?;
        let start = Instant::now();

        info!(session_id = %request.session_id, "execute_interactive_command");
        let result = self.manager.execute(request).await?;
        Ok(command_tool_result(result, start.elapsed().as_millis() as u64))
    }
}

/// Wrap a [`CommandResult`] so callers see failures at the top level too.
fn command_tool_result(result: CommandResult, duration_ms: u64) -> ToolResult {
    let success = result.is_success();
    let error = (!success).then(|| failure_message(&result));
    let error_kind = result.error_kind;
    ToolResult {
        success,
        output: serde_json::to_value(&result).unwrap_or_default(),
        error,
        error_kind,
        duration_ms,
    }
}

fn failure_message(result: &CommandResult) -> String {
    if !result.stderr.is_empty() {
        return result.stderr.clone();
    }
    match result.exit_code {
        Some(code) => format!("Command exited with status {}", code),
        None => "Command did not complete".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_failure_message_prefers_stderr() {
        let mut result = CommandResult::new("s");
        result.exit_code = Some(3);
        assert_eq!(failure_message(&result), "Command exited with status 3");

        result.stderr = "[TIMEOUT] late".to_string();
        assert_eq!(failure_message(&result), "[TIMEOUT] late");
    }

    #[test]
    fn test_tool_result_mirrors_command_result() {
        let mut result = CommandResult::new("s");
        result.exit_code = Some(0);
        let ok = command_tool_result(result.clone(), 1);
        assert!(ok.success);
        assert!(ok.error.is_none());
        assert_eq!(ok.output["exit_code"], 0);

        result.exit_code = Some(7);
        result.error_kind = Some(ErrorKind::RetryExhausted);
        let failed = command_tool_result(result, 1);
        assert!(!failed.success);
        assert_eq!(failed.error_kind, Some(ErrorKind::RetryExhausted));
        assert_eq!(failed.output["session_id"], "s");
    }
}

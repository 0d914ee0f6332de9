//! execute_template

use super::{default_session_id, default_true, parse_input};
use crate::error::{Error, Result};
use crate::registry::{RiskLevel, Tool, ToolCategory, ToolDefinition, ToolResult};
use crate::template::{ChainMode, TemplateRun, TemplateStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// What `execute_template` should do
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateAction {
    /// Run a template
    #[default]
    Execute,
    /// Create or replace a template
    Save,
    /// List templates
    List,
    /// Show one template
    Get,
    /// Remove a template
    Delete,
}

#[derive(Deserialize)]
struct TemplateInput {
    #[serde(default)]
    action: TemplateAction,
    template_name: Option<String>,
    commands: Option<Vec<String>>,
    description: Option<String>,
    #[serde(default)]
    parameters: HashMap<String, Value>,
    #[serde(default = "default_session_id")]
    session_id: String,
    #[serde(default)]
    chain_mode: ChainMode,
    #[serde(default = "default_true")]
    stop_on_error: bool,
    timeout: Option<u64>,
}

impl TemplateInput {
    fn name(&self) -> Result<&str> {
        self.template_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| Error::InvalidInput("template_name is required".to_string()))
    }
}

/// Manages and runs command templates.
pub struct TemplateTool {
    definition: ToolDefinition,
    store: Arc<TemplateStore>,
}

impl TemplateTool {
    /// Create the tool over `store`.
    #[must_use]
    pub fn new(store: Arc<TemplateStore>) -> Self {
        let definition = ToolDefinition::new(
            "execute_template",
            "Save, list, show, delete or run named command templates. Commands \
             may contain {{key}} placeholders filled from `parameters`; a run \
             with any placeholder left unfilled executes nothing.",
        )
        .with_category(ToolCategory::Template)
        .with_risk_level(RiskLevel::High)
        .with_parameters(serde_json::json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["execute", "save", "list", "get", "delete"],
                    "description": "Action to perform (default: execute)"
                },
                "template_name": {
                    "type": "string",
                    "description": "Template name (all actions except list)"
                },
                "commands": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Commands to save"
                },
                "description": {
                    "type": "string",
                    "description": "What the template does (save)"
                },
                "parameters": {
                    "type": "object",
                    "description": "Placeholder values (execute)"
                },
                "session_id": {
                    "type": "string",
                    "description": "Session to run in; parallel steps use <session_id>-step-<n>"
                },
                "chain_mode": {
                    "type": "string",
                    "enum": ["sequential", "parallel", "conditional"],
                    "description": "How steps are chained (default: sequential)"
                },
                "stop_on_error": {
                    "type": "boolean",
                    "description": "Stop a sequential run at the first failure (default: true)"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Per-step timeout in seconds"
                }
            }
        }));

        Self { definition, store }
    }
}

#[async_trait]
impl Tool for TemplateTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, input: serde_json::Value) -> Result<ToolResult> {
        let params: TemplateInput = parse_input(input)?;
        let start = Instant::now();
        let elapsed = || start.elapsed().as_millis() as u64;

        match params.action {
            TemplateAction::List => {
                let templates = self.store.list().await;
                Ok(ToolResult::success(
                    serde_json::json!({
                        "count": templates.len(),
                        "templates": templates,
                    }),
                    elapsed(),
                ))
            }
            TemplateAction::Get => {
                let template = self.store.get(params.name()?).await?;
                let required = template.parameters();
                let mut output = serde_json::to_value(&template)?;
                output["parameters"] = serde_json::json!(required);
                Ok(ToolResult::success(output, elapsed()))
            }
            TemplateAction::Save => {
                let name = params.name()?;
                let commands = params.commands.clone().ok_or_else(|| {
                    Error::InvalidInput("commands are required to save a template".to_string())
                })?;
                let template = self
                    .store
                    .save(name, commands, params.description.clone())
                    .await?;
                Ok(ToolResult::success(
                    serde_json::json!({ "saved": true, "template": template }),
                    elapsed(),
                ))
            }
            TemplateAction::Delete => {
                let template = self.store.delete(params.name()?).await?;
                Ok(ToolResult::success(
                    serde_json::json!({ "deleted": true, "name": template.name }),
                    elapsed(),
                ))
            }
            TemplateAction::Execute => {
                let name = params.name()?.to_string();
                let run = TemplateRun {
                    parameters: params.parameters,
                    chain_mode: params.chain_mode,
                    stop_on_error: params.stop_on_error,
                    session_id: params.session_id,
                    timeout_secs: params.timeout,
                };
                let report = self.store.execute(&name, run).await?;
                let mut result = ToolResult::success(serde_json::to_value(&report)?, elapsed());
                if !report.success {
                    result.success = false;
                    result.error = Some(format!(
                        "{} of {} steps failed, {} skipped",
                        report.failed,
                        report.steps.len(),
                        report.skipped
                    ));
                }
                Ok(result)
            }
        }
    }
}

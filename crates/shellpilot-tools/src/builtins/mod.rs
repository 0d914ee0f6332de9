//! Builtins - The tools Shellpilot exposes
//!
//! - execute_interactive_command: run a command or answer a prompt
//! - validate_command: risk analysis without execution
//! - get_session_state / list_sessions / kill_session: session control
//! - execute_template: save, list, inspect, delete and run templates

mod execute;
mod sessions;
mod state;
mod template;
mod validate;


pub use execute::ExecuteCommandTool;
pub use sessions::{KillSessionTool, ListSessionsTool};
pub use state::SessionStateTool;
pub use template::{TemplateAction, TemplateTool};
pub use validate::ValidateCommandTool;

use crate::error::Error;
use crate::registry::ToolRegistry;
use crate::session::SessionManager;
use crate::template::TemplateStore;
use std::sync::Arc;

/// Register the six terminal tools, all sharing one session manager.
pub fn register_terminal_tools(
    registry: &mut ToolRegistry,
    manager: Arc<SessionManager>,
    templates: Arc<TemplateStore>,
) {
    registry.register(Arc::new(ExecuteCommandTool::new(manager.clone())));
    registry.register(Arc::new(ValidateCommandTool::new(manager.clone())));
    registry.register(Arc::new(SessionStateTool::new(manager.clone())));
    registry.register(Arc::new(TemplateTool::new(templates)));
    registry.register(Arc::new(ListSessionsTool::new(manager.clone())));
    registry.register(Arc::new(KillSessionTool::new(manager)));
}

fn parse_input<T: serde::de::DeserializeOwned>(input: serde_json::Value) -> crate::Result<T> {
    serde_json::from_value(input)
        .map_err(|e| Error::InvalidInput(format!("Invalid arguments: {}", e)))
}

fn default_session_id() -> String {
    crate::constants::DEFAULT_SESSION_ID.to_string()
}

fn default_true() -> bool {
    true
}

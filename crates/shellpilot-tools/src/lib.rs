//! Shellpilot Tools - Interactive command execution engine
//!
//! This crate provides the execution core behind the Shellpilot tools:
//! - Security: pure, table-driven command risk validation
//! - Retry: backoff strategies around a single command attempt
//! - Stream: live classification of shell output lines
//! - Session: PTY-backed shell sessions and their manager
//! - Template: named, parameterized command sequences
//! - Builtins: the six tools exposed through the registry

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod builtins;
pub mod config;
pub mod error;
pub mod registry;
pub mod retry;
mod constants;
mod sanitize;
pub mod security;
pub mod session;
pub mod stream;
pub mod template;

pub use builtins::register_terminal_tools;
pub use config::{ShellConfig, SessionConfig, StreamingConfig, TerminalConfig};
pub use error::{Error, ErrorKind, Result};
pub use registry::{RiskLevel, Tool, ToolCategory, ToolDefinition, ToolRegistry, ToolResult};
pub use retry::{run_with_retry, RetryPolicy, RetryStrategy};
pub use security::{SecurityConfig, Severity, ValidationVerdict, ValidationWarning, Validator};
pub use session::{
    CommandRecord, CommandResult, ExecuteRequest, FileSnapshotStore, KillReport, KillSignal,
    PendingPrompt, SessionEvent, SessionManager, SessionSnapshot, SessionStatus, SessionSummary,
    SnapshotStore,
};
pub use stream::{StreamClassifier, StreamEvent, StreamEventKind};
pub use template::{
    ChainMode, StepReport, StepStatus, Template, TemplateReport, TemplateRun, TemplateStore,
};

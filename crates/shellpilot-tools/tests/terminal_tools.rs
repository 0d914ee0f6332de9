//! End-to-end tests through the tool registry (these spawn real bash shells)

use serde_json::{json, Value};
use shellpilot_tools::{
    register_terminal_tools, ErrorKind, RetryPolicy, SessionManager, TemplateStore,
    TerminalConfig, ToolRegistry, ToolResult,
};
use std::sync::Arc;
use std::time::Duration;

fn config() -> TerminalConfig {
    let mut config = TerminalConfig::default();
    config.shell.default_shell = "bash".to_string();
    config.session.kill_grace_ms = 200;
    config.retry = RetryPolicy::disabled();
    config
}

fn registry_with(config: TerminalConfig) -> ToolRegistry {
    let manager = Arc::new(SessionManager::new(config));
    let templates = Arc::new(TemplateStore::in_memory(manager.clone()));
    let mut registry = ToolRegistry::new();
    register_terminal_tools(&mut registry, manager, templates);
    registry
}

async fn exec(registry: &ToolRegistry, input: Value) -> ToolResult {
    registry.invoke("execute_interactive_command", input).await
}

async fn session_count(registry: &ToolRegistry) -> u64 {
    registry
        .invoke("list_sessions", json!({}))
        .await
        .output["count"]
        .as_u64()
        .unwrap()
}

#[tokio::test]
async fn test_echo_hello() {
    let registry = registry_with(config());
    let result = exec(&registry, json!({"command": "echo hello"})).await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.output["exit_code"], 0);
    assert!(result.output["stdout"].as_str().unwrap().contains("hello"));
    assert_eq!(result.output["is_prompt_pending"], false);
    assert_eq!(result.output["session_id"], "default");
}

#[tokio::test]
async fn test_two_step_password_prompt() {
    let registry = registry_with(config());

    let step1 = exec(
        &registry,
        json!({
            "command": "read -s -p 'Password: ' pw; echo; echo \"length ${#pw}\"; [ \"$pw\" = hunter2 ]",
            "expect_prompt": "Password:",
            "session_id": "login"
        }),
    )
    .await;
    assert!(step1.success, "{:?}", step1.error);
    assert_eq!(step1.output["is_prompt_pending"], true);
    assert!(step1.output["prompt_message"]
        .as_str()
        .unwrap()
        .contains("Password:"));
    assert!(step1.output["exit_code"].is_null());

    let state = registry
        .invoke("get_session_state", json!({"session_id": "login"}))
        .await;
    assert_eq!(state.output["status"], "awaiting_input");

    let step2 = exec(&registry, json!({"input": "hunter2", "session_id": "login"})).await;
    assert!(step2.success, "{:?}", step2.error);
    assert_eq!(step2.output["exit_code"], 0);
    assert_eq!(step2.output["is_prompt_pending"], false);
    assert!(step2.output["stdout"].as_str().unwrap().contains("length 7"));
    assert!(!step2.output["stdout"].as_str().unwrap().contains("hunter2"));
}

#[tokio::test]
async fn test_blocked_command_never_spawns() {
    let registry = registry_with(config());
    let result = exec(&registry, json!({"command": "rm -rf /", "session_id": "danger"})).await;

    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::ValidationBlocked));
    assert_eq!(result.output["safe"], false);
    assert_eq!(result.output["attempts_made"], 0);
    assert!(result.error.unwrap().starts_with("BLOCK"));
    assert_eq!(session_count(&registry).await, 0);
}

#[tokio::test]
async fn test_idle_session_is_evicted_and_recreated() {
    let mut config = config();
    config.session.idle_timeout_secs = 1;
    config.session.sweep_interval_secs = 3600;
    let registry = registry_with(config);

    let first = exec(
        &registry,
        json!({"command": "MARKER=first", "session_id": "idle"}),
    )
    .await;
    assert!(first.success);
    assert_eq!(session_count(&registry).await, 1);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(session_count(&registry).await, 0);

    let second = exec(
        &registry,
        json!({"command": "echo \"[$MARKER]\"", "session_id": "idle"}),
    )
    .await;
    assert!(second.success);
    assert_eq!(second.output["stdout"], "[]");
    assert_eq!(session_count(&registry).await, 1);
}

#[tokio::test]
async fn test_template_stop_on_error() {
    let registry = registry_with(config());
    let saved = registry
        .invoke(
            "execute_template",
            json!({
                "action": "save",
                "template_name": "pipeline",
                "commands": ["echo {{greeting}}", "ls /definitely/not/here", "echo after"]
            }),
        )
        .await;
    assert!(saved.success);

    let stopped = registry
        .invoke(
            "execute_template",
            json!({
                "template_name": "pipeline",
                "parameters": {"greeting": "hi"},
                "session_id": "tpl-stop"
            }),
        )
        .await;
    assert!(!stopped.success);
    assert_eq!(stopped.output["steps_executed"], 2);
    assert_eq!(stopped.output["steps"][0]["status"], "succeeded");
    assert_eq!(stopped.output["steps"][0]["result"]["stdout"], "hi");
    assert_eq!(stopped.output["steps"][1]["status"], "failed");
    assert_eq!(stopped.output["steps"][2]["status"], "skipped");

    let all = registry
        .invoke(
            "execute_template",
            json!({
                "template_name": "pipeline",
                "parameters": {"greeting": "hi"},
                "session_id": "tpl-all",
                "stop_on_error": false
            }),
        )
        .await;
    assert_eq!(all.output["steps_executed"], 3);
    assert_eq!(all.output["succeeded"], 2);
    assert_eq!(all.output["failed"], 1);
    assert_eq!(all.output["steps"][2]["status"], "succeeded");
}

#[tokio::test]
async fn test_history_is_capped() {
    let mut config = config();
    config.session.history_limit = 3;
    let registry = registry_with(config);

    for n in 1..=5 {
        let result = exec(
            &registry,
            json!({"command": format!("echo {n}"), "session_id": "hist"}),
        )
        .await;
        assert!(result.success);
    }

    let state = registry
        .invoke(
            "get_session_state",
            json!({"session_id": "hist", "include_output": true}),
        )
        .await;
    let history = state.output["history"].as_array().unwrap();
    let commands: Vec<_> = history.iter().map(|h| h["command"].as_str().unwrap()).collect();
    assert_eq!(commands, vec!["echo 3", "echo 4", "echo 5"]);
    assert_eq!(state.output["commands_run"], 5);
    assert_eq!(state.output["last_output"], "5");
}

#[tokio::test]
async fn test_capacity_and_kill() {
    let mut config = config();
    config.session.max_active_sessions = 1;
    let registry = registry_with(config);

    assert!(exec(&registry, json!({"command": "true", "session_id": "a"})).await.success);
    let rejected = exec(&registry, json!({"command": "true", "session_id": "b"})).await;
    assert_eq!(rejected.error_kind, Some(ErrorKind::CapacityExceeded));

    let killed = registry
        .invoke(
            "kill_session",
            json!({"session_id": "a", "signal": "SIGHUP", "save_state": false}),
        )
        .await;
    assert!(killed.success, "{:?}", killed.error);
    assert_eq!(killed.output["terminated"], true);
    assert_eq!(killed.output["signal"], "SIGHUP");

    assert!(exec(&registry, json!({"command": "true", "session_id": "b"})).await.success);
}

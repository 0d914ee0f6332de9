//! Tests for templates

use super::*;
use crate::config::TerminalConfig;
use crate::error::ErrorKind;
use crate::retry::RetryPolicy;
use crate::session::SessionManager;
use serde_json::json;
use std::sync::Arc;

fn template(commands: &[&str]) -> Template {
    Template {
        name: "t".to_string(),
        description: None,
        commands: commands.iter().map(|c| c.to_string()).collect(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn params(value: serde_json::Value) -> HashMap<String, Value> {
    serde_json::from_value(value).unwrap()
}

fn manager() -> Arc<SessionManager> {
    let mut config = TerminalConfig::default();
    config.shell.default_shell = "bash".to_string();
    config.session.kill_grace_ms = 200;
    config.retry = RetryPolicy::disabled();
    Arc::new(SessionManager::new(config))
}

#[test]
fn test_render_substitutes_literally() {
    let t = template(&["ping -c {{count}} {{ host }}", "echo '{{host}}' $HOME"]);
    let rendered = t
        .render(&params(json!({"host": "example.org", "count": 3, "unused": true})))
        .unwrap();
    assert_eq!(rendered, vec!["ping -c 3 example.org", "echo 'example.org' $HOME"]);
}

#[test]
fn test_render_reports_every_missing_key() {
    let t = template(&["scp {{file}} {{host}}:{{dest}}", "ssh {{host}} ls"]);
    let err = t.render(&params(json!({"file": "a.txt"}))).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TemplateParameterMissing);
    match err {
        Error::TemplateParameterMissing(keys) => assert_eq!(keys, vec!["host", "dest"]),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_parameters_in_first_use_order() {
    let t = template(&["{{b}} {{a}}", "{{b}} {{c}}", "no placeholders"]);
    assert_eq!(t.parameters(), vec!["b", "a", "c"]);
}

#[test]
fn test_chain_mode_parse() {
    assert_eq!("Parallel".parse::<ChainMode>().unwrap(), ChainMode::Parallel);
    assert!("fanout".parse::<ChainMode>().is_err());
    let run: TemplateRun = serde_json::from_value(json!({"chain_mode": "conditional"})).unwrap();
    assert_eq!(run.chain_mode, ChainMode::Conditional);
    assert!(run.stop_on_error);
    assert_eq!(run.session_id, "default");
}

#[tokio::test]
async fn test_save_get_list_delete() {
    let store = TemplateStore::in_memory(manager());
    let first = store
        .save("deploy", vec!["echo {{env}}".to_string()], None)
        .await
        .unwrap();
    store
        .save("build", vec!["make".to_string()], Some("compile".to_string()))
        .await
        .unwrap();

    let updated = store
        .save("deploy", vec!["echo {{env}}".to_string(), "true".to_string()], None)
        .await
        .unwrap();
    assert_eq!(updated.created_at, first.created_at);
    assert_eq!(updated.commands.len(), 2);

    let names: Vec<_> = store.list().await.into_iter().map(|t| t.name).collect();
    assert_eq!(names, vec!["build", "deploy"]);

    store.delete("build").await.unwrap();
    let err = store.get("build").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TemplateNotFound);
    assert!(store.delete("build").await.is_err());
}

#[tokio::test]
async fn test_save_rejects_empty() {
    let store = TemplateStore::in_memory(manager());
    assert!(store.save(" ", vec!["ls".to_string()], None).await.is_err());
    assert!(store.save("x", vec![], None).await.is_err());
}

#[tokio::test]
async fn test_templates_persist_across_opens() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = TerminalConfig::default();
    config.state_dir = Some(dir.path().to_path_buf());
    let manager = Arc::new(SessionManager::new(config));

    let store = TemplateStore::open(manager.clone()).await.unwrap();
    store
        .save("greet", vec!["echo hi {{name}}".to_string()], None)
        .await
        .unwrap();
    drop(store);

    let reopened = TemplateStore::open(manager).await.unwrap();
    let t = reopened.get("greet").await.unwrap();
    assert_eq!(t.commands, vec!["echo hi {{name}}"]);
}

#[tokio::test]
async fn test_failed_write_leaves_templates_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = TerminalConfig::default();
    config.state_dir = Some(dir.path().to_path_buf());
    let manager = Arc::new(SessionManager::new(config));

    let store = TemplateStore::open(manager.clone()).await.unwrap();
    store
        .save("greet", vec!["echo hi".to_string()], None)
        .await
        .unwrap();

    // A directory where the file should be makes every write fail
    let path = dir.path().join("templates.json");
    std::fs::remove_file(&path).unwrap();
    std::fs::create_dir(&path).unwrap();

    assert!(store
        .save("other", vec!["echo other".to_string()], None)
        .await
        .is_err());
    assert!(store
        .save("greet", vec!["echo changed".to_string()], None)
        .await
        .is_err());
    assert!(store.delete("greet").await.is_err());

    let names: Vec<String> = store.list().await.into_iter().map(|t| t.name).collect();
    assert_eq!(names, vec!["greet"]);
    assert_eq!(store.get("greet").await.unwrap().commands, vec!["echo hi"]);
}

#[tokio::test]
async fn test_missing_parameters_run_nothing() {
    let manager = manager();
    let store = TemplateStore::in_memory(manager.clone());
    store
        .save("t", vec!["echo {{who}}".to_string()], None)
        .await
        .unwrap();

    let err = store.execute("t", TemplateRun::default()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TemplateParameterMissing);
    assert_eq!(manager.session_count().await, 0);
}

#[tokio::test]
async fn test_sequential_stop_on_error() {
    let store = TemplateStore::in_memory(manager());
    let commands = vec![
        "echo one".to_string(),
        "(exit 2)".to_string(),
        "echo three".to_string(),
    ];
    store.save("three", commands, None).await.unwrap();

    let report = store
        .execute("three", TemplateRun::default().with_session("seq-stop"))
        .await
        .unwrap();
    assert_eq!(report.steps_executed, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.skipped, 1);
    assert!(!report.success);
    assert_eq!(report.steps[2].status, StepStatus::Skipped);
    assert!(report.steps[2].result.is_none());

    let report = store
        .execute(
            "three",
            TemplateRun::default()
                .with_session("seq-all")
                .with_stop_on_error(false),
        )
        .await
        .unwrap();
    assert_eq!(report.steps_executed, 3);
    let statuses: Vec<_> = report.steps.iter().map(|s| s.status).collect();
    assert_eq!(
        statuses,
        vec![StepStatus::Succeeded, StepStatus::Failed, StepStatus::Succeeded]
    );
    assert_eq!(
        report.steps[1].result.as_ref().unwrap().exit_code,
        Some(2)
    );
    assert_eq!(report.steps[2].result.as_ref().unwrap().stdout, "three");
}

#[tokio::test]
async fn test_sequential_shares_session_state() {
    let store = TemplateStore::in_memory(manager());
    store
        .save(
            "vars",
            vec!["GREETING={{word}}".to_string(), "echo \"$GREETING\"".to_string()],
            None,
        )
        .await
        .unwrap();
    let report = store
        .execute(
            "vars",
            TemplateRun::default()
                .with_session("vars")
                .with_parameter("word", "howdy"),
        )
        .await
        .unwrap();
    assert!(report.success);
    assert_eq!(report.steps[1].result.as_ref().unwrap().stdout, "howdy");
}

#[tokio::test]
async fn test_conditional_skips_after_nonzero_exit() {
    let store = TemplateStore::in_memory(manager());
    store
        .save(
            "cond",
            vec!["true".to_string(), "false".to_string(), "echo never".to_string()],
            None,
        )
        .await
        .unwrap();
    let report = store
        .execute(
            "cond",
            TemplateRun::default()
                .with_session("cond")
                .with_chain_mode(ChainMode::Conditional)
                .with_stop_on_error(false),
        )
        .await
        .unwrap();
    assert_eq!(report.steps_executed, 2);
    assert_eq!(report.steps[2].status, StepStatus::Skipped);
}

#[tokio::test]
async fn test_parallel_uses_step_sessions() {
    let manager = manager();
    let store = TemplateStore::in_memory(manager.clone());
    store
        .save(
            "par",
            vec!["sleep 0.3; echo a".to_string(), "sleep 0.3; echo b".to_string()],
            None,
        )
        .await
        .unwrap();

    let report = store
        .execute(
            "par",
            TemplateRun::default()
                .with_session("job")
                .with_chain_mode(ChainMode::Parallel),
        )
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.steps[0].session_id, "job-step-1");
    assert_eq!(report.steps[1].session_id, "job-step-2");
    assert_eq!(report.steps[1].result.as_ref().unwrap().stdout, "b");
    assert_eq!(manager.session_count().await, 0);
}

//! `shellpilot templates {list,show,save,delete,run}`

use super::Runtime;
use anyhow::{Context, Result};
use clap::Subcommand;
use shellpilot_tools::{ChainMode, StepStatus, TemplateRun};
use std::collections::HashMap;

#[derive(Subcommand, Debug)]
pub enum TemplateCommands {
    /// List saved templates
    List,
    /// Show a template and its parameters
    Show {
        /// Template name
        name: String,
    },
    /// Create or replace a template
    Save {
        /// Template name
        name: String,
        /// Command to add (repeat for each step, in order)
        #[arg(short = 'C', long = "command", required = true)]
        commands: Vec<String>,
        /// What the template does
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Delete a template
    Delete {
        /// Template name
        name: String,
    },
    /// Run a template
    Run {
        /// Template name
        name: String,
        /// Placeholder value as key=value (repeatable)
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
        /// sequential, parallel or conditional
        #[arg(short, long, default_value = "sequential")]
        mode: ChainMode,
        /// Keep going after a failed step
        #[arg(long)]
        keep_going: bool,
        /// Session id
        #[arg(short, long, default_value = "default")]
        session: String,
        /// Per-step timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,
    },
}

fn parse_param(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{}'", s))
}

pub(crate) async fn run(cmd: TemplateCommands, runtime: &Runtime) -> Result<i32> {
    let store = &runtime.templates;
    match cmd {
        TemplateCommands::List => {
            let templates = store.list().await;
            if templates.is_empty() {
                println!("No templates saved.");
            }
            for t in templates {
                println!(
                    "{:<24} {:>2} steps  {}",
                    t.name,
                    t.commands.len(),
                    t.description.as_deref().unwrap_or("")
                );
            }
        }
        TemplateCommands::Show { name } => {
            let template = store.get(&name).await?;
            println!("{}", template.name);
            if let Some(description) = &template.description {
                println!("  {}", description);
            }
            let params = template.parameters();
            if !params.is_empty() {
                println!("  Parameters: {}", params.join(", "));
            }
            for (i, command) in template.commands.iter().enumerate() {
                println!("  [{}] {}", i + 1, command);
            }
        }
        TemplateCommands::Save {
            name,
            commands,
            description,
        } => {
            let template = store.save(&name, commands, description).await?;
            println!(
                "Saved template '{}' ({} steps)",
                template.name,
                template.commands.len()
            );
        }
        TemplateCommands::Delete { name } => {
            store.delete(&name).await?;
            println!("Deleted template '{}'", name);
        }
        TemplateCommands::Run {
            name,
            params,
            mode,
            keep_going,
            session,
            timeout,
        } => {
            let run = TemplateRun {
                parameters: params
                    .into_iter()
                    .map(|(k, v)| (k, serde_json::Value::String(v)))
                    .collect::<HashMap<_, _>>(),
                chain_mode: mode,
                stop_on_error: !keep_going,
                session_id: session,
                timeout_secs: timeout,
            };
            let report = store
                .execute(&name, run)
                .await
                .with_context(|| format!("Failed to run template '{}'", name))?;

            for step in &report.steps {
                let marker = match step.status {
                    StepStatus::Succeeded => "ok",
                    StepStatus::Failed => "FAILED",
                    StepStatus::Skipped => "skipped",
                };
                println!("[{}] {:<8} {}", step.index, marker, step.command);
                if let Some(result) = &step.result {
                    for line in result.stdout.lines() {
                        println!("      {}", line);
                    }
                    if !result.stderr.is_empty() {
                        eprintln!("      {}", result.stderr);
                    }
                }
                if let Some(error) = &step.error {
                    eprintln!("      {}", error);
                }
            }
            println!(
                "{} executed, {} succeeded, {} failed, {} skipped",
                report.steps_executed, report.succeeded, report.failed, report.skipped
            );
            return Ok(if report.success { 0 } else { 1 });
        }
    }
    Ok(0)
}

//! CLI module for Shellpilot
//!
//! Provides commands:
//! - `tools` / `call`: inspect and invoke the registered tools
//! - `validate`: risk analysis of a command
//! - `run`: execute a command in a PTY session, answering prompts from stdin
//! - `sessions`: list live sessions or show a saved snapshot
//! - `templates`: manage and run command templates
//! - `config`: print the effective configuration

use crate::config::AppConfig;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shellpilot_tools::{
    register_terminal_tools, ExecuteRequest, SessionManager, TemplateStore, ToolRegistry,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

mod templates;

pub use templates::TemplateCommands;

/// Shellpilot CLI
#[derive(Parser, Debug)]
#[command(name = "shellpilot")]
#[command(about = "Interactive PTY shell sessions with command validation")]
#[command(version)]
pub struct Cli {
    /// Extra configuration file layered over the defaults
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the registered tools
    Tools,
    /// Invoke a tool with a JSON input
    Call {
        /// Tool name
        tool: String,
        /// JSON object passed to the tool
        #[arg(short, long, default_value = "{}")]
        input: String,
    },
    /// Analyze a command without running it
    Validate {
        /// Command to analyze
        command: String,
    },
    /// Run a command in a PTY session
    Run {
        /// Command to run
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
        /// Session id
        #[arg(short, long, default_value = "default")]
        session: String,
        /// Timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,
        /// Working directory
        #[arg(long)]
        cwd: Option<PathBuf>,
        /// Shell (auto, bash, zsh, sh)
        #[arg(long, default_value = "auto")]
        shell: String,
        /// Skip the security validator
        #[arg(long)]
        no_validate: bool,
        /// Do not retry transient failures
        #[arg(long)]
        no_retry: bool,
    },
    /// List sessions, or show the saved state of one
    Sessions {
        /// Session to show
        session_id: Option<String>,
        /// Include shell, pid and counters
        #[arg(short, long)]
        detailed: bool,
    },
    /// Manage command templates
    #[command(subcommand)]
    Templates(TemplateCommands),
    /// Print the effective configuration
    Config,
}

/// The session manager, template store and registry shared by commands.
pub(crate) struct Runtime {
    pub manager: Arc<SessionManager>,
    pub templates: Arc<TemplateStore>,
    pub registry: ToolRegistry,
}

impl Runtime {
    async fn start(config: &AppConfig) -> Result<Self> {
        let manager = Arc::new(SessionManager::new(config.terminal.clone()));
        manager.spawn_sweeper();
        let templates = Arc::new(
            TemplateStore::open(manager.clone())
                .await
                .context("Failed to load templates")?,
        );
        let mut registry = ToolRegistry::new();
        register_terminal_tools(&mut registry, manager.clone(), templates.clone());
        Ok(Self {
            manager,
            templates,
            registry,
        })
    }
}

/// Run the CLI command
pub async fn run(cli: Cli, config: AppConfig) -> Result<()> {
    let Some(command) = cli.command else {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        cmd.print_help()?;
        println!();
        return Ok(());
    };

    if let Commands::Config = command {
        print!("{}", toml::to_string_pretty(&config).context("Failed to serialize config")?);
        return Ok(());
    }

    let runtime = Runtime::start(&config).await?;
    let outcome = dispatch(command, &runtime).await;
    runtime.manager.shutdown().await;

    match outcome? {
        0 => Ok(()),
        code => std::process::exit(code),
    }
}

/// Returns the process exit code.
async fn dispatch(command: Commands, runtime: &Runtime) -> Result<i32> {
    match command {
        Commands::Tools => {
            for def in runtime.registry.list_definitions() {
                println!(
                    "{:<28} {:<8} {:<6} {}",
                    def.name,
                    def.category.as_str(),
                    def.risk_level.as_str(),
                    def.description
                );
            }
            Ok(0)
        }
        Commands::Call { tool, input } => {
            let input: serde_json::Value =
                serde_json::from_str(&input).context("--input is not valid JSON")?;
            let result = runtime.registry.invoke(&tool, input).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(if result.success { 0 } else { 1 })
        }
        Commands::Validate { command } => {
            let verdict = runtime.manager.validator().validate(&command);
            println!("{}", serde_json::to_string_pretty(&verdict)?);
            Ok(if verdict.blocked { 1 } else { 0 })
        }
        Commands::Run {
            command,
            session,
            timeout,
            cwd,
            shell,
            no_validate,
            no_retry,
        } => {
            let mut request = ExecuteRequest::command(command.join(" "))
                .with_session(session)
                .with_shell(shell)
                .with_validation(!no_validate)
                .with_retry(!no_retry);
            if let Some(secs) = timeout {
                request = request.with_timeout_secs(secs);
            }
            if let Some(cwd) = cwd {
                request = request.with_cwd(cwd);
            }
            run_interactive(&runtime.manager, request).await
        }
        Commands::Sessions {
            session_id,
            detailed,
        } => {
            match session_id {
                Some(id) => {
                    let snapshot = runtime
                        .manager
                        .get_session_state(&id, true, true, 50)
                        .await?;
                    println!("{}", serde_json::to_string_pretty(&snapshot)?);
                }
                None => {
                    let sessions = runtime.manager.list_sessions(detailed).await;
                    if detailed {
                        println!("{}", serde_json::to_string_pretty(&sessions)?);
                        return Ok(0);
                    }
                    if sessions.is_empty() {
                        println!("No live sessions.");
                    }
                    for s in sessions {
                        println!(
                            "{:<20} {:<14} {}",
                            s.session_id,
                            s.status.as_str(),
                            s.cwd.display()
                        );
                    }
                }
            }
            Ok(0)
        }
        Commands::Templates(cmd) => templates::run(cmd, runtime).await,
        Commands::Config => Ok(0),
    }
}

/// Execute a command, relaying prompts to the terminal until it finishes.
async fn run_interactive(manager: &SessionManager, request: ExecuteRequest) -> Result<i32> {
    let session_id = request.session_id.clone();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut result = manager.execute(request).await?;

    loop {
        if !result.stdout.is_empty() {
            println!("{}", result.stdout);
        }
        if !result.stderr.is_empty() {
            eprintln!("{}", result.stderr);
        }
        if !result.is_prompt_pending {
            break;
        }

        eprint!("{} ", result.prompt_message.as_deref().unwrap_or(">"));
        let Some(line) = stdin.next_line().await? else {
            anyhow::bail!("stdin closed while a prompt was pending");
        };
        result = manager
            .execute(ExecuteRequest::input(line).with_session(session_id.clone()))
            .await?;
    }

    Ok(match result.exit_code {
        Some(code) => code,
        None if result.is_success() => 0,
        None => 1,
    })
}

//! Shell selection, environment and the completion sentinel

use crate::config::ShellConfig;
use crate::constants::{FORCED_ENV, SENTINEL_PREFIX, SENTINEL_SUFFIX, SYNTAX_CHECK_TIMEOUT_MS};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

/// Supported shell families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ShellKind {
    Bash,
    Zsh,
    Sh,
}

impl ShellKind {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::Bash => "bash",
            Self::Zsh => "zsh",
            Self::Sh => "sh",
        }
    }

    /// Family of a program name or path.
    pub(crate) fn from_program(program: &str) -> Option<Self> {
        let name = Path::new(program).file_name()?.to_str()?;
        match name {
            "bash" => Some(Self::Bash),
            "zsh" => Some(Self::Zsh),
            "sh" | "dash" | "ash" => Some(Self::Sh),
            _ => None,
        }
    }

    /// Arguments for an interactive shell without user rc files or line
    /// editing.
    pub(crate) fn args(&self) -> &'static [&'static str] {
        match self {
            Self::Bash => &["--noprofile", "--norc", "--noediting", "-i"],
            Self::Zsh => &["-f", "-i"],
            Self::Sh => &["-i"],
        }
    }

    fn prelude(&self) -> &'static str {
        match self {
            Self::Bash => {
                "stty -echo 2>/dev/null; set +m; PS1=''; PS2=''; PROMPT_COMMAND=''; unset HISTFILE; "
            }
            Self::Zsh => {
                "stty -echo 2>/dev/null; unsetopt zle prompt_cr prompt_sp 2>/dev/null; set +m; \
                 PS1=''; PS2=''; RPROMPT=''; unset HISTFILE; "
            }
            Self::Sh => "stty -echo 2>/dev/null; set +m 2>/dev/null; PS1=''; PS2=''; ",
        }
    }
}

/// A shell program and its family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResolvedShell {
    pub kind: ShellKind,
    pub program: String,
}

impl ResolvedShell {
    fn bash() -> Self {
        Self {
            kind: ShellKind::Bash,
            program: "bash".to_string(),
        }
    }

    /// First line written to a new shell: quiet the terminal, clear the
    /// prompts and report readiness through the sentinel.
    pub(crate) fn init_line(&self, token: &str) -> String {
        format!("{}{}\n", self.kind.prelude(), sentinel_printf(token))
    }
}

/// Pick the shell for a request. `auto` defers to the configured default,
/// and a default of `auto` follows `$SHELL`, falling back to bash for
/// unsupported shells.
pub(crate) fn resolve_shell(requested: &str, config: &ShellConfig) -> Result<ResolvedShell> {
    let choice = match requested.trim() {
        "" | "auto" => config.default_shell.trim(),
        other => other,
    };

    if choice.is_empty() || choice == "auto" {
        let from_env = std::env::var("SHELL").ok().and_then(|program| {
            ShellKind::from_program(&program).map(|kind| ResolvedShell { kind, program })
        });
        return Ok(from_env.unwrap_or_else(ResolvedShell::bash));
    }

    ShellKind::from_program(choice)
        .map(|kind| ResolvedShell {
            kind,
            program: choice.to_string(),
        })
        .ok_or_else(|| {
            Error::InvalidInput(format!(
                "Unsupported shell '{}' (expected bash, zsh or sh)",
                choice
            ))
        })
}

/// Environment for a new session: whitelisted host variables, the
/// non-interactive defaults, per-shell overrides, then request overrides.
pub(crate) fn build_env(
    config: &ShellConfig,
    kind: ShellKind,
    overrides: &HashMap<String, String>,
) -> Vec<(String, String)> {
    let mut env: Vec<(String, String)> = config
        .env_whitelist
        .iter()
        .filter_map(|key| std::env::var(key).ok().map(|v| (key.clone(), v)))
        .collect();

    let mut set = |key: &str, value: &str| {
        env.retain(|(k, _)| k != key);
        env.push((key.to_string(), value.to_string()));
    };

    for &(key, value) in FORCED_ENV {
        set(key, value);
    }
    if let Some(shell_env) = config.env_overrides.get(kind.as_str()) {
        for (key, value) in shell_env {
            set(key.as_str(), value.as_str());
        }
    }
    for (key, value) in overrides {
        set(key.as_str(), value.as_str());
    }
    env
}

/// `printf` invocation that prints `\n__SP_<token>:<status>:<pwd>__\n`.
fn sentinel_printf(token: &str) -> String {
    format!(
        r#"printf '\n{SENTINEL_PREFIX}%s:%s:%s{SENTINEL_SUFFIX}\n' '{token}' "$?" "$PWD""#
    )
}

/// `command` as the brace group written to the shell.
fn command_block(command: &str) -> String {
    format!("{{ {}\n}}", command.trim_end())
}

/// Wrap `command` so the shell reports its status and directory after it.
pub(crate) fn wrap_command(command: &str, token: &str) -> String {
    format!("{}; {}\n", command_block(command), sentinel_printf(token))
}

/// Parse `command` with `program -n` without running it.
///
/// An unterminated quote, brace or here-document leaves a shell reading
/// continuation lines, which swallow every later sentinel.
pub(crate) async fn check_syntax(program: &str, command: &str) -> Result<()> {
    let child = tokio::process::Command::new(program)
        .arg("-n")
        .arg("-c")
        .arg(command_block(command))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(Duration::from_millis(SYNTAX_CHECK_TIMEOUT_MS), child)
        .await
        .map_err(|_| Error::Execution(format!("{} -n did not finish", program)))?
        .map_err(|e| Error::ProcessSpawn(format!("Failed to run {} -n: {}", program, e)))?;

    // bash only warns (exit 0) about a here-document cut off by end of input
    let stderr = String::from_utf8_lossy(&output.stderr);
    if output.status.success() && stderr.trim().is_empty() {
        return Ok(());
    }
    let detail = stderr
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("incomplete command");
    Err(Error::InvalidInput(format!("Syntax error: {}", detail)))
}

/// Exit status and working directory reported by a sentinel line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SentinelReport {
    pub exit_code: Option<i32>,
    pub cwd: String,
}

/// Parse the part of a sentinel line after `__SP_<token>:`.
pub(crate) fn parse_sentinel_rest(rest: &str) -> SentinelReport {
    let rest = rest.trim_end_matches(['\r', '\n']);
    let rest = rest.strip_suffix(SENTINEL_SUFFIX).unwrap_or(rest);
    let (code, cwd) = rest.split_once(':').unwrap_or((rest, ""));
    SentinelReport {
        exit_code: code.trim().parse().ok(),
        cwd: cwd.to_string(),
    }
}

//! A live shell attached to a PTY

use super::capture::Capture;
use super::shell::{wrap_command, ResolvedShell};
use super::types::SessionEvent;
use crate::constants::{READ_CHUNK_BYTES, SENTINEL_PREFIX};
use crate::error::{Error, Result};
use crate::sanitize::{mask_secrets, strip_ansi_escapes, truncate_output};
use crate::stream::{StreamClassifier, StreamEvent, StreamEventKind};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::broadcast;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How long to wait for the exit status once the PTY closes.
const EXIT_STATUS_WAIT: Duration = Duration::from_secs(1);

/// How one monitoring step ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum StepEnd {
    Completed { exit_code: Option<i32>, cwd: PathBuf },
    Prompt { message: String, pattern: String },
    TimedOut,
    Exited(Option<i32>),
    Cancelled,
}

/// Output and events of one monitoring step.
#[derive(Debug)]
pub(super) struct StepOutcome {
    pub end: StepEnd,
    pub raw: Vec<u8>,
    pub overflowed: bool,
    pub events: Vec<StreamEvent>,
}

/// How to watch a step.
#[derive(Debug, Clone)]
pub(super) struct MonitorPlan {
    pub timeout: Duration,
    pub expect_prompt: Option<Regex>,
    pub detect_prompts: bool,
    pub prompt_idle: Duration,
    pub streaming: bool,
    pub max_events: usize,
    pub max_output_bytes: usize,
}

impl MonitorPlan {
    fn startup(timeout: Duration) -> Self {
        Self {
            timeout,
            expect_prompt: None,
            detect_prompts: false,
            prompt_idle: Duration::ZERO,
            streaming: false,
            max_events: 0,
            max_output_bytes: READ_CHUNK_BYTES,
        }
    }
}

/// Everything needed to start a shell.
pub(super) struct SpawnSpec<'a> {
    pub id: &'a str,
    pub shell: &'a ResolvedShell,
    pub cwd: Option<&'a Path>,
    pub env: &'a [(String, String)],
    pub startup_timeout: Duration,
    pub events: broadcast::Sender<SessionEvent>,
}

/// The command currently owned by the shell.
#[derive(Debug, Clone)]
struct InFlight {
    token: String,
}

/// A PTY-backed interactive shell.
pub(super) struct PtySession {
    id: String,
    pty: pty_process::Pty,
    child: tokio::process::Child,
    pid: Option<u32>,
    /// Bytes read after the last sentinel
    carry: Vec<u8>,
    /// Tokens of commands abandoned on timeout
    orphans: Vec<String>,
    in_flight: Option<InFlight>,
    events: broadcast::Sender<SessionEvent>,
}

impl PtySession {
    /// Start the shell and wait until it reports ready. Returns the
    /// session and the shell's initial working directory.
    pub(super) async fn spawn(spec: SpawnSpec<'_>) -> Result<(Self, PathBuf)> {
        let (pty, pts) = pty_process::open()
            .map_err(|e| Error::ProcessSpawn(format!("Failed to open PTY: {}", e)))?;

        let mut cmd = pty_process::Command::new(&spec.shell.program)
            .args(spec.shell.kind.args())
            .env_clear();
        for (key, value) in spec.env {
            cmd = cmd.env(key, value);
        }
        if let Some(dir) = spec.cwd {
            cmd = cmd.current_dir(dir);
        }

        let child = cmd.spawn(pts).map_err(|e| {
            Error::ProcessSpawn(format!("Failed to spawn {}: {}", spec.shell.program, e))
        })?;
        let pid = child.id();

        let mut session = Self {
            id: spec.id.to_string(),
            pty,
            child,
            pid,
            carry: Vec::new(),
            orphans: Vec::new(),
            in_flight: None,
            events: spec.events,
        };

        let token = new_token();
        session.write(&spec.shell.init_line(&token)).await?;
        session.in_flight = Some(InFlight { token });

        let mut classifier = StreamClassifier::new(&[]);
        let outcome = session
            .monitor(
                &MonitorPlan::startup(spec.startup_timeout),
                &mut classifier,
                &CancellationToken::new(),
            )
            .await?;

        match outcome.end {
            StepEnd::Completed { cwd, .. } => {
                debug!(session_id = %session.id, pid = ?pid, shell = %spec.shell.program, "Shell ready");
                Ok((session, cwd))
            }
            StepEnd::TimedOut => {
                session.kill().await;
                Err(Error::ProcessSpawn(format!(
                    "{} did not become ready within {}ms",
                    spec.shell.program,
                    spec.startup_timeout.as_millis()
                )))
            }
            other => {
                session.kill().await;
                Err(Error::ProcessSpawn(format!(
                    "{} exited during startup ({:?})",
                    spec.shell.program, other
                )))
            }
        }
    }

    /// Process id of the shell, which also leads its process group.
    pub(super) fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether a prompt-interrupted command still owns the shell.
    pub(super) fn has_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Write `command` wrapped with a fresh sentinel.
    pub(super) async fn start_command(&mut self, command: &str) -> Result<()> {
        let token = new_token();
        self.write(&wrap_command(command, &token)).await?;
        self.in_flight = Some(InFlight { token });
        Ok(())
    }

    /// Send a line of input to the running program.
    pub(super) async fn send_input(&mut self, input: &str) -> Result<()> {
        self.write(&format!("{}\n", input)).await
    }

    async fn write(&mut self, text: &str) -> Result<()> {
        self.pty
            .write_all(text.as_bytes())
            .await
            .map_err(|e| Error::Execution(format!("Failed to write to shell: {}", e)))?;
        self.pty
            .flush()
            .await
            .map_err(|e| Error::Execution(format!("Failed to write to shell: {}", e)))
    }

    /// Watch output of the in-flight command until it completes, stops at
    /// a prompt, times out, the shell exits or `cancel` fires.
    pub(super) async fn monitor(
        &mut self,
        plan: &MonitorPlan,
        classifier: &mut StreamClassifier,
        cancel: &CancellationToken,
    ) -> Result<StepOutcome> {
        let token = self
            .in_flight
            .as_ref()
            .map(|f| f.token.clone())
            .ok_or_else(|| Error::InvalidState("no command is running".to_string()))?;

        let mut capture = Capture::new(plan.max_output_bytes, std::mem::take(&mut self.carry));
        let mut events = Vec::new();
        let deadline = Instant::now() + plan.timeout;
        let auto_prompt = plan.detect_prompts && plan.expect_prompt.is_none();
        let mut idle_armed = auto_prompt;
        let mut buf = vec![0u8; READ_CHUNK_BYTES];

        loop {
            if capture.discard_orphans(&mut self.orphans) {
                classifier.reset();
                events.clear();
            }

            if let Some(hit) = capture.find_sentinel(&token) {
                if let Some(text) = capture.take_lines(Some(hit.start)) {
                    self.classify(plan, classifier, &text, &mut events);
                }
                if let Some(event) = classifier.flush() {
                    self.record_event(plan, event, &mut events);
                }
                let (raw, overflowed, carry) = capture.complete(&hit);
                self.carry = carry;
                self.in_flight = None;
                return Ok(StepOutcome {
                    end: StepEnd::Completed {
                        exit_code: hit.report.exit_code,
                        cwd: PathBuf::from(hit.report.cwd),
                    },
                    raw,
                    overflowed,
                    events,
                });
            }

            if let Some(text) = capture.take_lines(None) {
                self.classify(plan, classifier, &text, &mut events);
            }
            capture.compact();

            if let Some(pattern) = &plan.expect_prompt {
                if let Some(message) = capture.match_prompt(pattern) {
                    return Ok(self.prompt_outcome(
                        plan,
                        capture,
                        events,
                        message,
                        pattern.as_str().to_string(),
                    ));
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    let (raw, overflowed) = capture.into_output();
                    return Ok(StepOutcome { end: StepEnd::Cancelled, raw, overflowed, events });
                }
                _ = sleep_until(deadline) => {
                    warn!(
                        session_id = %self.id,
                        timeout_ms = plan.timeout.as_millis() as u64,
                        "Command timed out, abandoning its output"
                    );
                    self.orphans.push(token);
                    self.in_flight = None;
                    let (raw, overflowed) = capture.into_output();
                    return Ok(StepOutcome { end: StepEnd::TimedOut, raw, overflowed, events });
                }
                _ = sleep(plan.prompt_idle), if idle_armed => {
                    idle_armed = false;
                    if let Some(line) = capture.trailing_line() {
                        if let Some(pattern) = classifier.prompt_pattern(&line) {
                            let message = line.trim().to_string();
                            return Ok(self.prompt_outcome(plan, capture, events, message, pattern));
                        }
                    }
                }
                read = self.pty.read(&mut buf) => match read {
                    Ok(0) | Err(_) => {
                        let code = self.wait_exit().await;
                        debug!(session_id = %self.id, exit_code = ?code, "Shell exited");
                        self.in_flight = None;
                        let (raw, overflowed) = capture.into_output();
                        return Ok(StepOutcome { end: StepEnd::Exited(code), raw, overflowed, events });
                    }
                    Ok(n) => {
                        capture.push(&buf[..n]);
                        idle_armed = auto_prompt;
                    }
                }
            }
        }
    }

    fn prompt_outcome(
        &self,
        plan: &MonitorPlan,
        capture: Capture,
        mut events: Vec<StreamEvent>,
        message: String,
        pattern: String,
    ) -> StepOutcome {
        debug!(session_id = %self.id, prompt = %message, "Waiting for input");
        self.record_event(
            plan,
            StreamEvent {
                kind: StreamEventKind::Prompt,
                text: message.clone(),
            },
            &mut events,
        );
        let (raw, overflowed) = capture.into_output();
        StepOutcome {
            end: StepEnd::Prompt { message, pattern },
            raw,
            overflowed,
            events,
        }
    }

    fn classify(
        &self,
        plan: &MonitorPlan,
        classifier: &mut StreamClassifier,
        text: &str,
        events: &mut Vec<StreamEvent>,
    ) {
        if !plan.streaming {
            return;
        }
        for event in classifier.feed(text) {
            self.record_event(plan, event, events);
        }
    }

    fn record_event(&self, plan: &MonitorPlan, event: StreamEvent, events: &mut Vec<StreamEvent>) {
        if !plan.streaming || event.text.contains(SENTINEL_PREFIX) {
            return;
        }
        // No subscribers is fine
        let _ = self.events.send(SessionEvent {
            session_id: self.id.clone(),
            event: event.clone(),
        });
        if events.len() < plan.max_events {
            events.push(event);
        }
    }

    async fn wait_exit(&mut self) -> Option<i32> {
        match tokio::time::timeout(EXIT_STATUS_WAIT, self.child.wait()).await {
            Ok(Ok(status)) => status.code(),
            _ => None,
        }
    }

    /// Wait up to `grace` for the shell to exit. Returns whether it did.
    pub(super) async fn wait_for_exit(&mut self, grace: Duration) -> bool {
        matches!(
            tokio::time::timeout(grace, self.child.wait()).await,
            Ok(Ok(_))
        )
    }

    /// Kill the shell outright and reap it.
    pub(super) async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            debug!(session_id = %self.id, error = %e, "Kill failed, shell likely gone");
        }
    }
}

/// Turn captured bytes into the text returned to callers. Returns the text
/// and whether it was cut at `max_bytes`.
pub(super) fn render_output(raw: &[u8], mask: bool, max_bytes: usize) -> (String, bool) {
    let text = strip_ansi_escapes(&String::from_utf8_lossy(raw));
    let text = strip_echo(&text).trim_end_matches('\n').to_string();
    let mut text = if mask { mask_secrets(&text) } else { text };
    let truncated = truncate_output(&mut text, max_bytes);
    (text, truncated)
}

/// Drop a wrapped command echoed back by a terminal that ignored
/// `stty -echo`.
fn strip_echo(text: &str) -> &str {
    let marker = format!("{SENTINEL_PREFIX}%s");
    match text.find(&marker) {
        Some(at) => text[at..]
            .find('\n')
            .map_or("", |nl| &text[at + nl + 1..]),
        None => text,
    }
}

fn new_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

//! Session registry and command execution

use super::pty::{render_output, MonitorPlan, PtySession, SpawnSpec, StepEnd, StepOutcome};
use super::shell::{build_env, check_syntax, resolve_shell};
use super::signal::{signal_group, KillSignal};
use super::snapshot::{FileSnapshotStore, NoopSnapshotStore, SnapshotStore};
use super::types::{
    CommandRecord, CommandResult, ExecuteRequest, PendingPrompt, SessionEvent, SessionSnapshot,
    SessionStatus, SessionSummary,
};
use crate::config::TerminalConfig;
use crate::constants::EVENT_CHANNEL_CAPACITY;
use crate::error::{Error, ErrorKind, Result};
use crate::retry::{run_with_retry, RetryPolicy};
use crate::sanitize::terminal_control_char;
use crate::security::Validator;
use crate::stream::StreamClassifier;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Acknowledgement of `kill_session`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillReport {
    /// The terminated session
    pub session_id: String,
    /// Signal sent first
    pub signal: KillSignal,
    /// Always true once the report exists
    pub terminated: bool,
    /// A snapshot was persisted
    pub snapshot_saved: bool,
    /// The shell ignored the signal and was killed with SIGKILL
    pub escalated: bool,
}

/// Command whose completion is still outstanding.
#[derive(Debug, Clone)]
struct PendingCommand {
    command: String,
    started_at: DateTime<Utc>,
    started: Instant,
    cwd: PathBuf,
}

/// Descriptive state, readable without waiting for the shell.
#[derive(Debug)]
struct SessionMeta {
    id: String,
    shell: String,
    cwd: PathBuf,
    env: HashMap<String, String>,
    status: SessionStatus,
    pending_prompt: Option<PendingPrompt>,
    pending_command: Option<PendingCommand>,
    created_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
    last_activity: Instant,
    busy: bool,
    history: VecDeque<CommandRecord>,
    history_limit: usize,
    commands_run: u64,
    last_output: Option<String>,
}

impl SessionMeta {
    fn touch(&mut self) {
        self.last_activity = Instant::now();
        self.last_activity_at = Utc::now();
    }

    fn is_idle(&self, idle: Duration) -> bool {
        !self.busy && self.last_activity.elapsed() > idle
    }

    /// Close the outstanding command and append it to the history.
    fn finish_command(&mut self, exit_code: Option<i32>) {
        let Some(pending) = self.pending_command.take() else {
            return;
        };
        if self.history_limit == 0 {
            return;
        }
        while self.history.len() >= self.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(CommandRecord {
            command: pending.command,
            started_at: pending.started_at,
            exit_code,
            cwd_at_run: pending.cwd,
            duration_ms: pending.started.elapsed().as_millis() as u64,
        });
    }

    fn snapshot(&self, live: bool) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id.clone(),
            status: self.status,
            shell: self.shell.clone(),
            cwd: self.cwd.clone(),
            env: self.env.clone(),
            created_at: self.created_at,
            last_activity_at: self.last_activity_at,
            pending_prompt: self.pending_prompt.clone(),
            commands_run: self.commands_run,
            history: self.history.iter().cloned().collect(),
            last_output: self.last_output.clone(),
            live,
        }
    }

    fn summary(&self, detailed: bool, pid: Option<u32>) -> SessionSummary {
        SessionSummary {
            session_id: self.id.clone(),
            status: self.status,
            cwd: self.cwd.clone(),
            last_activity_at: self.last_activity_at,
            shell: detailed.then(|| self.shell.clone()),
            created_at: detailed.then_some(self.created_at),
            pid: if detailed { pid } else { None },
            commands_run: detailed.then_some(self.commands_run),
            pending_prompt: if detailed {
                self.pending_prompt.as_ref().map(|p| p.message.clone())
            } else {
                None
            },
        }
    }
}

fn lock_meta(meta: &StdMutex<SessionMeta>) -> MutexGuard<'_, SessionMeta> {
    meta.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Marks a session busy for as long as it lives.
struct BusyGuard(Arc<StdMutex<SessionMeta>>);

impl BusyGuard {
    fn new(meta: Arc<StdMutex<SessionMeta>>) -> Self {
        {
            let mut m = lock_meta(&meta);
            m.busy = true;
            m.touch();
        }
        Self(meta)
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        let mut m = lock_meta(&self.0);
        m.busy = false;
        m.touch();
    }
}

/// Registry entry for one session.
#[derive(Clone)]
struct SessionSlot {
    shell: Arc<Mutex<PtySession>>,
    meta: Arc<StdMutex<SessionMeta>>,
    cancel: CancellationToken,
    pid: Option<u32>,
}

impl SessionSlot {
    fn status(&self) -> SessionStatus {
        lock_meta(&self.meta).status
    }
}

/// Owns every live session.
///
/// Commands on one session are serialized by a fair lock, so concurrent
/// callers are served in arrival order. Listing and sweeping read the
/// descriptive metadata and never wait for a running command.
pub struct SessionManager {
    config: Arc<TerminalConfig>,
    validator: Validator,
    sessions: Mutex<HashMap<String, SessionSlot>>,
    snapshots: Arc<dyn SnapshotStore>,
    events: broadcast::Sender<SessionEvent>,
    shutdown: CancellationToken,
}

impl SessionManager {
    /// Create a manager. Snapshots go to the configured state directory,
    /// or nowhere when none is set.
    #[must_use]
    pub fn new(config: TerminalConfig) -> Self {
        let snapshots: Arc<dyn SnapshotStore> = match config.snapshots_dir() {
            Some(dir) => Arc::new(FileSnapshotStore::new(dir)),
            None => Arc::new(NoopSnapshotStore),
        };
        Self::with_snapshot_store(config, snapshots)
    }

    /// Create a manager with a custom snapshot store.
    #[must_use]
    pub fn with_snapshot_store(config: TerminalConfig, snapshots: Arc<dyn SnapshotStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            validator: Validator::new(config.security.clone()),
            config: Arc::new(config),
            sessions: Mutex::new(HashMap::new()),
            snapshots,
            events,
            shutdown: CancellationToken::new(),
        }
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &TerminalConfig {
        &self.config
    }

    /// The validator used to gate commands.
    #[must_use]
    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Receive every classified output line from every session.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Number of sessions in the registry.
    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Run a command, or answer a pending prompt, in the requested session.
    pub async fn execute(&self, request: ExecuteRequest) -> Result<CommandResult> {
        self.sweep_idle().await;

        let session_id = request.session_id.trim().to_string();
        if session_id.is_empty() {
            return Err(Error::InvalidInput("session_id must not be empty".to_string()));
        }
        let command = match request.command.as_deref().map(str::trim) {
            Some("") => return Err(Error::InvalidInput("command is empty".to_string())),
            other => other.map(str::to_string),
        };
        if command.is_none() && request.input.is_none() {
            return Err(Error::InvalidInput(
                "either command or input is required".to_string(),
            ));
        }
        let fields = [
            ("command", command.as_deref()),
            ("input", request.input.as_deref()),
        ];
        for (field, text) in fields {
            if let Some(c) = text.and_then(terminal_control_char) {
                return Err(Error::InvalidInput(format!(
                    "{} contains terminal control character {:?}",
                    field, c
                )));
            }
        }
        let expect_prompt = request
            .expect_prompt
            .as_deref()
            .map(|p| {
                Regex::new(p)
                    .map_err(|e| Error::InvalidInput(format!("Invalid expect_prompt: {}", e)))
            })
            .transpose()?;

        let (existing, live_shell) = match self.sessions.lock().await.get(&session_id) {
            Some(slot) => {
                let meta = lock_meta(&slot.meta);
                let live = meta.status != SessionStatus::Terminated;
                (Some(meta.status), live.then(|| meta.shell.clone()))
            }
            None => (None, None),
        };
        check_state(&session_id, existing, command.is_some())?;

        let mut verdict = None;
        if let Some(cmd) = &command {
            if request.validate && self.config.security.enabled {
                let v = self.validator.validate(cmd);
                if v.blocked {
                    warn!(
                        session_id = %session_id,
                        severity = %v.severity,
                        risk_score = v.risk_score,
                        "Command blocked by validator"
                    );
                    return Ok(CommandResult::blocked(session_id, v));
                }
                if v.is_flagged() {
                    verdict = Some(v);
                }
            }
        }

        if let Some(cmd) = &command {
            let program = match live_shell {
                Some(program) => program,
                None => resolve_shell(&request.shell, &self.config.shell)?.program,
            };
            check_syntax(&program, cmd).await?;
        }

        let slot = self.resolve_or_create(&session_id, &request).await?;
        let mut result = {
            let mut shell = slot.shell.lock().await;
            let _busy = BusyGuard::new(slot.meta.clone());

            let status = slot.status();
            if status == SessionStatus::Terminated {
                return Err(Error::SessionNotFound(session_id));
            }
            check_state(&session_id, Some(status), command.is_some())?;

            let mut attempt = Attempt {
                manager: self,
                shell: &mut *shell,
                slot: &slot,
                session_id: session_id.clone(),
                plan: self.plan(&request, expect_prompt),
                command: command.clone(),
                input: request.input.clone(),
            };

            match &command {
                Some(cmd) => {
                    info!(session_id = %session_id, command = %cmd, "Executing command");
                    let policy = if request.retry {
                        self.config.retry.clone()
                    } else {
                        RetryPolicy::disabled()
                    };
                    run_with_retry(&policy, &slot.cancel, &mut attempt, |a, n| {
                        Box::pin(a.run_command(n))
                    })
                    .await?
                }
                None => attempt.answer_prompt().await?,
            }
        };

        if result.shell_exited {
            self.forget_if_terminated(&session_id, &slot).await;
        }

        if let Some(v) = verdict {
            result.safe = v.safe;
            if v.requires_confirmation && result.error_kind.is_none() {
                result.error_kind = Some(ErrorKind::ValidationWarn);
            }
            result.validation = Some(v);
        }
        Ok(result)
    }

    fn plan(&self, request: &ExecuteRequest, expect_prompt: Option<Regex>) -> MonitorPlan {
        let streaming = &self.config.streaming;
        MonitorPlan {
            timeout: self.config.session.clamp_timeout(request.timeout_secs),
            expect_prompt,
            detect_prompts: streaming.detect_prompts,
            prompt_idle: Duration::from_millis(streaming.prompt_idle_ms),
            streaming: streaming.enabled && request.streaming,
            max_events: streaming.max_events,
            max_output_bytes: self.config.session.max_output_bytes,
        }
    }

    async fn resolve_or_create(
        &self,
        session_id: &str,
        request: &ExecuteRequest,
    ) -> Result<SessionSlot> {
        if self.shutdown.is_cancelled() {
            return Err(Error::Cancelled("session manager is shut down".to_string()));
        }

        let mut sessions = self.sessions.lock().await;
        if let Some(slot) = sessions.get(session_id) {
            if slot.status() != SessionStatus::Terminated {
                if request.cwd.is_some() {
                    debug!(session_id = %session_id, "cwd applies to new sessions only, ignoring");
                }
                return Ok(slot.clone());
            }
            sessions.remove(session_id);
        }

        let max = self.config.session.max_active_sessions;
        if sessions.len() >= max {
            warn!(session_id = %session_id, max, "Session capacity reached");
            return Err(Error::CapacityExceeded(max));
        }

        let cwd = request
            .cwd
            .as_deref()
            .map(|c| self.validator.validate_cwd(c))
            .transpose()?;
        let shell = resolve_shell(&request.shell, &self.config.shell)?;
        let env = build_env(&self.config.shell, shell.kind, &request.env);

        let (session, initial_cwd) = PtySession::spawn(SpawnSpec {
            id: session_id,
            shell: &shell,
            cwd: cwd.as_deref(),
            env: &env,
            startup_timeout: Duration::from_millis(self.config.shell.startup_timeout_ms),
            events: self.events.clone(),
        })
        .await?;

        let now = Utc::now();
        let pid = session.pid();
        let meta = SessionMeta {
            id: session_id.to_string(),
            shell: shell.program.clone(),
            cwd: initial_cwd,
            env: request.env.clone(),
            status: SessionStatus::Active,
            pending_prompt: None,
            pending_command: None,
            created_at: now,
            last_activity_at: now,
            last_activity: Instant::now(),
            busy: false,
            history: VecDeque::new(),
            history_limit: self.config.session.history_limit,
            commands_run: 0,
            last_output: None,
        };
        let slot = SessionSlot {
            shell: Arc::new(Mutex::new(session)),
            meta: Arc::new(StdMutex::new(meta)),
            cancel: self.shutdown.child_token(),
            pid,
        };

        info!(session_id = %session_id, shell = %shell.program, pid = ?pid, "Session created");
        sessions.insert(session_id.to_string(), slot.clone());
        Ok(slot)
    }

    async fn forget_if_terminated(&self, session_id: &str, slot: &SessionSlot) {
        let mut sessions = self.sessions.lock().await;
        let same = sessions
            .get(session_id)
            .is_some_and(|s| Arc::ptr_eq(&s.meta, &slot.meta));
        if same && slot.status() == SessionStatus::Terminated {
            sessions.remove(session_id);
            info!(session_id = %session_id, "Shell exited, session closed");
        }
    }

    /// Terminate idle sessions. A zero idle timeout disables eviction.
    /// Returns the number of sessions evicted.
    pub async fn sweep_idle(&self) -> usize {
        let idle = self.config.session.idle_timeout();
        if idle.is_zero() {
            return 0;
        }

        let expired: Vec<(String, SessionSlot)> = {
            let mut sessions = self.sessions.lock().await;
            let ids: Vec<String> = sessions
                .iter()
                .filter(|(_, slot)| lock_meta(&slot.meta).is_idle(idle))
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| sessions.remove(&id).map(|slot| (id, slot)))
                .collect()
        };

        for (id, slot) in &expired {
            info!(session_id = %id, idle_secs = idle.as_secs(), "Evicting idle session");
            self.terminate(id, slot, KillSignal::Hup, true).await;
        }
        expired.len()
    }

    /// Run [`sweep_idle`](Self::sweep_idle) periodically until shutdown.
    /// Returns `None` outside a tokio runtime.
    pub fn spawn_sweeper(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let handle = tokio::runtime::Handle::try_current().ok()?;
        let manager = Arc::downgrade(self);
        let shutdown = self.shutdown.clone();
        let interval = Duration::from_secs(self.config.session.sweep_interval_secs.max(1));

        Some(handle.spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = sleep(interval) => {}
                }
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                let evicted = manager.sweep_idle().await;
                if evicted > 0 {
                    debug!(evicted, "Idle sweep finished");
                }
            }
        }))
    }

    /// Signal a session's process group, escalating to SIGKILL after the
    /// grace period, and optionally persist its snapshot first.
    pub async fn kill_session(
        &self,
        session_id: &str,
        signal: KillSignal,
        save_state: bool,
    ) -> Result<KillReport> {
        let slot = self
            .sessions
            .lock()
            .await
            .remove(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;

        info!(session_id = %session_id, signal = %signal, "Killing session");
        let (snapshot_saved, escalated) = self.terminate(session_id, &slot, signal, save_state).await;
        Ok(KillReport {
            session_id: session_id.to_string(),
            signal,
            terminated: true,
            snapshot_saved,
            escalated,
        })
    }

    /// Tear down a slot already removed from the registry. Returns whether
    /// a snapshot was saved and whether SIGKILL was needed.
    async fn terminate(
        &self,
        session_id: &str,
        slot: &SessionSlot,
        signal: KillSignal,
        save_state: bool,
    ) -> (bool, bool) {
        let snapshot = {
            let mut meta = lock_meta(&slot.meta);
            meta.status = SessionStatus::Terminated;
            meta.pending_prompt = None;
            meta.touch();
            meta.snapshot(false)
        };

        let snapshot_saved = if save_state {
            match self.snapshots.save(&snapshot).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "Failed to save session snapshot");
                    false
                }
            }
        } else {
            false
        };

        slot.cancel.cancel();
        if let Some(pid) = slot.pid {
            if let Err(e) = signal_group(pid, signal) {
                warn!(session_id = %session_id, pid, error = %e, "Failed to signal shell");
            }
        }

        let grace = Duration::from_millis(self.config.session.kill_grace_ms);
        let exited = match tokio::time::timeout(grace, slot.shell.lock()).await {
            Ok(mut shell) => {
                let exited = shell.wait_for_exit(grace).await;
                if !exited {
                    escalate(slot.pid);
                    shell.kill().await;
                }
                exited
            }
            Err(_) => {
                escalate(slot.pid);
                false
            }
        };
        if !exited {
            debug!(session_id = %session_id, "Shell ignored {}, sent SIGKILL", signal);
        }
        (snapshot_saved, !exited)
    }

    /// Describe a session: the live one, or the snapshot of a killed one.
    pub async fn get_session_state(
        &self,
        session_id: &str,
        include_history: bool,
        include_output: bool,
        history_limit: usize,
    ) -> Result<SessionSnapshot> {
        self.sweep_idle().await;

        let live = self
            .sessions
            .lock()
            .await
            .get(session_id)
            .map(|slot| lock_meta(&slot.meta).snapshot(true));

        let snapshot = match live {
            Some(snapshot) => snapshot,
            None => self
                .snapshots
                .load(session_id)
                .await?
                .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?,
        };
        Ok(shape_snapshot(
            snapshot,
            include_history,
            include_output,
            history_limit,
        ))
    }

    /// Summaries of every session, oldest first.
    pub async fn list_sessions(&self, detailed: bool) -> Vec<SessionSummary> {
        self.sweep_idle().await;

        let sessions = self.sessions.lock().await;
        let mut rows: Vec<(DateTime<Utc>, SessionSummary)> = sessions
            .values()
            .map(|slot| {
                let meta = lock_meta(&slot.meta);
                (meta.created_at, meta.summary(detailed, slot.pid))
            })
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.session_id.cmp(&b.1.session_id)));
        rows.into_iter().map(|(_, row)| row).collect()
    }

    /// Cancel every wait and tear down every shell.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let slots: Vec<(String, SessionSlot)> = self.sessions.lock().await.drain().collect();
        info!(sessions = slots.len(), "Shutting down session manager");
        join_all(
            slots
                .iter()
                .map(|(id, slot)| self.terminate(id, slot, KillSignal::Hup, true)),
        )
        .await;
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn escalate(pid: Option<u32>) {
    if let Some(pid) = pid {
        if let Err(e) = signal_group(pid, KillSignal::Kill) {
            warn!(pid, error = %e, "Failed to SIGKILL shell");
        }
    }
}

fn check_state(session_id: &str, status: Option<SessionStatus>, has_command: bool) -> Result<()> {
    let awaiting = status == Some(SessionStatus::AwaitingInput);
    if has_command && awaiting {
        return Err(Error::InvalidState(format!(
            "session '{}' is waiting for input; send input or kill the session",
            session_id
        )));
    }
    if !has_command && !awaiting {
        return Err(Error::InvalidState(format!(
            "session '{}' has no pending prompt",
            session_id
        )));
    }
    Ok(())
}

fn shape_snapshot(
    mut snapshot: SessionSnapshot,
    include_history: bool,
    include_output: bool,
    history_limit: usize,
) -> SessionSnapshot {
    if include_history {
        let excess = snapshot.history.len().saturating_sub(history_limit);
        snapshot.history.drain(..excess);
    } else {
        snapshot.history.clear();
    }
    if !include_output {
        snapshot.last_output = None;
    }
    snapshot
}

/// One `execute` call against a locked session.
struct Attempt<'s> {
    manager: &'s SessionManager,
    shell: &'s mut PtySession,
    slot: &'s SessionSlot,
    session_id: String,
    plan: MonitorPlan,
    command: Option<String>,
    input: Option<String>,
}

impl Attempt<'_> {
    async fn run_command(&mut self, attempt_no: u32) -> Result<CommandResult> {
        let command = self.command.clone().unwrap_or_default();
        if attempt_no > 1 {
            debug!(session_id = %self.session_id, attempt = attempt_no, "Re-running command");
        }

        {
            let mut meta = lock_meta(&self.slot.meta);
            let cwd = meta.cwd.clone();
            meta.pending_command = Some(PendingCommand {
                command: command.clone(),
                started_at: Utc::now(),
                started: Instant::now(),
                cwd,
            });
            meta.commands_run += 1;
            meta.touch();
        }

        self.shell.start_command(&command).await?;
        if let Some(input) = &self.input {
            self.shell.send_input(input).await?;
        }
        self.watch().await
    }

    async fn answer_prompt(&mut self) -> Result<CommandResult> {
        let input = self.input.clone().unwrap_or_default();
        if !self.shell.has_in_flight() {
            return Err(Error::InvalidState(format!(
                "session '{}' has no pending prompt",
                self.session_id
            )));
        }
        self.shell.send_input(&input).await?;
        {
            let mut meta = lock_meta(&self.slot.meta);
            meta.status = SessionStatus::Active;
            meta.pending_prompt = None;
            meta.touch();
        }
        self.watch().await
    }

    async fn watch(&mut self) -> Result<CommandResult> {
        let started = Instant::now();
        let streaming = &self.manager.config.streaming;
        let mut classifier = StreamClassifier::new(&streaming.prompt_patterns)
            .with_expect_prompt(self.plan.expect_prompt.clone());
        let outcome = self
            .shell
            .monitor(&self.plan, &mut classifier, &self.slot.cancel)
            .await?;
        self.finish(outcome, started)
    }

    fn finish(&self, outcome: StepOutcome, started: Instant) -> Result<CommandResult> {
        let config = &self.manager.config;
        let (stdout, cut) = render_output(
            &outcome.raw,
            config.security.mask_secrets,
            config.session.max_output_bytes,
        );

        let mut result = CommandResult::new(self.session_id.clone());
        result.stdout = stdout;
        result.truncated = cut || outcome.overflowed;
        result.events = outcome.events;
        result.duration_ms = started.elapsed().as_millis() as u64;

        let mut meta = lock_meta(&self.slot.meta);
        match outcome.end {
            StepEnd::Completed { exit_code, cwd } => {
                result.exit_code = exit_code;
                meta.status = SessionStatus::Active;
                meta.pending_prompt = None;
                if !cwd.as_os_str().is_empty() {
                    meta.cwd = cwd;
                }
                meta.finish_command(exit_code);
            }
            StepEnd::Prompt { message, pattern } => {
                result.is_prompt_pending = true;
                result.prompt_message = Some(message.clone());
                meta.status = SessionStatus::AwaitingInput;
                meta.pending_prompt = Some(PendingPrompt { message, pattern });
            }
            StepEnd::TimedOut => {
                result.timed_out = true;
                result.error_kind = Some(ErrorKind::Timeout);
                result.stderr = format!(
                    "[TIMEOUT] Command did not finish within {}s; it may still be running in session '{}'",
                    self.plan.timeout.as_secs(),
                    self.session_id
                );
                meta.status = SessionStatus::Active;
                meta.pending_prompt = None;
                meta.finish_command(None);
            }
            StepEnd::Exited(code) => {
                result.exit_code = code;
                result.shell_exited = true;
                result.stderr = "Shell exited; the session is closed".to_string();
                meta.status = SessionStatus::Terminated;
                meta.pending_prompt = None;
                meta.finish_command(code);
            }
            StepEnd::Cancelled => {
                return Err(Error::Cancelled(format!(
                    "session '{}' was terminated while waiting",
                    self.session_id
                )));
            }
        }
        meta.last_output = Some(result.stdout.clone());
        meta.touch();
        Ok(result)
    }
}

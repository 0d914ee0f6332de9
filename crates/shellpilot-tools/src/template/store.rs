//! Template persistence and execution

use super::{ChainMode, StepReport, StepStatus, Template, TemplateReport, TemplateRun};
use crate::error::{Error, Result};
use crate::session::{CommandResult, ExecuteRequest, KillSignal, SessionManager};
use chrono::Utc;
use futures::future::join_all;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// Named templates, optionally backed by a JSON file, run through a
/// [`SessionManager`].
pub struct TemplateStore {
    manager: Arc<SessionManager>,
    templates: RwLock<HashMap<String, Template>>,
    path: Option<PathBuf>,
}

impl TemplateStore {
    /// A store that keeps templates in memory only.
    #[must_use]
    pub fn in_memory(manager: Arc<SessionManager>) -> Self {
        Self {
            manager,
            templates: RwLock::new(HashMap::new()),
            path: None,
        }
    }

    /// Open the store at the manager's configured templates path, loading
    /// any templates saved there. Without a state directory the store is
    /// in-memory.
    pub async fn open(manager: Arc<SessionManager>) -> Result<Self> {
        let Some(path) = manager.config().templates_path() else {
            return Ok(Self::in_memory(manager));
        };

        let templates = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let list: Vec<Template> = serde_json::from_slice(&bytes)?;
                list.into_iter().map(|t| (t.name.clone(), t)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        info!(path = %path.display(), count = templates.len(), "Loaded templates");

        Ok(Self {
            manager,
            templates: RwLock::new(templates),
            path: Some(path),
        })
    }

    /// The session manager templates run on.
    #[must_use]
    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// Create or replace a template. Replacing keeps the creation time.
    /// Nothing changes unless the file write succeeds.
    pub async fn save(
        &self,
        name: &str,
        commands: Vec<String>,
        description: Option<String>,
    ) -> Result<Template> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("template name is empty".to_string()));
        }
        if commands.is_empty() || commands.iter().all(|c| c.trim().is_empty()) {
            return Err(Error::InvalidInput(format!(
                "template '{}' has no commands",
                name
            )));
        }

        let mut templates = self.templates.write().await;
        let now = Utc::now();
        let created_at = templates.get(name).map_or(now, |t| t.created_at);
        let template = Template {
            name: name.to_string(),
            description,
            commands,
            created_at,
            updated_at: now,
        };
        let mut next = templates.clone();
        next.insert(template.name.clone(), template.clone());
        self.persist(&next).await?;
        *templates = next;

        info!(template = %template.name, steps = template.commands.len(), "Saved template");
        Ok(template)
    }

    /// Look up a template.
    pub async fn get(&self, name: &str) -> Result<Template> {
        self.templates
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| Error::TemplateNotFound(name.to_string()))
    }

    /// All templates, sorted by name.
    pub async fn list(&self) -> Vec<Template> {
        let mut list: Vec<Template> = self.templates.read().await.values().cloned().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }

    /// Remove a template, returning it.
    pub async fn delete(&self, name: &str) -> Result<Template> {
        let mut templates = self.templates.write().await;
        let mut next = templates.clone();
        let removed = next
            .remove(name)
            .ok_or_else(|| Error::TemplateNotFound(name.to_string()))?;
        self.persist(&next).await?;
        *templates = next;
        info!(template = %name, "Deleted template");
        Ok(removed)
    }

    /// Render and run a template.
    ///
    /// Missing parameters fail the whole run before any step starts.
    /// Step failures never fail the call; they are reported per step.
    #[instrument(skip(self, run), fields(template = %name, chain_mode = %run.chain_mode))]
    pub async fn execute(&self, name: &str, run: TemplateRun) -> Result<TemplateReport> {
        let template = self.get(name).await?;
        let commands = template.render(&run.parameters)?;
        let start = Instant::now();

        info!(steps = commands.len(), session_id = %run.session_id, "Running template");
        let steps = match run.chain_mode {
            ChainMode::Parallel => self.run_parallel(commands, &run).await,
            ChainMode::Sequential | ChainMode::Conditional => {
                self.run_chained(commands, &run).await
            }
        };

        let report = TemplateReport::new(
            &template.name,
            run.chain_mode,
            steps,
            start.elapsed().as_millis() as u64,
        );
        info!(
            executed = report.steps_executed,
            failed = report.failed,
            skipped = report.skipped,
            success = report.success,
            "Template finished"
        );
        Ok(report)
    }

    async fn run_chained(&self, commands: Vec<String>, run: &TemplateRun) -> Vec<StepReport> {
        let mut steps = Vec::with_capacity(commands.len());
        let mut halted = false;

        for (i, command) in commands.into_iter().enumerate() {
            let index = i + 1;
            if halted {
                steps.push(StepReport::skipped(index, command, &run.session_id));
                continue;
            }

            let step = self.run_step(index, command, &run.session_id, run.timeout_secs).await;
            halted = match run.chain_mode {
                ChainMode::Conditional => !exited_zero(&step),
                _ => step.status == StepStatus::Failed && run.stop_on_error,
            };
            if halted {
                debug!(step = index, "Step failed, skipping the rest");
            }
            steps.push(step);
        }
        steps
    }

    async fn run_parallel(&self, commands: Vec<String>, run: &TemplateRun) -> Vec<StepReport> {
        let session_ids: Vec<String> = (1..=commands.len())
            .map(|n| format!("{}-step-{}", run.session_id, n))
            .collect();

        let steps = join_all(
            commands
                .into_iter()
                .zip(&session_ids)
                .enumerate()
                .map(|(i, (command, sid))| self.run_step(i + 1, command, sid, run.timeout_secs)),
        )
        .await;

        for sid in &session_ids {
            match self.manager.kill_session(sid, KillSignal::Hup, false).await {
                Ok(_) | Err(Error::SessionNotFound(_)) => {}
                Err(e) => warn!(session_id = %sid, error = %e, "Failed to close step session"),
            }
        }
        steps
    }

    async fn run_step(
        &self,
        index: usize,
        command: String,
        session_id: &str,
        timeout_secs: Option<u64>,
    ) -> StepReport {
        let mut request = ExecuteRequest::command(command.clone()).with_session(session_id);
        if let Some(secs) = timeout_secs {
            request = request.with_timeout_secs(secs);
        }

        let (status, result, error) = match self.manager.execute(request).await {
            Ok(result) => {
                let status = if result.is_success() {
                    StepStatus::Succeeded
                } else {
                    StepStatus::Failed
                };
                (status, Some(result), None)
            }
            Err(e) => {
                warn!(step = index, session_id = %session_id, error = %e, "Template step could not run");
                (StepStatus::Failed, None, Some(e.to_string()))
            }
        };

        StepReport {
            index,
            command,
            status,
            session_id: session_id.to_string(),
            result,
            error,
        }
    }

    async fn persist(&self, templates: &HashMap<String, Template>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut list: Vec<&Template> = templates.values().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        tokio::fs::write(path, serde_json::to_vec_pretty(&list)?).await?;
        debug!(path = %path.display(), count = list.len(), "Persisted templates");
        Ok(())
    }
}

fn exited_zero(step: &StepReport) -> bool {
    step.result
        .as_ref()
        .and_then(|r: &CommandResult| r.exit_code)
        == Some(0)
}

impl std::fmt::Debug for TemplateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

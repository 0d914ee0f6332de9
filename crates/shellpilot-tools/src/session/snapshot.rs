//! Persisted session snapshots

use super::types::SessionSnapshot;
use crate::error::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

/// Storage for snapshots of terminated sessions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persist `snapshot`, replacing an earlier one for the same id.
    async fn save(&self, snapshot: &SessionSnapshot) -> Result<()>;

    /// Load the snapshot for `session_id`, if one exists.
    async fn load(&self, session_id: &str) -> Result<Option<SessionSnapshot>>;
}

/// Keeps nothing.
#[derive(Debug, Default)]
pub struct NoopSnapshotStore;

#[async_trait]
impl SnapshotStore for NoopSnapshotStore {
    async fn save(&self, _snapshot: &SessionSnapshot) -> Result<()> {
        Ok(())
    }

    async fn load(&self, _session_id: &str) -> Result<Option<SessionSnapshot>> {
        Ok(None)
    }
}

/// One JSON file per session under a directory.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    /// Store snapshots under `dir`, created on first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        let name: String = session_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", name))
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn save(&self, snapshot: &SessionSnapshot) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(&snapshot.session_id);
        let json = serde_json::to_vec_pretty(snapshot)?;
        tokio::fs::write(&path, json).await?;
        debug!(session_id = %snapshot.session_id, path = %path.display(), "Saved session snapshot");
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<SessionSnapshot>> {
        let path = self.path_for(session_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionStatus;
    use chrono::Utc;

    fn snapshot(id: &str) -> SessionSnapshot {
        SessionSnapshot {
            session_id: id.to_string(),
            status: SessionStatus::Terminated,
            shell: "bash".to_string(),
            cwd: PathBuf::from("/tmp"),
            env: Default::default(),
            created_at: Utc::now(),
            last_activity_at: Utc::now(),
            pending_prompt: None,
            commands_run: 2,
            history: Vec::new(),
            last_output: Some("ok".to_string()),
            live: false,
        }
    }

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path().join("sessions"));

        assert!(store.load("build").await.unwrap().is_none());
        store.save(&snapshot("build")).await.unwrap();

        let loaded = store.load("build").await.unwrap().unwrap();
        assert_eq!(loaded.commands_run, 2);
        assert_eq!(loaded.status, SessionStatus::Terminated);
    }

    #[tokio::test]
    async fn test_file_store_sanitizes_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        store.save(&snapshot("../escape/me")).await.unwrap();
        assert!(dir.path().join(".._escape_me.json").exists());
        assert!(store.load("../escape/me").await.unwrap().is_some());
    }
}

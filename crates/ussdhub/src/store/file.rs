//! Durable session storage backed by one YAML file per session.
//!
//! Layout, with documents written atomically:
//!
//! ```text
//! {sessions_dir}/
//!   ussd_01J8ZQ....yaml
//!   ussd_01J8ZR....yaml
//! ```
//!
//! Queries scan the directory, which suits the modest row counts of a
//! single-node gateway; terminal rows are retained as history and never
//! deleted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs;

use crate::contact::ActorProvider;
use crate::session::{NewSession, Session, SessionDirection, SessionField, generate_session_id};
use crate::store::SessionStore;
use crate::store::error::{StoreError, StoreResult};
use crate::store::memory::DEFAULT_LOCK_WAIT;
use crate::sync::{KeyedLocks, RowGuard};

/// `SessionStore` over a directory of YAML session documents.
pub struct FileSessionStore {
    sessions_dir: PathBuf,
    locks: KeyedLocks,
    lock_wait: Duration,
    actors: Arc<dyn ActorProvider>,
}

impl FileSessionStore {
    /// Open a store over the given directory.
    ///
    /// The sessions directory is created when the first session is stored.
    /// Must be called from within a tokio runtime: the row-lock table
    /// spawns its stale-entry sweeper.
    pub fn new(sessions_dir: impl Into<PathBuf>, actors: Arc<dyn ActorProvider>) -> Self {
        Self {
            sessions_dir: sessions_dir.into(),
            locks: KeyedLocks::with_cleanup("session_row_locks"),
            lock_wait: DEFAULT_LOCK_WAIT,
            actors,
        }
    }

    /// Override the bounded wait used by `lock_external_id`.
    pub fn with_lock_wait(mut self, wait: Duration) -> Self {
        self.lock_wait = wait;
        self
    }

    /// Get the document path for a session.
    fn session_path(&self, session_id: &str) -> PathBuf {
        self.sessions_dir.join(format!("{session_id}.yaml"))
    }

    /// Ensure the sessions directory exists.
    async fn ensure_dir(&self) -> StoreResult<()> {
        fs::create_dir_all(&self.sessions_dir)
            .await
            .map_err(|e| StoreError::file_io(&self.sessions_dir, e))
    }

    /// Load one session document; `Ok(None)` when the file does not exist.
    async fn load(&self, session_id: &str) -> StoreResult<Option<Session>> {
        let path = self.session_path(session_id);

        let contents = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::file_io(&path, e)),
        };

        let session: Session = serde_yaml::from_str(&contents)
            .map_err(|e| StoreError::file_deserialization(&path, e.to_string()))?;

        Ok(Some(session))
    }

    /// Write one session document atomically (temp file + rename).
    async fn write(&self, session: &Session) -> StoreResult<()> {
        let final_path = self.session_path(&session.id);
        let temp_path = self.sessions_dir.join(format!("{}.yaml.tmp", session.id));

        let yaml =
            serde_yaml::to_string(session).map_err(|e| StoreError::serialization(e.to_string()))?;

        fs::write(&temp_path, yaml.as_bytes())
            .await
            .map_err(|e| StoreError::file_io(&temp_path, e))?;

        fs::rename(&temp_path, &final_path)
            .await
            .map_err(|e| StoreError::file_io(&final_path, e))?;

        Ok(())
    }

    /// Load every session document in the directory.
    async fn scan(&self) -> StoreResult<Vec<Session>> {
        let mut sessions = Vec::new();

        let mut entries = match fs::read_dir(&self.sessions_dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::file_io(&self.sessions_dir, e)),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::file_io(&self.sessions_dir, e))?
        {
            let path = entry.path();
            // Only finished documents; leftover .tmp files are ignored
            if path.extension().is_some_and(|ext| ext == "yaml")
                && let Some(stem) = path.file_stem()
                && let Some(session) = self.load(&stem.to_string_lossy()).await?
            {
                sessions.push(session);
            }
        }

        Ok(sessions)
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    // ========================================================================
    // Lookups
    // ========================================================================

    async fn get(&self, id: &str) -> StoreResult<Option<Session>> {
        self.load(id).await
    }

    async fn find_active_push_session(&self, subscriber: &str) -> StoreResult<Option<Session>> {
        Ok(self
            .scan()
            .await?
            .into_iter()
            .filter(|s| {
                !s.status.is_terminal()
                    && s.direction == SessionDirection::Push
                    && s.subscriber == subscriber
            })
            .max_by_key(|s| s.created_on))
    }

    async fn find_active_by_external_id(&self, external_id: &str) -> StoreResult<Option<Session>> {
        Ok(self
            .scan()
            .await?
            .into_iter()
            .filter(|s| !s.status.is_terminal() && s.external_id == external_id)
            .max_by_key(|s| s.created_on))
    }

    // ========================================================================
    // Locking
    // ========================================================================

    async fn lock_external_id(&self, external_id: &str) -> StoreResult<RowGuard> {
        Ok(self.locks.acquire(external_id, self.lock_wait).await?)
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    async fn create(&self, new: NewSession) -> StoreResult<Session> {
        self.ensure_dir().await?;

        let actor = new
            .actor
            .clone()
            .unwrap_or_else(|| self.actors.system_actor());
        let session = Session::from_new(new, generate_session_id(), actor, Utc::now());

        self.write(&session).await?;
        Ok(session)
    }

    async fn save(&self, session: &mut Session, changed: &[SessionField]) -> StoreResult<()> {
        let mut row = self
            .load(&session.id)
            .await?
            .ok_or_else(|| StoreError::not_found(&session.id))?;

        for field in changed {
            match field {
                SessionField::ExternalId => row.external_id = session.external_id.clone(),
                SessionField::Status => row.status = session.status,
                SessionField::StartedOn => row.started_on = session.started_on,
                SessionField::EndedOn => row.ended_on = session.ended_on,
            }
        }

        let now = Utc::now();
        row.modified_on = now;
        session.modified_on = now;

        self.write(&row).await
    }

    // ========================================================================
    // Index
    // ========================================================================

    async fn list(&self) -> StoreResult<Vec<String>> {
        let mut ids = Vec::new();

        let mut entries = match fs::read_dir(&self.sessions_dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::file_io(&self.sessions_dir, e)),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::file_io(&self.sessions_dir, e))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "yaml")
                && let Some(stem) = path.file_stem()
            {
                ids.push(stem.to_string_lossy().to_string());
            }
        }

        Ok(ids)
    }
}

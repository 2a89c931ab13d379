//! In-memory session storage implementation.
//!
//! Backs tests and the simulator; rows live in a concurrent map and vanish
//! with the process. Query semantics match the file backend exactly so the
//! two are interchangeable behind the trait.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use crate::contact::ActorProvider;
use crate::session::{NewSession, Session, SessionDirection, SessionField, generate_session_id};
use crate::store::SessionStore;
use crate::store::error::{StoreError, StoreResult};
use crate::sync::{KeyedLocks, RowGuard};

/// Default bounded wait for the per-row external-id lock.
pub const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(5);

/// In-memory implementation of `SessionStore`.
pub struct MemorySessionStore {
    rows: DashMap<String, Session>,
    locks: KeyedLocks,
    lock_wait: Duration,
    actors: Arc<dyn ActorProvider>,
}

impl MemorySessionStore {
    /// Create an empty store.
    pub fn new(actors: Arc<dyn ActorProvider>) -> Self {
        Self {
            rows: DashMap::new(),
            locks: KeyedLocks::new(),
            lock_wait: DEFAULT_LOCK_WAIT,
            actors,
        }
    }

    /// Override the bounded wait used by `lock_external_id`.
    pub fn with_lock_wait(mut self, wait: Duration) -> Self {
        self.lock_wait = wait;
        self
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    // ========================================================================
    // Lookups
    // ========================================================================

    async fn get(&self, id: &str) -> StoreResult<Option<Session>> {
        Ok(self.rows.get(id).map(|row| row.value().clone()))
    }

    async fn find_active_push_session(&self, subscriber: &str) -> StoreResult<Option<Session>> {
        Ok(self
            .rows
            .iter()
            .filter(|row| {
                !row.status.is_terminal()
                    && row.direction == SessionDirection::Push
                    && row.subscriber == subscriber
            })
            .max_by_key(|row| row.value().created_on)
            .map(|row| row.value().clone()))
    }

    async fn find_active_by_external_id(&self, external_id: &str) -> StoreResult<Option<Session>> {
        Ok(self
            .rows
            .iter()
            .filter(|row| !row.status.is_terminal() && row.external_id == external_id)
            .max_by_key(|row| row.value().created_on)
            .map(|row| row.value().clone()))
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
        let actor = new
            .actor
            .clone()
            .unwrap_or_else(|| self.actors.system_actor());
        let session = Session::from_new(new, generate_session_id(), actor, Utc::now());
        self.rows.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn save(&self, session: &mut Session, changed: &[SessionField]) -> StoreResult<()> {
        let mut row = self
            .rows
            .get_mut(&session.id)
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
        Ok(())
    }

    // ========================================================================
    // Index
    // ========================================================================

    async fn list(&self) -> StoreResult<Vec<String>> {
        Ok(self.rows.iter().map(|row| row.key().clone()).collect())
    }
}

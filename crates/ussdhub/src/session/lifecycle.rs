//! Persisted status transitions.
//!
//! Two writes matter beyond reconciliation itself: a flow asking for a
//! graceful end (`mark_ending`) and the moment a session actually stops
//! (`close`). Both go through the store with an explicit field list so no
//! other column is touched.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::session::model::{Session, SessionField, SessionStatus};
use crate::store::{SessionStore, StoreResult};

/// Applies lifecycle transitions and persists them.
#[derive(Clone)]
pub struct SessionLifecycle {
    store: Arc<dyn SessionStore>,
}

impl SessionLifecycle {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Request a graceful end for the session.
    ///
    /// Sets `Ending` and persists only the status column. Idempotent: a
    /// session already in `Ending` is left untouched and nothing is written.
    pub async fn mark_ending(&self, session: &mut Session) -> StoreResult<()> {
        if session.status == SessionStatus::Ending {
            return Ok(());
        }

        session.status = SessionStatus::Ending;
        self.store.save(session, &[SessionField::Status]).await?;
        debug!(session_id = %session.id, "session marked ending");
        Ok(())
    }

    /// Close the session, stamping `ended_on`.
    ///
    /// A session that was in `Ending` completed its flow and closes as
    /// `Completed`; any other live status means the close cut it short and
    /// it closes as `Interrupted`. Callers must not close a session twice.
    pub async fn close(&self, session: &mut Session) -> StoreResult<()> {
        session.status = if session.status == SessionStatus::Ending {
            SessionStatus::Completed
        } else {
            SessionStatus::Interrupted
        };
        session.ended_on = Some(Utc::now());
        self.store
            .save(session, &[SessionField::Status, SessionField::EndedOn])
            .await?;
        info!(session_id = %session.id, status = %session.status, "session closed");
        Ok(())
    }
}

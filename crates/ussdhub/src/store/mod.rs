//! Session persistence.
//!
//! The store is a dumb table of session rows: lookups, partial saves, and a
//! per-row lock primitive. Create-vs-resume decisions, status transitions,
//! and every other piece of business logic live above it in the session
//! module.
//!
//! Two backends ship: [`MemorySessionStore`] for tests and the simulator,
//! and [`FileSessionStore`] for durable single-node deployments.

pub mod error;
pub mod file;
pub mod memory;

pub use error::{StoreError, StoreResult};
pub use file::FileSessionStore;
pub use memory::MemorySessionStore;

use async_trait::async_trait;

use crate::session::{NewSession, Session, SessionField};
use crate::sync::RowGuard;

/// Storage interface for session rows.
#[async_trait]
pub trait SessionStore: Send + Sync {
    // ========================================================================
    // Lookups
    // ========================================================================

    /// Fetch a session by internal id.
    async fn get(&self, id: &str) -> StoreResult<Option<Session>>;

    /// The most relevant non-terminal push session for a subscriber, if any.
    ///
    /// "Most relevant" means most recently created; the reconciler enforces
    /// at most one such session per subscriber, so ties only arise from
    /// races the caller already tolerates.
    async fn find_active_push_session(&self, subscriber: &str) -> StoreResult<Option<Session>>;

    /// A non-terminal session matching the gateway's external id, if any.
    ///
    /// Terminal rows are never matched; a reused external id resolves to
    /// the live session only.
    async fn find_active_by_external_id(&self, external_id: &str) -> StoreResult<Option<Session>>;

    // ========================================================================
    // Locking
    // ========================================================================

    /// Acquire the exclusive row lock for an external id, with bounded wait.
    ///
    /// Serializes concurrent reconciliation for one external id. Times out
    /// with the retryable [`StoreError::Contention`]; hold the returned
    /// guard only for the match-and-patch sequence.
    async fn lock_external_id(&self, external_id: &str) -> StoreResult<RowGuard>;

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Insert a new session row.
    ///
    /// Assigns the internal id and audit timestamps. Requests that carry no
    /// actor get the system actor on the audit columns.
    async fn create(&self, new: NewSession) -> StoreResult<Session>;

    /// Persist a partial update; only the listed fields are written.
    ///
    /// Refreshes `modified_on` on both the stored row and the passed
    /// session.
    async fn save(&self, session: &mut Session, changed: &[SessionField]) -> StoreResult<()>;

    // ========================================================================
    // Index
    // ========================================================================

    /// List all session ids, terminal rows included.
    async fn list(&self) -> StoreResult<Vec<String>>;
}

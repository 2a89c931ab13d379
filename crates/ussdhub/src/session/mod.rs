//! Session reconciliation and lifecycle.
//!
//! # Architecture
//!
//! ```text
//!                    UssdEvent
//!  ┌─────────┐   (gateway adapter)   ┌───────────────────┐
//!  │ gateway │──────────────────────▶│ SessionReconciler │
//!  └─────────┘                       └──┬─────────────┬──┘
//!                         match/create  │             │  start/resume
//!                     ┌─────────────────▼──┐   ┌──────▼──────┐
//!                     │    SessionStore    │   │  Dispatcher │
//!                     │ (rows + row locks) │   └──────┬──────┘
//!                     └────────────────────┘          │
//!                                        record       │  run step
//!                                   ┌─────────────┐   │   ┌────────────┐
//!                                   │ MessageSink │◀──┴──▶│ FlowEngine │
//!                                   └─────────────┘       └────────────┘
//! ```
//!
//! - **SessionReconciler** - resolves identity, matches the event to a
//!   session (live push dialog first, then external id under a row lock),
//!   creates one when allowed, and dispatches.
//! - **SessionLifecycle** - the two persisted transitions flows ask for:
//!   `mark_ending` and `close`.
//! - **Dispatcher** - records inbound messages and runs flow steps, awaited
//!   (`Sync`) or spawned (`Async`).
//!
//! Status lifecycle:
//!
//! ```text
//!  TRIGGERED ──▶ IN_PROGRESS ──▶ ENDING ──▶ COMPLETED
//!      │              │             │
//!      └──────────────┴─────────────┴─────────▶ INTERRUPTED
//! ```
//!
//! `Completed` and `Interrupted` are terminal: such rows are never matched,
//! resumed, or written again.

mod dispatch;
mod error;
mod lifecycle;
mod model;
mod reconciler;

// Model
pub use model::{
    NewSession, SESSION_ID_PREFIX, Session, SessionDirection, SessionField, SessionPatch,
    SessionStatus, generate_session_id,
};

// Reconciliation
pub use dispatch::{DispatchMode, Dispatcher};
pub use error::{ReconcileError, ReconcileResult};
pub use reconciler::{HandleOutcome, SessionReconciler};

// Lifecycle
pub use lifecycle::SessionLifecycle;

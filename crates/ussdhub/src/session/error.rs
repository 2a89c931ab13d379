//! Error type for reconciliation and dispatch.

use thiserror::Error;

use crate::contact::IdentityError;
use crate::flow::FlowError;
use crate::msg::SinkError;
use crate::store::StoreError;
use crate::trigger::TriggerError;
use crate::urn::UrnError;

/// Errors surfaced by `handle_incoming` and `handle_interrupt`.
///
/// Collaborator failures pass through unmodified; the reconciler adds no
/// retry logic of its own. Retries, if any, belong to the transport layer,
/// and only store contention qualifies.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Trigger(#[from] TriggerError),

    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Urn(#[from] UrnError),
}

impl ReconcileError {
    /// Whether the caller may redeliver the event as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_retryable())
    }
}

/// Convenience type alias for reconciliation results.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contention_is_retryable_through_the_wrapper() {
        let err: ReconcileError = StoreError::contention("4879", 5000).into();
        assert!(err.is_retryable());
    }

    #[test]
    fn collaborator_failures_are_not_retryable() {
        let flow: ReconcileError = FlowError::execution("boom").into();
        let store: ReconcileError = StoreError::not_found("ussd_123").into();

        assert!(!flow.is_retryable());
        assert!(!store.is_retryable());
    }

    #[test]
    fn transparent_wrapping_preserves_messages() {
        let err: ReconcileError = FlowError::execution("boom").into();
        assert_eq!(err.to_string(), "flow execution failed: boom");
    }
}

//! Trigger-to-flow lookup collaborator.
//!
//! A trigger maps a dialed service code to the flow that should run for it.
//! The reconciler consults the lookup only for trigger-hinted events; an
//! event whose starcode has no trigger is dropped, never errored.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use ulid::Ulid;

use crate::flow::FlowRef;

// ============================================================================
// Types
// ============================================================================

/// A starcode-to-flow mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub id: String,
    pub starcode: String,
    pub flow: FlowRef,
}

// ============================================================================
// Errors
// ============================================================================

/// Errors raised by trigger lookups.
#[derive(Debug, Error)]
pub enum TriggerError {
    /// The lookup backend failed; distinct from "no trigger matched".
    #[error("trigger lookup failed: {0}")]
    Lookup(String),
}

impl TriggerError {
    /// Create a lookup-failure error.
    pub fn lookup(message: impl Into<String>) -> Self {
        Self::Lookup(message.into())
    }
}

// ============================================================================
// Trait
// ============================================================================

/// Resolves the trigger for a dialed service code.
#[async_trait]
pub trait TriggerLookup: Send + Sync {
    /// Find the trigger matching `starcode` for this subscriber, if any.
    ///
    /// `Ok(None)` means no trigger matched, which is a normal outcome,
    /// not a failure.
    async fn find_trigger_for_ussd(
        &self,
        subscriber: &str,
        starcode: Option<&str>,
    ) -> Result<Option<Trigger>, TriggerError>;
}

// ============================================================================
// Static reference implementation
// ============================================================================

/// Fixed starcode-to-flow table for tests and the simulator.
#[derive(Default)]
pub struct StaticTriggerLookup {
    triggers: HashMap<String, Trigger>,
}

impl StaticTriggerLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a starcode-to-flow mapping.
    pub fn with_trigger(mut self, starcode: impl Into<String>, flow: FlowRef) -> Self {
        let starcode = starcode.into();
        self.triggers.insert(
            starcode.clone(),
            Trigger {
                id: format!("trg_{}", Ulid::new()),
                starcode,
                flow,
            },
        );
        self
    }
}

#[async_trait]
impl TriggerLookup for StaticTriggerLookup {
    async fn find_trigger_for_ussd(
        &self,
        _subscriber: &str,
        starcode: Option<&str>,
    ) -> Result<Option<Trigger>, TriggerError> {
        Ok(starcode.and_then(|code| self.triggers.get(code)).cloned())
    }
}

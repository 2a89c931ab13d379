//! Flow-execution collaborator interface.
//!
//! The engine never interprets USSD content itself; it hands recorded
//! inbound messages to a [`FlowEngine`] and relays whatever replies come
//! back. Starting a flow and continuing one are distinct operations because
//! the reconciler distinguishes create from resume.

use async_trait::async_trait;
use thiserror::Error;
use ulid::Ulid;

use crate::msg::MessageRef;

// ============================================================================
// Types
// ============================================================================

/// Reference to a flow definition held by the flow engine.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowRef {
    pub id: String,
    pub name: String,
}

impl FlowRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// A flow reference whose id doubles as its name; used where flows are
    /// configured by name alone.
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
        }
    }
}

/// Request to begin executing a flow for one or more subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowStart {
    pub flow: FlowRef,
    pub subscribers: Vec<String>,
    /// The recorded inbound message that opens the run.
    pub opening_message: MessageRef,
    pub session_id: String,
    /// Restart subscribers already participating in this flow.
    pub restart_participants: bool,
}

/// Result of feeding an inbound message to the flow engine.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowContinuation {
    /// Whether an active run consumed the message.
    pub handled: bool,
    pub replies: Vec<OutboundMessage>,
}

impl FlowContinuation {
    /// No active run consumed the message.
    pub fn unhandled() -> Self {
        Self {
            handled: false,
            replies: Vec::new(),
        }
    }
}

/// A reply produced by the flow engine.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub id: String,
    pub text: String,
}

impl OutboundMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: format!("msg_{}", Ulid::new()),
            text: text.into(),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors raised by the flow engine.
#[derive(Debug, Error)]
pub enum FlowError {
    /// The flow could not begin executing.
    #[error("flow {flow} failed to start: {reason}")]
    StartFailed { flow: String, reason: String },

    /// An active run failed while consuming a message.
    #[error("flow execution failed: {0}")]
    Execution(String),
}

impl FlowError {
    /// Create a start-failure error.
    pub fn start_failed(flow: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StartFailed {
            flow: flow.into(),
            reason: reason.into(),
        }
    }

    /// Create an execution error.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }
}

// ============================================================================
// Trait
// ============================================================================

/// The flow-execution collaborator.
#[async_trait]
pub trait FlowEngine: Send + Sync {
    /// Begin executing `start.flow`, with `start.opening_message` as the
    /// run's first input. Returns the opening replies.
    async fn start_flow(&self, start: FlowStart) -> Result<Vec<OutboundMessage>, FlowError>;

    /// Feed an inbound message to the subscriber's active run.
    async fn continue_flow(&self, message: &MessageRef) -> Result<FlowContinuation, FlowError>;
}

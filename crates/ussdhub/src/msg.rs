//! Inbound message recording collaborator.
//!
//! Every event the reconciler dispatches is recorded through a
//! [`MessageSink`] first, before any flow execution happens. That ordering
//! is what makes asynchronous dispatch safe: content is durably attributed
//! to its session even when the flow step runs later or fails.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;
use ulid::Ulid;

use crate::urn::TelUrn;

// ============================================================================
// Types
// ============================================================================

/// An inbound message to record against a session.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub channel: String,
    pub org: Option<String>,
    pub address: TelUrn,
    /// Subscriber-entered text; empty for interrupt dispatches.
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    /// Gateway's id for the message, when it supplied one.
    pub external_id: Option<String>,
}

/// Handle to a recorded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRef {
    pub id: String,
    pub session_id: String,
    pub address: TelUrn,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Errors
// ============================================================================

/// Errors raised by message sinks.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The sink backend could not be reached.
    #[error("message sink unavailable: {0}")]
    Unavailable(String),

    /// `mark_handled` referenced a message the sink does not know.
    #[error("unknown message: {id}")]
    UnknownMessage { id: String },
}

impl SinkError {
    /// Create an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Create an unknown-message error.
    pub fn unknown_message(id: impl Into<String>) -> Self {
        Self::UnknownMessage { id: id.into() }
    }
}

// ============================================================================
// Trait
// ============================================================================

/// Records inbound messages and their handled state.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Persist an inbound message, returning its handle.
    async fn record_inbound(&self, message: InboundMessage) -> Result<MessageRef, SinkError>;

    /// Mark a recorded message as handled by the flow engine.
    async fn mark_handled(&self, message: &MessageRef) -> Result<(), SinkError>;
}

// ============================================================================
// In-memory reference implementation
// ============================================================================

/// In-memory [`MessageSink`] for tests and the simulator.
#[derive(Default)]
pub struct MemoryMessageSink {
    seq: AtomicU64,
    messages: DashMap<String, StoredMessage>,
}

struct StoredMessage {
    seq: u64,
    inbound: InboundMessage,
    message: MessageRef,
    handled: bool,
}

impl MemoryMessageSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded message handles, in recording order.
    pub fn messages(&self) -> Vec<MessageRef> {
        let mut stored: Vec<_> = self
            .messages
            .iter()
            .map(|entry| (entry.value().seq, entry.value().message.clone()))
            .collect();
        stored.sort_by_key(|(seq, _)| *seq);
        stored.into_iter().map(|(_, message)| message).collect()
    }

    /// Recorded raw inbound messages, in recording order.
    pub fn recorded(&self) -> Vec<InboundMessage> {
        let mut stored: Vec<_> = self
            .messages
            .iter()
            .map(|entry| (entry.value().seq, entry.value().inbound.clone()))
            .collect();
        stored.sort_by_key(|(seq, _)| *seq);
        stored.into_iter().map(|(_, inbound)| inbound).collect()
    }

    /// Whether a recorded message has been marked handled.
    pub fn is_handled(&self, message_id: &str) -> bool {
        self.messages
            .get(message_id)
            .is_some_and(|entry| entry.value().handled)
    }
}

#[async_trait]
impl MessageSink for MemoryMessageSink {
    async fn record_inbound(&self, message: InboundMessage) -> Result<MessageRef, SinkError> {
        let message_ref = MessageRef {
            id: format!("msg_{}", Ulid::new()),
            session_id: message.session_id.clone(),
            address: message.address.clone(),
            content: message.content.clone(),
            timestamp: message.timestamp,
        };

        self.messages.insert(
            message_ref.id.clone(),
            StoredMessage {
                seq: self.seq.fetch_add(1, Ordering::Relaxed),
                inbound: message,
                message: message_ref.clone(),
                handled: false,
            },
        );

        Ok(message_ref)
    }

    async fn mark_handled(&self, message: &MessageRef) -> Result<(), SinkError> {
        let Some(mut stored) = self.messages.get_mut(&message.id) else {
            return Err(SinkError::unknown_message(&message.id));
        };
        stored.handled = true;
        Ok(())
    }
}

//! Flow dispatch in synchronous and asynchronous modes.
//!
//! `Sync` awaits the flow step and hands its replies back to the caller,
//! which request/response gateways need to answer within the carrier
//! timeout. `Async` records the inbound message, spawns the flow step on
//! the runtime, and returns immediately; replies then travel through the
//! flow engine's own outbound path. In both modes the message is recorded
//! in the sink before the flow engine sees anything, so a crashed flow
//! step never loses subscriber input.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::error;

use crate::flow::{FlowEngine, FlowRef, FlowStart, OutboundMessage};
use crate::msg::{InboundMessage, MessageSink};
use crate::session::error::ReconcileResult;
use crate::session::model::Session;

/// How a reconciled event is handed to the flow engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Await the flow step and return its replies.
    Sync,
    /// Spawn the flow step and return immediately.
    Async,
}

/// Records inbound messages and runs flow steps for reconciled sessions.
pub struct Dispatcher {
    flows: Arc<dyn FlowEngine>,
    msgs: Arc<dyn MessageSink>,
}

impl Dispatcher {
    pub fn new(flows: Arc<dyn FlowEngine>, msgs: Arc<dyn MessageSink>) -> Self {
        Self { flows, msgs }
    }

    fn inbound(
        session: &Session,
        content: Option<String>,
        timestamp: DateTime<Utc>,
        message_id: Option<String>,
    ) -> InboundMessage {
        InboundMessage {
            channel: session.channel.clone(),
            org: session.org.clone(),
            address: session.address.clone(),
            content: content.unwrap_or_default(),
            timestamp,
            session_id: session.id.clone(),
            external_id: message_id,
        }
    }

    /// Record the opening message and start `flow` for the session's
    /// subscriber.
    ///
    /// Returns the flow's replies in `Sync` mode, `None` in `Async` mode.
    pub async fn start(
        &self,
        session: &Session,
        flow: FlowRef,
        content: Option<String>,
        timestamp: DateTime<Utc>,
        message_id: Option<String>,
        mode: DispatchMode,
    ) -> ReconcileResult<Option<Vec<OutboundMessage>>> {
        let opening = self
            .msgs
            .record_inbound(Self::inbound(session, content, timestamp, message_id))
            .await?;
        let start = FlowStart {
            flow,
            subscribers: vec![session.subscriber.clone()],
            opening_message: opening,
            session_id: session.id.clone(),
            restart_participants: true,
        };

        match mode {
            DispatchMode::Sync => Ok(Some(self.flows.start_flow(start).await?)),
            DispatchMode::Async => {
                let flows = Arc::clone(&self.flows);
                let session_id = session.id.clone();
                tokio::spawn(async move {
                    if let Err(e) = flows.start_flow(start).await {
                        error!(session_id = %session_id, error = %e, "flow start failed");
                    }
                });
                Ok(None)
            }
        }
    }

    /// Record the message and feed it to the subscriber's active run.
    ///
    /// Messages the flow engine handles are marked so in the sink. Returns
    /// the continuation's replies in `Sync` mode, `None` in `Async` mode.
    pub async fn resume(
        &self,
        session: &Session,
        content: Option<String>,
        timestamp: DateTime<Utc>,
        message_id: Option<String>,
        mode: DispatchMode,
    ) -> ReconcileResult<Option<Vec<OutboundMessage>>> {
        let message = self
            .msgs
            .record_inbound(Self::inbound(session, content, timestamp, message_id))
            .await?;

        match mode {
            DispatchMode::Sync => {
                let continuation = self.flows.continue_flow(&message).await?;
                if continuation.handled {
                    self.msgs.mark_handled(&message).await?;
                }
                Ok(Some(continuation.replies))
            }
            DispatchMode::Async => {
                let flows = Arc::clone(&self.flows);
                let msgs = Arc::clone(&self.msgs);
                let session_id = session.id.clone();
                tokio::spawn(async move {
                    match flows.continue_flow(&message).await {
                        Ok(continuation) if continuation.handled => {
                            if let Err(e) = msgs.mark_handled(&message).await {
                                error!(session_id = %session_id, error = %e, "failed to mark message handled");
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!(session_id = %session_id, error = %e, "flow continuation failed");
                        }
                    }
                });
                Ok(None)
            }
        }
    }
}

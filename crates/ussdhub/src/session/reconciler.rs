//! Event reconciliation.
//!
//! Every inbound gateway event lands here. The reconciler attaches a
//! subscriber identity, translates the gateway's status hint into a typed
//! patch, matches the event to a stored session (or creates one), and hands
//! the result to the [`Dispatcher`]. Matching order is fixed: a live PUSH
//! session for the subscriber always wins over the external-id lookup,
//! because gateways recycle external ids and a PUSH dialog in flight is the
//! stronger signal of what the subscriber is responding to.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use ussdhub_gateway_protocol::{StatusHint, UssdEvent};

use crate::contact::{ActorProvider, IdentityResolver};
use crate::flow::{FlowEngine, OutboundMessage};
use crate::msg::MessageSink;
use crate::session::dispatch::{DispatchMode, Dispatcher};
use crate::session::error::ReconcileResult;
use crate::session::lifecycle::SessionLifecycle;
use crate::session::model::{
    NewSession, Session, SessionDirection, SessionPatch, SessionStatus,
};
use crate::store::SessionStore;
use crate::trigger::TriggerLookup;
use crate::urn::TelUrn;

// ============================================================================
// Outcome
// ============================================================================

/// Result of [`SessionReconciler::handle_incoming`].
#[derive(Debug)]
pub struct HandleOutcome {
    /// The matched or created session; `None` when the event was dropped.
    pub session: Option<Session>,
    /// Flow replies; present only for synchronous dispatch.
    pub replies: Option<Vec<OutboundMessage>>,
}

impl HandleOutcome {
    /// The event was intentionally ignored: no session, no dispatch.
    pub fn dropped() -> Self {
        Self {
            session: None,
            replies: None,
        }
    }

    pub fn is_dropped(&self) -> bool {
        self.session.is_none()
    }
}

// ============================================================================
// Reconciler
// ============================================================================

/// Matches gateway events to sessions and drives dispatch.
pub struct SessionReconciler {
    store: Arc<dyn SessionStore>,
    identity: Arc<dyn IdentityResolver>,
    triggers: Arc<dyn TriggerLookup>,
    actors: Arc<dyn ActorProvider>,
    lifecycle: SessionLifecycle,
    dispatcher: Dispatcher,
}

impl SessionReconciler {
    pub fn new(
        store: Arc<dyn SessionStore>,
        identity: Arc<dyn IdentityResolver>,
        triggers: Arc<dyn TriggerLookup>,
        flows: Arc<dyn FlowEngine>,
        msgs: Arc<dyn MessageSink>,
        actors: Arc<dyn ActorProvider>,
    ) -> Self {
        Self {
            lifecycle: SessionLifecycle::new(Arc::clone(&store)),
            dispatcher: Dispatcher::new(flows, msgs),
            store,
            identity,
            triggers,
            actors,
        }
    }

    /// Reconcile one inbound event against the session store and dispatch it.
    ///
    /// Returns a dropped outcome in exactly two cases: a trigger event whose
    /// service code matches no trigger, and a synchronous content event that
    /// matches no live session. Everything else either resumes an existing
    /// session or creates one.
    pub async fn handle_incoming(
        &self,
        event: UssdEvent,
        mode: DispatchMode,
    ) -> ReconcileResult<HandleOutcome> {
        let urn = TelUrn::from_raw(&event.subscriber)?;
        let org = event.org.clone().or_else(|| event.channel.org.clone());
        let creator = event
            .channel
            .created_by
            .clone()
            .unwrap_or_else(|| self.actors.system_actor());

        let (subscriber, binding) = match &event.contact {
            Some(contact) => {
                let binding = self
                    .identity
                    .get_or_create_address_binding(org.as_deref(), contact, &urn, &event.channel.id)
                    .await?;
                (contact.clone(), binding)
            }
            None => {
                let resolved = self
                    .identity
                    .resolve_or_create_subscriber(org.as_deref(), &creator, &urn, &event.channel.id)
                    .await?;
                (resolved.id, resolved.binding)
            }
        };
        self.identity
            .update_channel_affinity(&binding, &event.channel.id)
            .await?;

        // Translate the hint before touching the store: a trigger event with
        // no matching trigger never creates or resumes anything.
        let mut trigger = None;
        let patch = match event.status {
            Some(StatusHint::Triggered) => {
                trigger = self
                    .triggers
                    .find_trigger_for_ussd(&subscriber, event.starcode.as_deref())
                    .await?;
                if trigger.is_none() {
                    debug!(
                        external_id = %event.external_id,
                        subscriber = %subscriber,
                        starcode = event.starcode.as_deref().unwrap_or(""),
                        "no matching trigger, dropping event"
                    );
                    return Ok(HandleOutcome::dropped());
                }
                SessionPatch {
                    status: Some(SessionStatus::Triggered),
                    started_on: Some(event.timestamp),
                    ..Default::default()
                }
            }
            Some(StatusHint::Interrupted) => SessionPatch {
                status: Some(SessionStatus::Interrupted),
                ended_on: Some(event.timestamp),
                ..Default::default()
            },
            None => SessionPatch {
                status: Some(SessionStatus::InProgress),
                ..Default::default()
            },
        };

        let push_session = self.store.find_active_push_session(&subscriber).await?;

        let (session, created) = match push_session {
            Some(mut session) => {
                // A live push dialog absorbs the event and takes over the
                // gateway's external id for the rest of its life.
                self.apply_and_save(&mut session, &patch.with_external_id(&event.external_id))
                    .await?;
                debug!(
                    session_id = %session.id,
                    external_id = %event.external_id,
                    "resumed push session"
                );
                (session, false)
            }
            None => {
                // Concurrent events for one external id serialize here. The
                // guard covers match-and-patch only, never dispatch.
                let _row = self.store.lock_external_id(&event.external_id).await?;

                match self
                    .store
                    .find_active_by_external_id(&event.external_id)
                    .await?
                {
                    Some(mut session) => {
                        self.apply_and_save(&mut session, &patch).await?;
                        debug!(
                            session_id = %session.id,
                            external_id = %event.external_id,
                            "resumed session"
                        );
                        (session, false)
                    }
                    None if mode == DispatchMode::Sync && trigger.is_none() => {
                        // External ids get recycled; bare content that matches
                        // nothing must not conjure a session in a mode where
                        // the gateway expects an immediate answer.
                        debug!(
                            external_id = %event.external_id,
                            "no live session for content event, dropping"
                        );
                        return Ok(HandleOutcome::dropped());
                    }
                    None => {
                        let session = self
                            .store
                            .create(NewSession {
                                external_id: event.external_id.clone(),
                                subscriber: subscriber.clone(),
                                address: urn.clone(),
                                binding: Some(binding.id.clone()),
                                channel: event.channel.id.clone(),
                                org: org.clone(),
                                direction: SessionDirection::Pull,
                                status: patch.status.unwrap_or(SessionStatus::InProgress),
                                started_on: patch.started_on,
                                ended_on: patch.ended_on,
                                actor: event.channel.created_by.clone(),
                            })
                            .await?;
                        info!(
                            session_id = %session.id,
                            external_id = %event.external_id,
                            subscriber = %subscriber,
                            "created session"
                        );
                        (session, true)
                    }
                }
            }
        };

        let replies = if created && let Some(trigger) = trigger {
            self.dispatcher
                .start(
                    &session,
                    trigger.flow,
                    event.content,
                    event.timestamp,
                    event.message_id,
                    mode,
                )
                .await?
        } else {
            self.dispatcher
                .resume(&session, event.content, event.timestamp, event.message_id, mode)
                .await?
        };

        Ok(HandleOutcome {
            session: Some(session),
            replies,
        })
    }

    /// Close the session the gateway knows by `external_id`, then give the
    /// flow engine one empty-content step to notice the termination.
    ///
    /// Returns `Ok(None)` when no live session carries that id, which covers
    /// both unknown ids and interrupts arriving after the close.
    pub async fn handle_interrupt(
        &self,
        external_id: &str,
        mode: DispatchMode,
    ) -> ReconcileResult<Option<Session>> {
        let Some(mut session) = self.store.find_active_by_external_id(external_id).await? else {
            debug!(external_id, "no live session for interrupt");
            return Ok(None);
        };

        self.lifecycle.close(&mut session).await?;
        self.dispatcher
            .resume(&session, None, Utc::now(), None, mode)
            .await?;
        Ok(Some(session))
    }

    async fn apply_and_save(
        &self,
        session: &mut Session,
        patch: &SessionPatch,
    ) -> ReconcileResult<()> {
        let previous = session.status;
        let changed = patch.apply(session);
        if previous != session.status && !previous.can_transition(session.status) {
            warn!(
                session_id = %session.id,
                from = %previous,
                to = %session.status,
                "gateway event forced an unusual status transition"
            );
        }
        self.store.save(session, &changed).await?;
        Ok(())
    }
}

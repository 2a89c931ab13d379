//! Common test utilities.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use ussdhub::contact::{MemoryIdentityResolver, StaticActorProvider};
use ussdhub::flow::{FlowContinuation, FlowEngine, FlowError, FlowRef, FlowStart, OutboundMessage};
use ussdhub::msg::{MemoryMessageSink, MessageRef};
use ussdhub::session::{NewSession, Session, SessionDirection, SessionField, SessionReconciler, SessionStatus};
use ussdhub::store::{MemorySessionStore, SessionStore, StoreResult};
use ussdhub::sync::RowGuard;
use ussdhub::trigger::StaticTriggerLookup;
use ussdhub::urn::TelUrn;
use ussdhub_gateway_protocol::{ChannelRef, StatusHint, UssdEvent};

pub const STARCODE: &str = "*123#";
pub const CHANNEL: &str = "mtn-ug";

// ============================================================================
// Recording flow engine
// ============================================================================

/// Flow engine that records every call and answers from a fixed script.
pub struct RecordingFlowEngine {
    handled: bool,
    starts: Mutex<Vec<FlowStart>>,
    continues: Mutex<Vec<MessageRef>>,
}

impl RecordingFlowEngine {
    pub fn new() -> Self {
        Self {
            handled: true,
            starts: Mutex::new(Vec::new()),
            continues: Mutex::new(Vec::new()),
        }
    }

    /// An engine whose active runs never consume messages.
    pub fn unhandled() -> Self {
        Self {
            handled: false,
            ..Self::new()
        }
    }

    pub fn starts(&self) -> Vec<FlowStart> {
        self.starts.lock().unwrap().clone()
    }

    pub fn continues(&self) -> Vec<MessageRef> {
        self.continues.lock().unwrap().clone()
    }
}

#[async_trait]
impl FlowEngine for RecordingFlowEngine {
    async fn start_flow(&self, start: FlowStart) -> Result<Vec<OutboundMessage>, FlowError> {
        self.starts.lock().unwrap().push(start);
        Ok(vec![OutboundMessage::new("Welcome.\n1. Balance")])
    }

    async fn continue_flow(&self, message: &MessageRef) -> Result<FlowContinuation, FlowError> {
        self.continues.lock().unwrap().push(message.clone());
        if self.handled {
            Ok(FlowContinuation {
                handled: true,
                replies: vec![OutboundMessage::new("Your balance is USh 25,000.")],
            })
        } else {
            Ok(FlowContinuation::unhandled())
        }
    }
}

// ============================================================================
// Counting store
// ============================================================================

/// Store wrapper that counts writes.
pub struct CountingStore {
    pub inner: Arc<MemorySessionStore>,
    pub creates: AtomicUsize,
    pub saves: AtomicUsize,
}

impl CountingStore {
    pub fn new(inner: Arc<MemorySessionStore>) -> Self {
        Self {
            inner,
            creates: AtomicUsize::new(0),
            saves: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SessionStore for CountingStore {
    async fn get(&self, id: &str) -> StoreResult<Option<Session>> {
        self.inner.get(id).await
    }

    async fn find_active_push_session(&self, subscriber: &str) -> StoreResult<Option<Session>> {
        self.inner.find_active_push_session(subscriber).await
    }

    async fn find_active_by_external_id(&self, external_id: &str) -> StoreResult<Option<Session>> {
        self.inner.find_active_by_external_id(external_id).await
    }

    async fn lock_external_id(&self, external_id: &str) -> StoreResult<RowGuard> {
        self.inner.lock_external_id(external_id).await
    }

    async fn create(&self, new: NewSession) -> StoreResult<Session> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.inner.create(new).await
    }

    async fn save(&self, session: &mut Session, changed: &[SessionField]) -> StoreResult<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(session, changed).await
    }

    async fn list(&self) -> StoreResult<Vec<String>> {
        self.inner.list().await
    }
}

// ============================================================================
// Wiring
// ============================================================================

pub struct Harness {
    pub store: Arc<MemorySessionStore>,
    pub engine: Arc<RecordingFlowEngine>,
    pub sink: Arc<MemoryMessageSink>,
    pub reconciler: SessionReconciler,
}

/// Reconciler over an in-memory store with one trigger for [`STARCODE`].
pub fn wired() -> Harness {
    wired_with(RecordingFlowEngine::new())
}

pub fn wired_with(engine: RecordingFlowEngine) -> Harness {
    let actors = Arc::new(StaticActorProvider::new("system"));
    let store = Arc::new(
        MemorySessionStore::new(actors.clone()).with_lock_wait(Duration::from_secs(1)),
    );
    let engine = Arc::new(engine);
    let sink = Arc::new(MemoryMessageSink::new());
    let reconciler = SessionReconciler::new(
        store.clone(),
        Arc::new(MemoryIdentityResolver::new()),
        Arc::new(StaticTriggerLookup::new().with_trigger(STARCODE, FlowRef::named("account_menu"))),
        engine.clone(),
        sink.clone(),
        actors,
    );

    Harness {
        store,
        engine,
        sink,
        reconciler,
    }
}

// ============================================================================
// Events
// ============================================================================

pub fn channel() -> ChannelRef {
    ChannelRef::new(CHANNEL)
}

pub fn trigger_event(subscriber: &str, external_id: &str) -> UssdEvent {
    UssdEvent::new(channel(), subscriber, external_id)
        .with_status(StatusHint::Triggered)
        .with_starcode(STARCODE)
        .with_content(STARCODE)
}

pub fn content_event(subscriber: &str, external_id: &str, content: &str) -> UssdEvent {
    UssdEvent::new(channel(), subscriber, external_id).with_content(content)
}

pub fn interrupt_event(subscriber: &str, external_id: &str) -> UssdEvent {
    UssdEvent::new(channel(), subscriber, external_id).with_status(StatusHint::Interrupted)
}

/// A content event whose subscriber identity is already resolved.
pub fn contact_event(contact: &str, subscriber: &str, external_id: &str, content: &str) -> UssdEvent {
    let mut event = content_event(subscriber, external_id, content);
    event.contact = Some(contact.to_string());
    event
}

// ============================================================================
// Store seeding
// ============================================================================

/// Insert a live push session, the kind flow starts create out-of-band.
pub async fn seed_push_session(
    store: &MemorySessionStore,
    subscriber: &str,
    address: &str,
    external_id: &str,
) -> Session {
    store
        .create(NewSession {
            external_id: external_id.to_string(),
            subscriber: subscriber.to_string(),
            address: TelUrn::from_raw(address).unwrap(),
            binding: None,
            channel: CHANNEL.to_string(),
            org: None,
            direction: SessionDirection::Push,
            status: SessionStatus::InProgress,
            started_on: None,
            ended_on: None,
            actor: None,
        })
        .await
        .unwrap()
}

// ============================================================================
// Async assertions
// ============================================================================

/// Poll `predicate` until it holds or the test deadline passes.
pub async fn wait_until(mut predicate: impl FnMut() -> bool) {
    for _ in 0..400 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition never became true");
}

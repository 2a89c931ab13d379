//! End-to-end reconciliation scenarios over an in-memory store.

mod common;

use std::sync::Arc;

use chrono::Utc;

use ussdhub::contact::{MemoryIdentityResolver, StaticActorProvider};
use ussdhub::flow::FlowRef;
use ussdhub::msg::MemoryMessageSink;
use ussdhub::session::{
    DispatchMode, SessionDirection, SessionLifecycle, SessionReconciler, SessionStatus,
};
use ussdhub::store::{MemorySessionStore, SessionStore};
use ussdhub::trigger::StaticTriggerLookup;
use ussdhub_gateway_protocol::ChannelRef;

use common::{
    CountingStore, RecordingFlowEngine, STARCODE, contact_event, content_event, interrupt_event,
    seed_push_session, trigger_event, wait_until, wired, wired_with,
};

const ALICE: &str = "+256701000001";
const BOB: &str = "+256702000002";

// ============================================================================
// Create
// ============================================================================

#[tokio::test]
async fn trigger_creates_session_and_starts_flow() {
    let h = wired();
    let now = Utc::now();

    let outcome = h
        .reconciler
        .handle_incoming(
            trigger_event(ALICE, "gw-1").with_timestamp(now),
            DispatchMode::Sync,
        )
        .await
        .unwrap();

    let session = outcome.session.expect("session should be created");
    assert_eq!(session.status, SessionStatus::Triggered);
    assert_eq!(session.direction, SessionDirection::Pull);
    assert_eq!(session.external_id, "gw-1");
    assert_eq!(session.started_on, Some(now));
    assert_eq!(session.created_by, "system");

    let replies = outcome.replies.expect("sync dispatch returns replies");
    assert_eq!(replies[0].text, "Welcome.\n1. Balance");

    let starts = h.engine.starts();
    assert_eq!(starts.len(), 1);
    assert_eq!(starts[0].flow.name, "account_menu");
    assert_eq!(starts[0].session_id, session.id);
    assert_eq!(starts[0].subscribers, vec![session.subscriber.clone()]);
    assert!(starts[0].restart_participants);
    assert_eq!(starts[0].opening_message.content, STARCODE);

    assert!(h.store.get(&session.id).await.unwrap().is_some());
}

#[tokio::test]
async fn trigger_without_matching_trigger_drops() {
    let h = wired();

    let mut event = trigger_event(ALICE, "gw-1");
    event.starcode = Some("*999#".to_string());
    event.content = Some("*999#".to_string());

    let outcome = h
        .reconciler
        .handle_incoming(event, DispatchMode::Sync)
        .await
        .unwrap();

    assert!(outcome.is_dropped());
    assert!(h.store.list().await.unwrap().is_empty());
    assert!(h.engine.starts().is_empty());
    assert!(h.sink.recorded().is_empty());
}

#[tokio::test]
async fn async_trigger_creates_and_spawns_flow_start() {
    let h = wired();

    let outcome = h
        .reconciler
        .handle_incoming(trigger_event(ALICE, "gw-1"), DispatchMode::Async)
        .await
        .unwrap();

    let session = outcome.session.expect("session should be created");
    assert_eq!(session.status, SessionStatus::Triggered);
    assert!(outcome.replies.is_none());

    let engine = h.engine.clone();
    wait_until(move || engine.starts().len() == 1).await;
    assert_eq!(h.engine.starts()[0].flow.name, "account_menu");
    assert_eq!(h.engine.starts()[0].session_id, session.id);
}

#[tokio::test]
async fn async_content_with_no_session_creates() {
    let h = wired();

    let outcome = h
        .reconciler
        .handle_incoming(content_event(ALICE, "gw-9", "1"), DispatchMode::Async)
        .await
        .unwrap();

    let session = outcome.session.expect("async mode creates on no match");
    assert_eq!(session.status, SessionStatus::InProgress);
    assert_eq!(session.direction, SessionDirection::Pull);
    assert!(outcome.replies.is_none());

    let engine = h.engine.clone();
    wait_until(move || engine.continues().len() == 1).await;
}

#[tokio::test]
async fn async_interrupt_hint_without_match_records_closed_session() {
    let h = wired();
    let now = Utc::now();

    let outcome = h
        .reconciler
        .handle_incoming(
            interrupt_event(ALICE, "gw-2").with_timestamp(now),
            DispatchMode::Async,
        )
        .await
        .unwrap();

    let session = outcome.session.expect("async mode creates on no match");
    assert_eq!(session.status, SessionStatus::Interrupted);
    assert_eq!(session.ended_on, Some(now));
    assert!(session.is_terminal());
}

// ============================================================================
// Resume
// ============================================================================

#[tokio::test]
async fn content_event_resumes_by_external_id() {
    let h = wired();

    let opened = h
        .reconciler
        .handle_incoming(trigger_event(ALICE, "gw-1"), DispatchMode::Sync)
        .await
        .unwrap();
    let session = opened.session.unwrap();

    let outcome = h
        .reconciler
        .handle_incoming(content_event(ALICE, "gw-1", "1"), DispatchMode::Sync)
        .await
        .unwrap();

    let resumed = outcome.session.unwrap();
    assert_eq!(resumed.id, session.id);
    assert_eq!(resumed.status, SessionStatus::InProgress);

    let replies = outcome.replies.unwrap();
    assert_eq!(replies[0].text, "Your balance is USh 25,000.");

    let continues = h.engine.continues();
    assert_eq!(continues.len(), 1);
    assert_eq!(continues[0].content, "1");
    assert!(h.sink.is_handled(&continues[0].id));

    // One session row end to end
    assert_eq!(h.store.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn sync_content_with_no_session_drops() {
    let h = wired();

    let outcome = h
        .reconciler
        .handle_incoming(content_event(ALICE, "gw-ghost", "1"), DispatchMode::Sync)
        .await
        .unwrap();

    assert!(outcome.is_dropped());
    assert!(outcome.replies.is_none());
    assert!(h.store.list().await.unwrap().is_empty());
    assert!(h.sink.recorded().is_empty());
}

#[tokio::test]
async fn unhandled_continuation_leaves_message_unmarked() {
    let h = wired_with(RecordingFlowEngine::unhandled());

    h.reconciler
        .handle_incoming(trigger_event(ALICE, "gw-1"), DispatchMode::Sync)
        .await
        .unwrap();
    let outcome = h
        .reconciler
        .handle_incoming(content_event(ALICE, "gw-1", "1"), DispatchMode::Sync)
        .await
        .unwrap();

    assert_eq!(outcome.replies.unwrap().len(), 0);
    let continues = h.engine.continues();
    assert!(!h.sink.is_handled(&continues[0].id));
}

#[tokio::test]
async fn resume_keeps_creation_channel() {
    let h = wired();

    let opened = h
        .reconciler
        .handle_incoming(trigger_event(ALICE, "gw-1"), DispatchMode::Sync)
        .await
        .unwrap();
    let session = opened.session.unwrap();

    let mut roamed = content_event(ALICE, "gw-1", "1");
    roamed.channel = ChannelRef::new("airtel-ug");
    h.reconciler
        .handle_incoming(roamed, DispatchMode::Sync)
        .await
        .unwrap();

    let stored = h.store.get(&session.id).await.unwrap().unwrap();
    assert_eq!(stored.channel, common::CHANNEL);
    assert_eq!(stored.direction, SessionDirection::Pull);
}

#[tokio::test]
async fn interrupt_hinted_event_closes_matched_session() {
    let h = wired();
    let now = Utc::now();

    let opened = h
        .reconciler
        .handle_incoming(trigger_event(ALICE, "gw-1"), DispatchMode::Sync)
        .await
        .unwrap();
    let session = opened.session.unwrap();

    let outcome = h
        .reconciler
        .handle_incoming(
            interrupt_event(ALICE, "gw-1").with_timestamp(now),
            DispatchMode::Sync,
        )
        .await
        .unwrap();

    let closed = outcome.session.unwrap();
    assert_eq!(closed.id, session.id);
    assert_eq!(closed.status, SessionStatus::Interrupted);
    assert_eq!(closed.ended_on, Some(now));

    // The terminated dialog still gets its final flow step
    assert_eq!(h.engine.continues().len(), 1);
}

// ============================================================================
// Push precedence
// ============================================================================

#[tokio::test]
async fn push_session_absorbs_content_event() {
    let h = wired();
    let push = seed_push_session(&h.store, "sub_push_a", ALICE, "push-0").await;

    let outcome = h
        .reconciler
        .handle_incoming(
            contact_event("sub_push_a", ALICE, "carrier-7", "1"),
            DispatchMode::Sync,
        )
        .await
        .unwrap();

    let session = outcome.session.unwrap();
    assert_eq!(session.id, push.id);

    // The push session takes over the gateway's external id
    let stored = h.store.get(&push.id).await.unwrap().unwrap();
    assert_eq!(stored.external_id, "carrier-7");

    assert_eq!(h.engine.continues().len(), 1);
    assert_eq!(h.store.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn push_session_wins_over_external_id_match() {
    let h = wired();

    // Bob's pull dialog owns the external id
    let bobs = h
        .reconciler
        .handle_incoming(trigger_event(BOB, "shared-1"), DispatchMode::Sync)
        .await
        .unwrap()
        .session
        .unwrap();

    // Alice has a live push dialog
    let push = seed_push_session(&h.store, "sub_push_a", ALICE, "push-0").await;

    let outcome = h
        .reconciler
        .handle_incoming(
            contact_event("sub_push_a", ALICE, "shared-1", "1"),
            DispatchMode::Sync,
        )
        .await
        .unwrap();

    assert_eq!(outcome.session.unwrap().id, push.id);

    // Bob's session is untouched
    let stored = h.store.get(&bobs.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SessionStatus::Triggered);
}

// ============================================================================
// Terminal rows
// ============================================================================

#[tokio::test]
async fn reused_external_id_after_close_creates_fresh_session() {
    let h = wired();

    let first = h
        .reconciler
        .handle_incoming(trigger_event(ALICE, "gw-1"), DispatchMode::Sync)
        .await
        .unwrap()
        .session
        .unwrap();
    h.reconciler
        .handle_interrupt("gw-1", DispatchMode::Sync)
        .await
        .unwrap();

    let second = h
        .reconciler
        .handle_incoming(trigger_event(ALICE, "gw-1"), DispatchMode::Sync)
        .await
        .unwrap()
        .session
        .unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(second.status, SessionStatus::Triggered);
    assert_eq!(h.store.list().await.unwrap().len(), 2);

    let old = h.store.get(&first.id).await.unwrap().unwrap();
    assert!(old.is_terminal());
}

// ============================================================================
// Interrupt
// ============================================================================

#[tokio::test]
async fn interrupt_unknown_external_id_is_none() {
    let h = wired();

    let closed = h
        .reconciler
        .handle_interrupt("ghost", DispatchMode::Sync)
        .await
        .unwrap();

    assert!(closed.is_none());
    assert!(h.engine.continues().is_empty());
}

#[tokio::test]
async fn interrupt_closes_and_dispatches_empty_step() {
    let h = wired();

    h.reconciler
        .handle_incoming(trigger_event(ALICE, "gw-1"), DispatchMode::Sync)
        .await
        .unwrap();

    let closed = h
        .reconciler
        .handle_interrupt("gw-1", DispatchMode::Sync)
        .await
        .unwrap()
        .expect("live session should close");

    assert_eq!(closed.status, SessionStatus::Interrupted);
    assert!(closed.ended_on.is_some());

    let continues = h.engine.continues();
    assert_eq!(continues.len(), 1);
    assert_eq!(continues[0].content, "");

    // Second interrupt finds nothing
    let again = h
        .reconciler
        .handle_interrupt("gw-1", DispatchMode::Sync)
        .await
        .unwrap();
    assert!(again.is_none());
}

#[tokio::test]
async fn interrupt_after_ending_completes() {
    let h = wired();

    let session = h
        .reconciler
        .handle_incoming(trigger_event(ALICE, "gw-1"), DispatchMode::Sync)
        .await
        .unwrap()
        .session
        .unwrap();

    // The flow reached its final screen and asked to end
    let lifecycle = SessionLifecycle::new(h.store.clone());
    let mut current = h.store.get(&session.id).await.unwrap().unwrap();
    lifecycle.mark_ending(&mut current).await.unwrap();

    let closed = h
        .reconciler
        .handle_interrupt("gw-1", DispatchMode::Sync)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(closed.status, SessionStatus::Completed);
}

// ============================================================================
// Concurrency & write discipline
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicate_events_create_one_session() {
    let h = Arc::new(wired());

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let h = h.clone();
        tasks.push(tokio::spawn(async move {
            h.reconciler
                .handle_incoming(content_event(ALICE, "dup-1", "1"), DispatchMode::Async)
                .await
                .unwrap()
        }));
    }
    for task in tasks {
        let outcome = task.await.unwrap();
        assert!(!outcome.is_dropped());
    }

    assert_eq!(h.store.list().await.unwrap().len(), 1);
    assert_eq!(h.sink.recorded().len(), 8);
}

#[tokio::test]
async fn reconciliation_writes_are_minimal() {
    let actors = Arc::new(StaticActorProvider::new("system"));
    let counting = Arc::new(CountingStore::new(Arc::new(MemorySessionStore::new(
        actors.clone(),
    ))));
    let reconciler = SessionReconciler::new(
        counting.clone(),
        Arc::new(MemoryIdentityResolver::new()),
        Arc::new(StaticTriggerLookup::new().with_trigger(STARCODE, FlowRef::named("account_menu"))),
        Arc::new(RecordingFlowEngine::new()),
        Arc::new(MemoryMessageSink::new()),
        actors,
    );

    reconciler
        .handle_incoming(trigger_event(ALICE, "gw-1"), DispatchMode::Sync)
        .await
        .unwrap();
    reconciler
        .handle_incoming(content_event(ALICE, "gw-1", "1"), DispatchMode::Sync)
        .await
        .unwrap();
    reconciler
        .handle_interrupt("gw-1", DispatchMode::Sync)
        .await
        .unwrap();

    use std::sync::atomic::Ordering;
    assert_eq!(counting.creates.load(Ordering::SeqCst), 1);
    // One save for the resume patch, one for the close
    assert_eq!(counting.saves.load(Ordering::SeqCst), 2);
}

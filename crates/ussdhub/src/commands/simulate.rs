//! Scripted dialog replay.
//!
//! Wires a complete engine with an in-process flow engine whose replies
//! come from the config's simulator script, then replays one dialog end to
//! end: dial the service code, feed each input, and close the session the
//! way a gateway would.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, bail};
use async_trait::async_trait;
use tracing::info;

use ussdhub::config::{self, Config, SimulatorStep};
use ussdhub::contact::{MemoryIdentityResolver, StaticActorProvider};
use ussdhub::flow::{FlowContinuation, FlowEngine, FlowError, FlowRef, FlowStart, OutboundMessage};
use ussdhub::msg::{MemoryMessageSink, MessageRef};
use ussdhub::session::{DispatchMode, HandleOutcome, SessionLifecycle, SessionReconciler};
use ussdhub::store::{FileSessionStore, MemorySessionStore, SessionStore};
use ussdhub::trigger::StaticTriggerLookup;
use ussdhub_gateway_protocol::{ChannelRef, StatusHint, UssdEvent};

// ============================================================================
// Scripted Flow Engine
// ============================================================================

/// Flow engine that answers from the simulator script.
///
/// The opening screen comes from `menu`; each subsequent input consumes the
/// next step. A step marked `end` asks the lifecycle to end the session
/// gracefully, which is exactly what a real flow engine does when a run
/// reaches its last screen.
struct ScriptedFlowEngine {
    menu: String,
    steps: Vec<SimulatorStep>,
    cursor: AtomicUsize,
    store: Arc<dyn SessionStore>,
    lifecycle: SessionLifecycle,
}

#[async_trait]
impl FlowEngine for ScriptedFlowEngine {
    async fn start_flow(&self, _start: FlowStart) -> Result<Vec<OutboundMessage>, FlowError> {
        Ok(vec![OutboundMessage::new(self.menu.clone())])
    }

    async fn continue_flow(&self, message: &MessageRef) -> Result<FlowContinuation, FlowError> {
        let idx = self.cursor.fetch_add(1, Ordering::SeqCst);
        let Some(step) = self.steps.get(idx) else {
            return Ok(FlowContinuation::unhandled());
        };

        if step.end {
            let session = self
                .store
                .get(&message.session_id)
                .await
                .map_err(|e| FlowError::execution(e.to_string()))?;
            let Some(mut session) = session else {
                return Err(FlowError::execution(format!(
                    "session {} vanished mid-run",
                    message.session_id
                )));
            };
            self.lifecycle
                .mark_ending(&mut session)
                .await
                .map_err(|e| FlowError::execution(e.to_string()))?;
        }

        Ok(FlowContinuation {
            handled: true,
            replies: vec![OutboundMessage::new(step.reply.clone())],
        })
    }
}

// ============================================================================
// Command
// ============================================================================

pub async fn run(
    config_path: &str,
    dial: Option<&str>,
    inputs: Option<&str>,
    subscriber: Option<&str>,
    external_id: &str,
) -> Result<()> {
    let config = Config::load(config_path).await?;

    // CLI overrides config
    let starcode = dial.unwrap_or(&config.simulator.starcode).to_string();
    let subscriber = subscriber.unwrap_or(&config.simulator.subscriber).to_string();
    let inputs: Vec<String> = inputs
        .map(|raw| {
            raw.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let actors = Arc::new(StaticActorProvider::new(config.actor.system_actor.clone()));
    let store = open_store(config_path, &config, actors.clone());
    let lifecycle = SessionLifecycle::new(store.clone());

    let engine = Arc::new(ScriptedFlowEngine {
        menu: config.simulator.menu.clone(),
        steps: config.simulator.steps.clone(),
        cursor: AtomicUsize::new(0),
        store: store.clone(),
        lifecycle: lifecycle.clone(),
    });
    let reconciler = SessionReconciler::new(
        store.clone(),
        Arc::new(MemoryIdentityResolver::new()),
        Arc::new(
            StaticTriggerLookup::new()
                .with_trigger(starcode.clone(), FlowRef::named(config.simulator.flow.clone())),
        ),
        engine,
        Arc::new(MemoryMessageSink::new()),
        actors,
    );

    let channel = ChannelRef::new(config.simulator.channel.clone());

    // Dial in
    info!(starcode = %starcode, subscriber = %subscriber, "dialing");
    let outcome = reconciler
        .handle_incoming(
            UssdEvent::new(channel.clone(), subscriber.clone(), external_id)
                .with_status(StatusHint::Triggered)
                .with_starcode(starcode.clone())
                .with_content(starcode.clone()),
            DispatchMode::Sync,
        )
        .await?;
    print_replies(&outcome);
    let Some(session) = outcome.session else {
        bail!("dial dropped: no trigger configured for {starcode}");
    };
    info!(session_id = %session.id, "session opened");

    // Feed each input
    for input in &inputs {
        let outcome = reconciler
            .handle_incoming(
                UssdEvent::new(channel.clone(), subscriber.clone(), external_id)
                    .with_content(input.clone()),
                DispatchMode::Sync,
            )
            .await?;
        print_replies(&outcome);
        if outcome.is_dropped() {
            info!("dialog is gone, stopping input replay");
            break;
        }

        let Some(mut current) = store.get(&session.id).await? else {
            break;
        };
        if current.should_end() {
            // A real gateway tears the dialog down after the final screen
            lifecycle.close(&mut current).await?;
            info!(session_id = %current.id, status = %current.status, "dialog finished");
            return Ok(());
        }
    }

    // Inputs ran out with the dialog still open; that is a carrier timeout
    if let Some(closed) = reconciler
        .handle_interrupt(external_id, DispatchMode::Sync)
        .await?
    {
        info!(session_id = %closed.id, status = %closed.status, "dialog abandoned");
    }
    Ok(())
}

fn open_store(
    config_path: &str,
    config: &Config,
    actors: Arc<StaticActorProvider>,
) -> Arc<dyn SessionStore> {
    match &config.store.sessions_dir {
        Some(dir) => {
            let dir = config::resolve_path(Path::new(config_path), dir);
            Arc::new(FileSessionStore::new(dir, actors).with_lock_wait(config.reconciler.lock_wait()))
        }
        None => {
            Arc::new(MemorySessionStore::new(actors).with_lock_wait(config.reconciler.lock_wait()))
        }
    }
}

fn print_replies(outcome: &HandleOutcome) {
    if let Some(replies) = &outcome.replies {
        for reply in replies {
            println!("{}", reply.text);
        }
    }
}

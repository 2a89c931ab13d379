//! Subscriber identity collaborators.
//!
//! Identity resolution is external to the engine: the reconciler hands a
//! normalized address to an [`IdentityResolver`] and gets back a subscriber
//! and an address binding, creating both when the subscriber is new. The
//! engine never inspects identity internals beyond the returned ids.
//!
//! [`ActorProvider`] supplies the audit identity used when no authenticated
//! actor is behind a request (gateway callbacks, the simulator); it is
//! injected so tests can substitute their own.

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use ulid::Ulid;

use crate::urn::TelUrn;

// ============================================================================
// Types
// ============================================================================

/// A resolved subscriber, with the binding for the address that resolved it.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriberRef {
    /// Subscriber identifier.
    pub id: String,
    /// Binding for (subscriber, address).
    pub binding: AddressBinding,
}

/// The association between a subscriber and one of their addresses.
#[derive(Debug, Clone, PartialEq)]
pub struct AddressBinding {
    /// Binding identifier.
    pub id: String,
    /// Owning subscriber.
    pub subscriber: String,
    /// Bound address.
    pub urn: TelUrn,
    /// Channel this binding currently prefers, when affinity is tracked.
    pub channel: Option<String>,
}

// ============================================================================
// Errors
// ============================================================================

/// Errors raised by identity collaborators.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The identity backend could not be reached.
    #[error("identity backend unavailable: {0}")]
    Unavailable(String),

    /// Affinity update referenced a binding the backend does not know.
    #[error("unknown address binding: {id}")]
    UnknownBinding { id: String },
}

impl IdentityError {
    /// Create an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Create an unknown-binding error.
    pub fn unknown_binding(id: impl Into<String>) -> Self {
        Self::UnknownBinding { id: id.into() }
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Resolves subscriber identity and keeps channel affinity current.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Resolve the subscriber owning `urn`, creating one when none exists.
    ///
    /// Idempotent; `creator` is the audit actor for any records created.
    async fn resolve_or_create_subscriber(
        &self,
        org: Option<&str>,
        creator: &str,
        urn: &TelUrn,
        channel: &str,
    ) -> Result<SubscriberRef, IdentityError>;

    /// Fetch or create the binding between a known subscriber and `urn`.
    async fn get_or_create_address_binding(
        &self,
        org: Option<&str>,
        subscriber: &str,
        urn: &TelUrn,
        channel: &str,
    ) -> Result<AddressBinding, IdentityError>;

    /// Record that the binding was last seen on `channel`.
    async fn update_channel_affinity(
        &self,
        binding: &AddressBinding,
        channel: &str,
    ) -> Result<(), IdentityError>;
}

/// Supplies the audit identity used when no authenticated actor exists.
pub trait ActorProvider: Send + Sync {
    /// Name of the system actor for audit columns.
    fn system_actor(&self) -> String;
}

/// Fixed-name [`ActorProvider`].
pub struct StaticActorProvider {
    name: String,
}

impl StaticActorProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl ActorProvider for StaticActorProvider {
    fn system_actor(&self) -> String {
        self.name.clone()
    }
}

// ============================================================================
// In-memory reference implementation
// ============================================================================

/// In-memory [`IdentityResolver`] for tests and the simulator.
///
/// Keys subscribers by normalized address, the way a real backend keys
/// contacts by URN.
#[derive(Default)]
pub struct MemoryIdentityResolver {
    /// Normalized address -> subscriber id.
    subscribers: DashMap<String, String>,
    /// (subscriber id, normalized address) -> binding.
    bindings: DashMap<(String, String), AddressBinding>,
}

impl MemoryIdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preferred channel currently recorded for a binding id, if any.
    pub fn affinity(&self, binding_id: &str) -> Option<String> {
        self.bindings
            .iter()
            .find(|entry| entry.value().id == binding_id)
            .and_then(|entry| entry.value().channel.clone())
    }
}

#[async_trait]
impl IdentityResolver for MemoryIdentityResolver {
    async fn resolve_or_create_subscriber(
        &self,
        org: Option<&str>,
        _creator: &str,
        urn: &TelUrn,
        channel: &str,
    ) -> Result<SubscriberRef, IdentityError> {
        let id = self
            .subscribers
            .entry(urn.as_str().to_string())
            .or_insert_with(|| format!("sub_{}", Ulid::new()))
            .clone();

        let binding = self
            .get_or_create_address_binding(org, &id, urn, channel)
            .await?;

        Ok(SubscriberRef { id, binding })
    }

    async fn get_or_create_address_binding(
        &self,
        _org: Option<&str>,
        subscriber: &str,
        urn: &TelUrn,
        channel: &str,
    ) -> Result<AddressBinding, IdentityError> {
        let key = (subscriber.to_string(), urn.as_str().to_string());
        let binding = self
            .bindings
            .entry(key)
            .or_insert_with(|| AddressBinding {
                id: format!("bind_{}", Ulid::new()),
                subscriber: subscriber.to_string(),
                urn: urn.clone(),
                channel: Some(channel.to_string()),
            })
            .clone();

        Ok(binding)
    }

    async fn update_channel_affinity(
        &self,
        binding: &AddressBinding,
        channel: &str,
    ) -> Result<(), IdentityError> {
        let key = (binding.subscriber.clone(), binding.urn.as_str().to_string());
        let Some(mut stored) = self.bindings.get_mut(&key) else {
            return Err(IdentityError::unknown_binding(&binding.id));
        };
        stored.channel = Some(channel.to_string());
        Ok(())
    }
}

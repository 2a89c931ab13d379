//! Wire contract between USSD gateway adapters and the ussdhub session engine.
//!
//! Gateway adapters (HTTP, SMPP, vendor SDKs) translate the aggregator's
//! notion of a USSD dialog into [`UssdEvent`] values and hand them to the
//! engine's reconciler. Adapters may run in-process or emit events as JSON
//! Lines over a pipe; everything here serializes with serde for that reason.
//!
//! # Event model
//!
//! A USSD dialog reaches the engine as a sequence of discrete events, all
//! carrying the gateway's `external_id` for the dialog:
//!
//! - a **trigger** event (`status: triggered`, `starcode` set) when the
//!   subscriber dials a service code;
//! - zero or more **content** events (no status hint) as the subscriber
//!   replies to menus;
//! - optionally an **interrupt** event (`status: interrupted`) when the
//!   carrier tears the dialog down.
//!
//! External ids are assigned by the gateway and are reused across dialogs,
//! so they identify an event's dialog only as a hint; the engine owns the
//! actual correlation.
//!
//! # Example: emitting an event
//!
//! ```ignore
//! use ussdhub_gateway_protocol::{ChannelRef, StatusHint, UssdEvent};
//!
//! let event = UssdEvent::new(ChannelRef::new("chn_mtn_ug"), "+256701234567", "4879")
//!     .with_status(StatusHint::Triggered)
//!     .with_starcode("*123#");
//! let wire = serde_json::to_string(&event)?;
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Events (Gateway → Engine)
// ============================================================================

/// A single inbound USSD gateway event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UssdEvent {
    /// Channel the event arrived on.
    pub channel: ChannelRef,

    /// Raw subscriber address as supplied by the gateway (MSISDN or
    /// shortcode); the engine normalizes it.
    pub subscriber: String,

    /// Gateway timestamp for the event.
    pub timestamp: DateTime<Utc>,

    /// Gateway's identifier for the dialog. Reusable; a hint, not a key.
    pub external_id: String,

    /// Optional pre-resolved contact id, when the adapter already knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,

    /// Gateway's identifier for this specific inbound message, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    /// Dialog-state hint from the gateway. Absent for plain content events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusHint>,

    /// Text the subscriber entered, when the event carries any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Service code the subscriber dialed (`*123#`). Set on trigger events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starcode: Option<String>,

    /// Org override; defaults to the channel's org when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,

    /// Additional gateway-specific fields (carrier codes, cell ids, ...).
    #[serde(flatten, default)]
    pub extra: HashMap<String, String>,
}

impl UssdEvent {
    /// Create a minimal content-less event; fill in the rest with the
    /// `with_` builders.
    pub fn new(
        channel: ChannelRef,
        subscriber: impl Into<String>,
        external_id: impl Into<String>,
    ) -> Self {
        Self {
            channel,
            subscriber: subscriber.into(),
            timestamp: Utc::now(),
            external_id: external_id.into(),
            contact: None,
            message_id: None,
            status: None,
            content: None,
            starcode: None,
            org: None,
            extra: HashMap::new(),
        }
    }

    pub fn with_status(mut self, status: StatusHint) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_starcode(mut self, starcode: impl Into<String>) -> Self {
        self.starcode = Some(starcode.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    /// True when the gateway flagged this event as opening a dialog.
    pub fn is_trigger(&self) -> bool {
        matches!(self.status, Some(StatusHint::Triggered))
    }

    /// True when the gateway flagged this event as tearing a dialog down.
    pub fn is_interrupt(&self) -> bool {
        matches!(self.status, Some(StatusHint::Interrupted))
    }
}

/// Dialog-state hint a gateway may attach to an event.
///
/// Plain content events carry no hint at all, so only the two edge
/// transitions are representable here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusHint {
    /// Subscriber dialed a service code; the dialog is opening.
    Triggered,
    /// Carrier or subscriber tore the dialog down.
    Interrupted,
}

// ============================================================================
// Channel identity
// ============================================================================

/// Reference to the channel an event arrived on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelRef {
    /// Channel identifier.
    pub id: String,

    /// Org owning the channel, when known to the adapter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,

    /// Actor that created the channel; used as the audit actor for
    /// records the engine creates on the channel's behalf.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

impl ChannelRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            org: None,
            created_by: None,
        }
    }

    pub fn with_org(mut self, org: impl Into<String>) -> Self {
        self.org = Some(org.into());
        self
    }

    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = Some(created_by.into());
        self
    }
}

//! Session records and the typed patches applied to them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::urn::TelUrn;

// ============================================================================
// Constants
// ============================================================================

/// Prefix for internal session ids.
pub const SESSION_ID_PREFIX: &str = "ussd_";

/// Generate a fresh internal session id.
pub fn generate_session_id() -> String {
    format!("{SESSION_ID_PREFIX}{}", Ulid::new())
}

// ============================================================================
// Session
// ============================================================================

/// A USSD session record.
///
/// `id` is the engine's identity for the dialog; `external_id` is the
/// gateway's, and gateways reuse those across dialogs. The two are equal in
/// lifetime only while the session is non-terminal; terminal rows are kept
/// as history and may share an external id with a later, unrelated session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Internal identifier (`ussd_<ulid>`), assigned at creation, immutable.
    pub id: String,
    /// Gateway-supplied dialog identifier. A correlation hint, not a key.
    pub external_id: String,
    /// Resolved subscriber identifier.
    pub subscriber: String,
    /// Normalized subscriber address.
    pub address: TelUrn,
    /// Address-binding id for (subscriber, address), when resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding: Option<String>,
    /// Channel the session runs on. Set at creation, immutable.
    pub channel: String,
    /// Owning org, when known. Set at creation, immutable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
    /// Who initiated the session. Set at creation, immutable.
    pub direction: SessionDirection,
    /// Lifecycle status, governed by the state machine.
    pub status: SessionStatus,
    /// When the session entered its triggered/active state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_on: Option<DateTime<Utc>>,
    /// When the session reached a terminal status. Set exactly once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_on: Option<DateTime<Utc>>,
    /// Audit timestamps.
    pub created_on: DateTime<Utc>,
    pub modified_on: DateTime<Utc>,
    /// Audit actors; the store assigns the system actor when none supplied.
    pub created_by: String,
    pub modified_by: String,
}

impl Session {
    /// Assemble a fresh record from creation fields.
    ///
    /// Id and audit assignment policy belong to the store, which passes the
    /// values in; see `SessionStore::create`.
    pub fn from_new(new: NewSession, id: String, actor: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            external_id: new.external_id,
            subscriber: new.subscriber,
            address: new.address,
            binding: new.binding,
            channel: new.channel,
            org: new.org,
            direction: new.direction,
            status: new.status,
            started_on: new.started_on,
            ended_on: new.ended_on,
            created_on: now,
            modified_on: now,
            created_by: actor.clone(),
            modified_by: actor,
        }
    }

    /// True when a flow collaborator has requested a graceful end and the
    /// gateway should terminate the dialog after the next reply.
    pub fn should_end(&self) -> bool {
        self.status == SessionStatus::Ending
    }

    /// True when the session has reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Creation-time fields for a new session.
///
/// `actor: None` means "no authenticated actor"; the store substitutes the
/// system actor for audit columns in that case.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub external_id: String,
    pub subscriber: String,
    pub address: TelUrn,
    pub binding: Option<String>,
    pub channel: String,
    pub org: Option<String>,
    pub direction: SessionDirection,
    pub status: SessionStatus,
    pub started_on: Option<DateTime<Utc>>,
    pub ended_on: Option<DateTime<Utc>>,
    pub actor: Option<String>,
}

// ============================================================================
// Status & Direction
// ============================================================================

/// Session lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// A trigger matched and the dialog is opening.
    Triggered,
    /// Mid-dialog; content is flowing.
    InProgress,
    /// Torn down before a graceful end. Terminal.
    Interrupted,
    /// A flow requested a graceful end; awaiting close.
    Ending,
    /// Closed gracefully. Terminal.
    Completed,
}

impl SessionStatus {
    /// Terminal statuses never transition again and are excluded from
    /// active-session lookups.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Interrupted)
    }

    /// Whether the lifecycle permits moving from `self` to `next`.
    ///
    /// Happy path runs `Triggered → InProgress → Ending → Completed`;
    /// `Interrupted` is reachable from any non-terminal status.
    pub fn can_transition(self, next: Self) -> bool {
        match (self, next) {
            (Self::Triggered, Self::InProgress | Self::Ending | Self::Interrupted) => true,
            (Self::InProgress, Self::Ending | Self::Interrupted) => true,
            (Self::Ending, Self::Completed | Self::Interrupted) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Triggered => "triggered",
            Self::InProgress => "in_progress",
            Self::Interrupted => "interrupted",
            Self::Ending => "ending",
            Self::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// Who initiated the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionDirection {
    /// Subscriber dialed in.
    Pull,
    /// Server sent an invitation.
    Push,
}

impl std::fmt::Display for SessionDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pull => "pull",
            Self::Push => "push",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Patches
// ============================================================================

/// Fields of a session a patch or partial save may touch.
///
/// Creation-time fields (subscriber, channel, org, direction) are immutable
/// and deliberately unrepresentable here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionField {
    ExternalId,
    Status,
    StartedOn,
    EndedOn,
}

/// A typed patch over the mutable fields of a session.
///
/// Built by the reconciler from an event's status hint, then applied onto a
/// matched session with [`SessionPatch::apply`]. Fields left `None` are
/// untouched.
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    pub external_id: Option<String>,
    pub status: Option<SessionStatus>,
    pub started_on: Option<DateTime<Utc>>,
    pub ended_on: Option<DateTime<Utc>>,
}

impl SessionPatch {
    /// Overwrite the session's fields with those present in the patch.
    ///
    /// Returns the list of fields written, suitable for a partial
    /// `SessionStore::save`.
    pub fn apply(&self, session: &mut Session) -> Vec<SessionField> {
        let mut changed = Vec::new();

        if let Some(external_id) = &self.external_id {
            session.external_id = external_id.clone();
            changed.push(SessionField::ExternalId);
        }
        if let Some(status) = self.status {
            session.status = status;
            changed.push(SessionField::Status);
        }
        if let Some(started_on) = self.started_on {
            session.started_on = Some(started_on);
            changed.push(SessionField::StartedOn);
        }
        if let Some(ended_on) = self.ended_on {
            session.ended_on = Some(ended_on);
            changed.push(SessionField::EndedOn);
        }

        changed
    }

    /// A copy of this patch that also overwrites the external id.
    ///
    /// Used on the push-precedence resume path, where the matched session
    /// absorbs the event's external id.
    pub fn with_external_id(&self, external_id: impl Into<String>) -> Self {
        let mut patch = self.clone();
        patch.external_id = Some(external_id.into());
        patch
    }
}

//! Ussdhub - a session reconciliation and lifecycle engine for USSD gateways.

// ============================================================================
// Core Infrastructure
// ============================================================================

pub mod build_info;
pub mod config;
pub mod store;
pub mod sync;

// ============================================================================
// Domain
// ============================================================================

pub mod contact;
pub mod flow;
pub mod msg;
pub mod session;
pub mod trigger;
pub mod urn;

//! Subscriber address normalization.
//!
//! Gateways report subscriber addresses in whatever shape the carrier uses:
//! `+256 701-234.567`, `(256) 701 234 567`, bare shortcodes, sometimes with
//! a `tel:` scheme already attached. Everything downstream (identity
//! resolution, session records, interrupt dispatch) keys on one canonical
//! form, so normalization happens once at the engine boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// URN scheme for telephone addresses.
pub const TEL_SCHEME: &str = "tel:";

/// A normalized `tel:` URN for a subscriber address.
///
/// Canonical form: `tel:` followed by an optional `+` and digits for
/// international numbers, or lowercase alphanumerics for shortcodes.
/// Separator characters and whitespace are stripped during normalization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TelUrn(String);

impl TelUrn {
    /// Normalize a raw gateway-supplied address into a tel URN.
    ///
    /// Accepts input with or without the `tel:` scheme.
    pub fn from_raw(raw: &str) -> Result<Self, UrnError> {
        let trimmed = raw.trim();
        let address = trimmed.strip_prefix(TEL_SCHEME).unwrap_or(trimmed);

        let mut cleaned = String::with_capacity(address.len());
        for c in address.chars() {
            match c {
                '+' if cleaned.is_empty() => cleaned.push('+'),
                ' ' | '\t' | '-' | '.' | '(' | ')' => {}
                c if c.is_ascii_alphanumeric() => cleaned.push(c.to_ascii_lowercase()),
                _ => return Err(UrnError::invalid(raw)),
            }
        }

        if cleaned.is_empty() || cleaned == "+" {
            return Err(UrnError::invalid(raw));
        }
        if let Some(digits) = cleaned.strip_prefix('+')
            && !digits.chars().all(|c| c.is_ascii_digit())
        {
            return Err(UrnError::invalid(raw));
        }

        Ok(Self(format!("{TEL_SCHEME}{cleaned}")))
    }

    /// The full URN string, scheme included.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The address part without the scheme.
    pub fn path(&self) -> &str {
        self.0.strip_prefix(TEL_SCHEME).unwrap_or(&self.0)
    }
}

impl std::fmt::Display for TelUrn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors raised during address normalization.
#[derive(Debug, Error)]
pub enum UrnError {
    /// Address cannot be normalized to a tel URN.
    #[error("invalid subscriber address: {raw:?}")]
    InvalidAddress { raw: String },
}

impl UrnError {
    /// Create an invalid-address error, capturing the raw input.
    pub fn invalid(raw: impl Into<String>) -> Self {
        Self::InvalidAddress { raw: raw.into() }
    }
}

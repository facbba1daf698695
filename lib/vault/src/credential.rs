//! Stored platform credentials.
//!
//! The access token itself only ever exists in storage as an encrypted blob;
//! `StoredCredential` is the at-rest record and `Secret` the decrypted view
//! handed to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tokens expiring within this window are reported as needing refresh.
const REFRESH_WINDOW_MINUTES: i64 = 5;

/// A credential as written under `secret:<domain>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredential {
    /// `<ivHex>:<tagHex>:<cipherHex>` blob of the access token.
    pub ciphertext: String,
    /// Access scopes granted with the token.
    pub scope: Vec<String>,
    /// When the credential was stored.
    pub created_at: DateTime<Utc>,
    /// When the token stops working, for online (expiring) tokens.
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredCredential {
    /// Returns true once the token is past its expiry.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| expires <= now)
    }

    /// Checks if the token expires within the next five minutes.
    #[must_use]
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|expires| expires < now + chrono::Duration::minutes(REFRESH_WINDOW_MINUTES))
    }
}

/// A decrypted credential.
///
/// `Debug` redacts the token.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret {
    /// The access token.
    pub secret: String,
    /// Access scopes granted with the token.
    pub scope: Vec<String>,
    /// When the token stops working, if it expires.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Secret {
    /// Returns true if every scope in `required` was granted.
    #[must_use]
    pub fn has_scopes(&self, required: &[&str]) -> bool {
        required
            .iter()
            .all(|needed| self.scope.iter().any(|granted| granted == needed))
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("secret", &"<redacted>")
            .field("scope", &self.scope)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Splits a comma-separated scope string as returned by the token endpoint.
#[must_use]
pub fn parse_scope(scope: &str) -> Vec<String> {
    scope
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

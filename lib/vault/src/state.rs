//! Single-use CSRF state tokens bound to a shop domain.

use crate::error::VaultError;
use crate::store::{KeyValueStore, state_key};
use chrono::{DateTime, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use rootcause::Report;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use storelink_core::ShopDomain;

/// Random bytes per token (256 bits).
pub const TOKEN_BYTES: usize = 32;

/// Default token lifetime.
pub const DEFAULT_STATE_TTL: Duration = Duration::from_secs(600);

/// Record stored under `state:<token>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    /// The shop this token was issued for.
    pub domain: ShopDomain,
    /// When the token was issued.
    pub created_at: DateTime<Utc>,
    /// Lifetime in seconds.
    pub ttl_seconds: u64,
}

impl StateRecord {
    /// Returns true once the record has outlived its TTL.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let ttl = chrono::Duration::seconds(i64::try_from(self.ttl_seconds).unwrap_or(i64::MAX));
        self.created_at
            .checked_add_signed(ttl)
            .is_none_or(|expires_at| expires_at <= now)
    }
}

/// Outcome of presenting a state token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateValidation {
    /// The token was live and is now consumed.
    Valid { domain: ShopDomain },
    /// Unknown, expired, already consumed, or unverifiable.
    Invalid,
}

impl StateValidation {
    /// Returns true for `Valid`.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }

    /// Returns the bound domain for `Valid`.
    #[must_use]
    pub fn domain(&self) -> Option<&ShopDomain> {
        match self {
            Self::Valid { domain } => Some(domain),
            Self::Invalid => None,
        }
    }
}

/// Issues and consumes state tokens against a key-value store.
#[derive(Clone)]
pub struct StateTokens {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl StateTokens {
    /// Creates a token issuer with the given lifetime.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Returns the configured token lifetime.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issues a fresh token bound to `domain`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be written; a token that was not
    /// stored would never validate, so the caller must not hand it out.
    #[tracing::instrument(skip(self, domain), fields(domain = %domain))]
    pub async fn issue(&self, domain: &ShopDomain) -> Result<String, Report<VaultError>> {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let token = hex::encode(bytes);

        let record = StateRecord {
            domain: domain.clone(),
            created_at: Utc::now(),
            ttl_seconds: self.ttl.as_secs(),
        };
        let value = serde_json::to_string(&record).map_err(|e| VaultError::Serialization {
            reason: e.to_string(),
        })?;

        let key = state_key(&token);
        self.store
            .put(&key, &value, Some(self.ttl))
            .await
            .map_err(|e| VaultError::storage("put", STATE_KEY_REDACTED, e))?;

        tracing::debug!("issued state token");
        Ok(token)
    }

    /// Consumes a token, succeeding at most once per issued token.
    ///
    /// Never returns an error: store failures and malformed tokens both yield
    /// `StateValidation::Invalid`.
    pub async fn consume(&self, token: &str) -> StateValidation {
        if !is_well_formed(token) {
            tracing::debug!(len = token.len(), "rejecting malformed state token");
            return StateValidation::Invalid;
        }

        let raw = match self.store.take(&state_key(token)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::debug!("state token unknown or already consumed");
                return StateValidation::Invalid;
            }
            Err(e) => {
                tracing::warn!(error = %e, "state token lookup failed");
                return StateValidation::Invalid;
            }
        };

        let record: StateRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = %e, "undecodable state record");
                return StateValidation::Invalid;
            }
        };

        if record.is_expired(Utc::now()) {
            tracing::debug!(domain = %record.domain, "state token expired");
            return StateValidation::Invalid;
        }

        StateValidation::Valid {
            domain: record.domain,
        }
    }
}

/// Key placeholder used in error messages so tokens never reach logs.
const STATE_KEY_REDACTED: &str = "state:<redacted>";

fn is_well_formed(token: &str) -> bool {
    token.len() == TOKEN_BYTES * 2 && token.bytes().all(|b| b.is_ascii_hexdigit())
}

//! The credential vault.
//!
//! All platform credentials are encrypted at rest. No plaintext token is
//! written to the store or to logs.

use crate::cipher::SecretCipher;
use crate::credential::{Secret, StoredCredential};
use crate::error::VaultError;
use crate::state::{DEFAULT_STATE_TTL, StateTokens, StateValidation};
use crate::store::{KeyValueStore, secret_key};
use chrono::{DateTime, Utc};
use rootcause::Report;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use storelink_core::ShopDomain;
use tracing::{debug, instrument, warn};

/// Vault settings.
#[derive(Clone, Deserialize)]
pub struct VaultConfig {
    /// Long-lived secret the encryption key is derived from.
    pub master_secret: String,
    /// Deployment-wide key derivation salt (at least eight bytes).
    pub kdf_salt: String,
    /// Lifetime of OAuth state tokens, in seconds.
    #[serde(default = "default_state_ttl_seconds")]
    pub state_ttl_seconds: u64,
}

fn default_state_ttl_seconds() -> u64 {
    DEFAULT_STATE_TTL.as_secs()
}

impl std::fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultConfig")
            .field("state_ttl_seconds", &self.state_ttl_seconds)
            .finish_non_exhaustive()
    }
}

/// Encrypted credential storage plus single-use OAuth state.
#[derive(Clone)]
pub struct CredentialVault {
    cipher: SecretCipher,
    store: Arc<dyn KeyValueStore>,
    states: StateTokens,
}

impl CredentialVault {
    /// Creates a vault from an existing cipher.
    #[must_use]
    pub fn new(cipher: SecretCipher, store: Arc<dyn KeyValueStore>, state_ttl: Duration) -> Self {
        let states = StateTokens::new(store.clone(), state_ttl);
        Self {
            cipher,
            store,
            states,
        }
    }

    /// Derives the key and creates a vault from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the master secret or salt is unusable.
    pub fn from_config(
        config: &VaultConfig,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, Report<VaultError>> {
        let cipher = SecretCipher::derive(&config.master_secret, &config.kdf_salt)?;
        Ok(Self::new(
            cipher,
            store,
            Duration::from_secs(config.state_ttl_seconds),
        ))
    }

    /// Returns the decrypted credential for `domain`.
    ///
    /// Returns `None` if no credential is stored, it has expired, or its blob
    /// fails to decrypt.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store itself fails.
    #[instrument(skip(self, domain), fields(domain = %domain))]
    pub async fn get_secret(
        &self,
        domain: &ShopDomain,
    ) -> Result<Option<Secret>, Report<VaultError>> {
        let key = secret_key(domain.as_str());
        let Some(raw) = self
            .store
            .get(&key)
            .await
            .map_err(|e| VaultError::storage("get", &key, e))?
        else {
            return Ok(None);
        };

        let stored: StoredCredential = match serde_json::from_str(&raw) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "undecodable credential record");
                return Ok(None);
            }
        };

        let now = Utc::now();
        if stored.is_expired(now) {
            debug!("stored credential has expired");
            return Ok(None);
        }
        if stored.needs_refresh(now) {
            warn!(expires_at = ?stored.expires_at, "stored credential expires soon");
        }

        let Some(secret) = self.cipher.decrypt(&stored.ciphertext) else {
            warn!("stored credential failed to decrypt");
            return Ok(None);
        };

        Ok(Some(Secret {
            secret,
            scope: stored.scope,
            expires_at: stored.expires_at,
        }))
    }

    /// Encrypts and stores a non-expiring credential for `domain`.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption or the store write fails.
    pub async fn store_secret(
        &self,
        domain: &ShopDomain,
        secret: &str,
        scope: &[String],
    ) -> Result<(), Report<VaultError>> {
        self.store_secret_with_expiry(domain, secret, scope, None)
            .await
    }

    /// Encrypts and stores a credential that stops working at `expires_at`.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption or the store write fails.
    #[instrument(skip(self, domain, secret, scope), fields(domain = %domain, scopes = scope.len()))]
    pub async fn store_secret_with_expiry(
        &self,
        domain: &ShopDomain,
        secret: &str,
        scope: &[String],
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), Report<VaultError>> {
        let record = StoredCredential {
            ciphertext: self.cipher.encrypt(secret)?,
            scope: scope.to_vec(),
            created_at: Utc::now(),
            expires_at,
        };
        let value = serde_json::to_string(&record).map_err(|e| VaultError::Serialization {
            reason: e.to_string(),
        })?;

        let key = secret_key(domain.as_str());
        self.store
            .put(&key, &value, None)
            .await
            .map_err(|e| VaultError::storage("put", &key, e))?;

        debug!("stored credential");
        Ok(())
    }

    /// Deletes the credential for `domain`, reporting whether one existed.
    ///
    /// Deleting an absent credential is not an error, so uninstall handling
    /// can be repeated safely.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    #[instrument(skip(self, domain), fields(domain = %domain))]
    pub async fn delete_secret(&self, domain: &ShopDomain) -> Result<bool, Report<VaultError>> {
        let key = secret_key(domain.as_str());
        let existed = self
            .store
            .delete_if_exists(&key)
            .await
            .map_err(|e| VaultError::storage("delete", &key, e))?;
        debug!(existed, "deleted credential");
        Ok(existed)
    }

    /// Issues a single-use OAuth state token bound to `domain`.
    ///
    /// # Errors
    ///
    /// Returns an error if the token cannot be stored.
    pub async fn issue_state(&self, domain: &ShopDomain) -> Result<String, Report<VaultError>> {
        self.states.issue(domain).await
    }

    /// Consumes an OAuth state token.
    pub async fn consume_state(&self, token: &str) -> StateValidation {
        self.states.consume(token).await
    }
}

//! Key-value store contract for vault records.
//!
//! The vault keeps credentials under `secret:<domain>` and state tokens under
//! `state:<token>`. The store is an opaque service; the only operation with a
//! correctness requirement beyond get/put is [`KeyValueStore::take`], which
//! must remove and return an entry atomically.

use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Key prefix for stored credentials.
pub const SECRET_PREFIX: &str = "secret:";

/// Key prefix for CSRF state tokens.
pub const STATE_PREFIX: &str = "state:";

/// Trait for the vault's backing store.
///
/// Entries past their TTL must behave as absent for every operation.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores `value` under `key`, replacing any existing entry.
    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Removes `key` and reports whether a live entry existed.
    async fn delete_if_exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Atomically removes `key` and returns its value.
    ///
    /// Of any number of concurrent `take` calls for the same key, at most one
    /// may observe `Some`.
    async fn take(&self, key: &str) -> Result<Option<String>, StoreError>;
}

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-process store for tests and single-node development.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .map(|entries| entries.values().filter(|e| e.is_live(now)).count())
            .unwrap_or(0)
    }

    /// Returns true if the store holds no live entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Entry>>, StoreError> {
        self.entries.lock().map_err(|_| StoreError::Unavailable {
            reason: "memory store lock poisoned".to_string(),
        })
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let entries = self.lock()?;
        Ok(entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let entry = Entry {
            value: value.to_string(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.lock()?.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete_if_exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.take(key).await?.is_some())
    }

    async fn take(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let removed = self.lock()?.remove(key);
        Ok(removed.filter(|e| e.is_live(now)).map(|e| e.value))
    }
}

/// Storage key for a shop's credential.
#[must_use]
pub fn secret_key(domain: &str) -> String {
    format!("{SECRET_PREFIX}{domain}")
}

/// Storage key for a state token.
#[must_use]
pub fn state_key(token: &str) -> String {
    format!("{STATE_PREFIX}{token}")
}

//! Error types for the vault crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `StoreError`: Errors from the backing key-value store
//! - `VaultError`: Errors from vault operations
//!
//! Tampered ciphertext and unknown state tokens are not errors. They come
//! back as `None` / `StateValidation::Invalid` so callers fail closed.

use std::fmt;

/// Errors from the backing key-value store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached or refused the operation.
    Unavailable { reason: String },
    /// The store returned data it could not decode.
    Corrupt { key: String, reason: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { reason } => write!(f, "store unavailable: {reason}"),
            Self::Corrupt { key, reason } => {
                write!(f, "corrupt store entry '{key}': {reason}")
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors from vault operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    /// The master secret or salt is unusable.
    Configuration { reason: String },
    /// Encryption failed.
    EncryptionFailed { reason: String },
    /// A record could not be serialized for storage.
    Serialization { reason: String },
    /// The backing store failed.
    Storage { operation: &'static str, key: String, reason: String },
}

impl fmt::Display for VaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration { reason } => {
                write!(f, "vault configuration error: {reason}")
            }
            Self::EncryptionFailed { reason } => {
                write!(f, "encryption failed: {reason}")
            }
            Self::Serialization { reason } => {
                write!(f, "record serialization failed: {reason}")
            }
            Self::Storage {
                operation,
                key,
                reason,
            } => {
                write!(f, "store {operation} failed for '{key}': {reason}")
            }
        }
    }
}

impl std::error::Error for VaultError {}

impl VaultError {
    pub(crate) fn storage(operation: &'static str, key: &str, source: StoreError) -> Self {
        Self::Storage {
            operation,
            key: key.to_string(),
            reason: source.to_string(),
        }
    }
}

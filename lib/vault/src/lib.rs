//! Credential vault for storelink.
//!
//! This crate provides:
//!
//! - **Secret cipher**: AES-256-GCM encryption of access tokens at rest
//! - **State tokens**: single-use, domain-bound OAuth CSRF state
//! - **Credential vault**: the store/get/delete surface used by the rest of the system
//! - **Key-value store contract**: the opaque backing store, plus an in-memory implementation

pub mod cipher;
pub mod credential;
pub mod error;
pub mod state;
pub mod store;
pub mod vault;

pub use cipher::SecretCipher;
pub use credential::{Secret, StoredCredential, parse_scope};
pub use error::{StoreError, VaultError};
pub use state::{StateTokens, StateValidation};
pub use store::{KeyValueStore, MemoryStore};
pub use vault::{CredentialVault, VaultConfig};

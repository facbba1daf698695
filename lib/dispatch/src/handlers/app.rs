//! App lifecycle events.

use crate::error::HandlerError;
use crate::event::EventMetadata;
use crate::handler::{EventHandler, HandlerOutcome};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use storelink_vault::CredentialVault;
use tracing::info;

/// Handles the `app` namespace.
///
/// `app/uninstalled` removes the shop's stored credential. Removing an absent
/// credential succeeds, so redelivery is harmless. Other actions are
/// acknowledged without side effects.
pub struct AppLifecycleHandler {
    vault: Arc<CredentialVault>,
}

impl AppLifecycleHandler {
    /// Namespace this handler serves.
    pub const NAMESPACE: &'static str = "app";

    /// Creates a handler that revokes credentials through `vault`.
    #[must_use]
    pub fn new(vault: Arc<CredentialVault>) -> Self {
        Self { vault }
    }
}

#[async_trait]
impl EventHandler for AppLifecycleHandler {
    async fn handle(
        &self,
        _payload: &JsonValue,
        metadata: &EventMetadata,
    ) -> Result<HandlerOutcome, HandlerError> {
        if metadata.action() != "uninstalled" {
            return Ok(HandlerOutcome::ok(format!("Ignored {}", metadata.topic)));
        }

        let removed = self
            .vault
            .delete_secret(&metadata.domain)
            .await
            .map_err(|e| HandlerError::Downstream {
                operation: "delete_secret".to_string(),
                reason: e.to_string(),
            })?;

        info!(domain = %metadata.domain, removed, "app uninstalled");
        Ok(HandlerOutcome::ok("Credential revoked")
            .with_data(serde_json::json!({ "removed": removed })))
    }
}

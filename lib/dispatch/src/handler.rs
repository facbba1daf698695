//! The handler contract.

use crate::error::HandlerError;
use crate::event::EventMetadata;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Normalized result of handling one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerOutcome {
    /// Whether the event was processed.
    pub success: bool,
    /// Short human-readable summary.
    pub message: String,
    /// Handler-specific detail; `{"error": ...}` for failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

impl HandlerOutcome {
    /// A successful outcome.
    #[must_use]
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    /// A failed outcome.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }

    /// A failed outcome carrying `{"error": error}`.
    #[must_use]
    pub fn error(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self::failed(message).with_data(serde_json::json!({ "error": error.into() }))
    }

    /// Attaches data.
    #[must_use]
    pub fn with_data(mut self, data: JsonValue) -> Self {
        self.data = Some(data);
        self
    }
}

/// Processes verified events for one topic namespace.
///
/// Platforms redeliver events, so implementations must tolerate seeing the
/// same `delivery_id` more than once without corrupting downstream state.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handles one event.
    async fn handle(
        &self,
        payload: &JsonValue,
        metadata: &EventMetadata,
    ) -> Result<HandlerOutcome, HandlerError>;
}

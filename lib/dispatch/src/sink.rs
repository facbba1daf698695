//! Downstream delivery of verified events to internal consumers.

use crate::error::SinkError;
use crate::event::EventMetadata;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::sync::Mutex;
use storelink_core::ShopDomain;

/// A verified event as published to internal consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardedEvent {
    /// Topic namespace, used for subject routing.
    pub namespace: String,
    /// Full topic.
    pub topic: String,
    /// Source shop.
    pub domain: ShopDomain,
    /// Provider delivery id. Consumers drop events whose key they have seen.
    pub idempotency_key: String,
    /// Parsed payload.
    pub payload: JsonValue,
    /// Admin API data fetched for the resource, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<JsonValue>,
    /// When the delivery was received.
    pub received_at: DateTime<Utc>,
}

impl ForwardedEvent {
    /// Builds a forwarded event from a delivery's metadata and payload.
    #[must_use]
    pub fn from_delivery(payload: &JsonValue, metadata: &EventMetadata) -> Self {
        Self {
            namespace: metadata.namespace().to_string(),
            topic: metadata.topic.clone(),
            domain: metadata.domain.clone(),
            idempotency_key: metadata.delivery_id.clone(),
            payload: payload.clone(),
            enrichment: None,
            received_at: metadata.received_at,
        }
    }

    /// Attaches Admin API data fetched for the resource.
    #[must_use]
    pub fn with_enrichment(mut self, enrichment: JsonValue) -> Self {
        self.enrichment = Some(enrichment);
        self
    }
}

/// Destination for forwarded events.
///
/// Implementations should deduplicate on `idempotency_key` where the
/// transport allows it.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Publishes one event.
    async fn publish(&self, event: &ForwardedEvent) -> Result<(), SinkError>;
}

/// In-process sink that keeps the first event per idempotency key.
#[derive(Debug, Default)]
pub struct MemorySink {
    inner: Mutex<MemorySinkInner>,
}

#[derive(Debug, Default)]
struct MemorySinkInner {
    seen: HashSet<String>,
    events: Vec<ForwardedEvent>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the accepted events in publish order.
    #[must_use]
    pub fn events(&self) -> Vec<ForwardedEvent> {
        self.inner
            .lock()
            .map(|inner| inner.events.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl EventSink for MemorySink {
    async fn publish(&self, event: &ForwardedEvent) -> Result<(), SinkError> {
        let mut inner = self.inner.lock().map_err(|_| SinkError::Unavailable {
            reason: "memory sink lock poisoned".to_string(),
        })?;
        if inner.seen.insert(event.idempotency_key.clone()) {
            inner.events.push(event.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(key: &str) -> ForwardedEvent {
        let metadata = EventMetadata::new(
            "orders/create",
            ShopDomain::parse("acme.myshopify.com").unwrap(),
            key,
        );
        ForwardedEvent::from_delivery(&serde_json::json!({"id": 1}), &metadata)
    }

    #[test]
    fn from_delivery_uses_delivery_id_as_key() {
        let event = event("d-1");
        assert_eq!(event.namespace, "orders");
        assert_eq!(event.idempotency_key, "d-1");
    }

    #[tokio::test]
    async fn memory_sink_drops_duplicates() {
        let sink = MemorySink::new();
        sink.publish(&event("d-1")).await.unwrap();
        sink.publish(&event("d-1")).await.unwrap();
        sink.publish(&event("d-2")).await.unwrap();

        let keys: Vec<_> = sink.events().into_iter().map(|e| e.idempotency_key).collect();
        assert_eq!(keys, vec!["d-1", "d-2"]);
    }
}

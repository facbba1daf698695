//! Forwarding of resource events to internal consumers.

use crate::error::HandlerError;
use crate::event::EventMetadata;
use crate::handler::{EventHandler, HandlerOutcome};
use crate::sink::{EventSink, ForwardedEvent};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Publishes every event it receives to an [`EventSink`].
///
/// Register one instance per namespace to forward, e.g. `orders`, `products`,
/// `customers`. The delivery id travels as the idempotency key.
pub struct ForwardingHandler {
    sink: Arc<dyn EventSink>,
}

impl ForwardingHandler {
    /// Creates a handler publishing to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl EventHandler for ForwardingHandler {
    async fn handle(
        &self,
        payload: &JsonValue,
        metadata: &EventMetadata,
    ) -> Result<HandlerOutcome, HandlerError> {
        let event = ForwardedEvent::from_delivery(payload, metadata);
        self.sink
            .publish(&event)
            .await
            .map_err(|e| HandlerError::Downstream {
                operation: "publish".to_string(),
                reason: e.to_string(),
            })?;

        Ok(HandlerOutcome::ok(format!("Forwarded {}", metadata.topic))
            .with_data(serde_json::json!({ "idempotency_key": event.idempotency_key })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SinkError;
    use crate::sink::MemorySink;
    use storelink_core::ShopDomain;

    struct DownSink;

    #[async_trait]
    impl EventSink for DownSink {
        async fn publish(&self, _event: &ForwardedEvent) -> Result<(), SinkError> {
            Err(SinkError::Unavailable {
                reason: "no route to broker".to_string(),
            })
        }
    }

    fn metadata(delivery_id: &str) -> EventMetadata {
        EventMetadata::new(
            "orders/create",
            ShopDomain::parse("acme.myshopify.com").unwrap(),
            delivery_id,
        )
    }

    #[tokio::test]
    async fn redelivery_is_forwarded_once() {
        let sink = Arc::new(MemorySink::new());
        let handler = ForwardingHandler::new(sink.clone());
        let payload = serde_json::json!({"id": 450789469});

        for _ in 0..3 {
            let outcome = handler.handle(&payload, &metadata("d-1")).await.unwrap();
            assert!(outcome.success);
        }

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload, payload);
        assert_eq!(events[0].idempotency_key, "d-1");
    }

    #[tokio::test]
    async fn sink_failure_is_a_handler_error() {
        let handler = ForwardingHandler::new(Arc::new(DownSink));
        let error = handler
            .handle(&serde_json::json!({}), &metadata("d-1"))
            .await
            .unwrap_err();
        assert!(matches!(error, HandlerError::Downstream { .. }));
        assert!(error.to_string().contains("no route to broker"));
    }
}

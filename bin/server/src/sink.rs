//! Event sinks for forwarded webhook events.
//!
//! - `NatsEventSink`: JetStream publishing with broker-side deduplication
//! - `LogEventSink`: logs events when no broker is configured

use async_nats::HeaderMap;
use async_nats::jetstream;
use async_trait::async_trait;
use storelink_dispatch::{EventSink, ForwardedEvent, SinkError};

/// Subject prefix for forwarded events.
const EVENTS_SUBJECT_PREFIX: &str = "storelink.events";

/// Stream name for forwarded events.
const EVENTS_STREAM_NAME: &str = "STORELINK_EVENTS";

/// Header JetStream deduplicates published messages on.
const MESSAGE_ID_HEADER: &str = "Nats-Msg-Id";

/// JetStream-backed event sink.
///
/// Events are published to `storelink.events.<namespace>`. The delivery id is
/// sent as the message id, so a redelivered webhook inside the stream's
/// duplicate window is stored once.
pub struct NatsEventSink {
    jetstream: jetstream::Context,
}

impl NatsEventSink {
    /// Connects to NATS and ensures the events stream exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or stream setup fails.
    pub async fn connect(url: &str) -> Result<Self, SinkError> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| SinkError::Unavailable {
                reason: e.to_string(),
            })?;
        let jetstream = jetstream::new(client);

        let stream_config = jetstream::stream::Config {
            name: EVENTS_STREAM_NAME.to_string(),
            subjects: vec![format!("{EVENTS_SUBJECT_PREFIX}.>")],
            storage: jetstream::stream::StorageType::File,
            retention: jetstream::stream::RetentionPolicy::Limits,
            ..Default::default()
        };
        jetstream
            .get_or_create_stream(stream_config)
            .await
            .map_err(|e| SinkError::Unavailable {
                reason: format!("failed to create events stream: {e}"),
            })?;

        Ok(Self { jetstream })
    }

    /// Returns the subject for a namespace.
    fn subject(namespace: &str) -> String {
        format!("{EVENTS_SUBJECT_PREFIX}.{namespace}")
    }
}

#[async_trait]
impl EventSink for NatsEventSink {
    async fn publish(&self, event: &ForwardedEvent) -> Result<(), SinkError> {
        let bytes = serde_json::to_vec(event).map_err(|e| SinkError::Rejected {
            reason: format!("failed to serialize event: {e}"),
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(MESSAGE_ID_HEADER, event.idempotency_key.as_str());

        self.jetstream
            .publish_with_headers(Self::subject(&event.namespace), headers, bytes.into())
            .await
            .map_err(|e| SinkError::Unavailable {
                reason: e.to_string(),
            })?
            .await
            .map_err(|e| SinkError::Rejected {
                reason: e.to_string(),
            })?;

        Ok(())
    }
}

/// Sink that only logs. Used when no NATS URL is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogEventSink;

#[async_trait]
impl EventSink for LogEventSink {
    async fn publish(&self, event: &ForwardedEvent) -> Result<(), SinkError> {
        tracing::info!(
            topic = %event.topic,
            domain = %event.domain,
            idempotency_key = %event.idempotency_key,
            "forwarded event"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_uses_namespace() {
        assert_eq!(NatsEventSink::subject("orders"), "storelink.events.orders");
    }
}

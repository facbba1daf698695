//! Topic routing.
//!
//! The dispatcher maps a topic namespace to exactly one handler and turns
//! whatever the handler does, including panicking, into a [`HandlerOutcome`].

use crate::event::{EventMetadata, namespace_of};
use crate::handler::{EventHandler, HandlerOutcome};
use futures::FutureExt;
use serde_json::Value as JsonValue;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

/// Registry of namespace handlers.
///
/// Built at startup and shared behind an `Arc`; dispatching never mutates it.
#[derive(Default, Clone)]
pub struct EventDispatcher {
    handlers: HashMap<String, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    /// Creates an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `namespace`, returning the handler it replaced.
    pub fn register_handler(
        &mut self,
        namespace: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> Option<Arc<dyn EventHandler>> {
        self.handlers.insert(namespace.into(), handler)
    }

    /// Returns true if `topic`'s namespace has a handler.
    #[must_use]
    pub fn can_route(&self, topic: &str) -> bool {
        self.handlers.contains_key(namespace_of(topic))
    }

    /// Returns the registered namespaces, sorted.
    #[must_use]
    pub fn namespaces(&self) -> Vec<&str> {
        let mut namespaces: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        namespaces.sort_unstable();
        namespaces
    }

    /// Routes an event to its handler.
    ///
    /// Never fails: an unknown namespace, a handler error, and a handler panic
    /// all come back as unsuccessful outcomes.
    pub async fn dispatch(&self, payload: &JsonValue, metadata: &EventMetadata) -> HandlerOutcome {
        self.route(payload, metadata)
            .await
            .unwrap_or_else(|| no_handler(&metadata.topic))
    }

    /// Like [`dispatch`](Self::dispatch), but `None` when nothing is registered.
    pub(crate) async fn route(
        &self,
        payload: &JsonValue,
        metadata: &EventMetadata,
    ) -> Option<HandlerOutcome> {
        let handler = self.handlers.get(metadata.namespace())?;
        debug!(topic = %metadata.topic, delivery_id = %metadata.delivery_id, "dispatching event");

        let outcome = match AssertUnwindSafe(handler.handle(payload, metadata))
            .catch_unwind()
            .await
        {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(error)) => {
                warn!(topic = %metadata.topic, error = %error, "handler failed");
                HandlerOutcome::error(
                    format!("Handler failed for topic {}", metadata.topic),
                    error.to_string(),
                )
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                warn!(topic = %metadata.topic, panic = %reason, "handler panicked");
                HandlerOutcome::error(
                    format!("Handler panicked for topic {}", metadata.topic),
                    reason,
                )
            }
        };
        Some(outcome)
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("namespaces", &self.namespaces())
            .finish()
    }
}

pub(crate) fn no_handler(topic: &str) -> HandlerOutcome {
    HandlerOutcome::failed(format!("No handler found for topic {topic}"))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

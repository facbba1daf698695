//! Inbound webhook deliveries.

use crate::error::EventError;
use chrono::{DateTime, Utc};
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use storelink_core::ShopDomain;

/// Header carrying the event topic, such as `orders/create`.
pub const TOPIC_HEADER: &str = "x-shopify-topic";
/// Header carrying the source shop domain.
pub const SHOP_DOMAIN_HEADER: &str = "x-shopify-shop-domain";
/// Header carrying the provider-issued delivery id.
pub const WEBHOOK_ID_HEADER: &str = "x-shopify-webhook-id";
/// Header carrying the base64 HMAC of the body.
pub const SIGNATURE_HEADER: &str = "x-shopify-hmac-sha256";
/// Header carrying the API version the payload was rendered with.
pub const API_VERSION_HEADER: &str = "x-shopify-api-version";

/// Returns the namespace of a topic: everything before the first `/`.
///
/// A topic without a separator is its own namespace.
#[must_use]
pub fn namespace_of(topic: &str) -> &str {
    topic.split_once('/').map_or(topic, |(namespace, _)| namespace)
}

/// Routing and audit data for one delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Full topic, `<namespace>/<action>`.
    pub topic: String,
    /// Shop the event originated from.
    pub domain: ShopDomain,
    /// Provider-issued delivery id; the idempotency key.
    pub delivery_id: String,
    /// API version of the payload, when sent.
    pub api_version: Option<String>,
    /// When this process received the delivery.
    pub received_at: DateTime<Utc>,
}

impl EventMetadata {
    /// Creates metadata received now.
    #[must_use]
    pub fn new(topic: impl Into<String>, domain: ShopDomain, delivery_id: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            domain,
            delivery_id: delivery_id.into(),
            api_version: None,
            received_at: Utc::now(),
        }
    }

    /// Returns the topic namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        namespace_of(&self.topic)
    }

    /// Returns the action after the namespace, or `""` if there is none.
    #[must_use]
    pub fn action(&self) -> &str {
        self.topic.split_once('/').map_or("", |(_, action)| action)
    }
}

/// A delivery as received, before verification.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    /// Routing data from the headers.
    pub metadata: EventMetadata,
    /// The exact body bytes that were signed.
    pub body: Vec<u8>,
    /// The signature header value.
    pub signature: String,
}

impl InboundEvent {
    /// Creates an event from already-extracted parts.
    #[must_use]
    pub fn new(metadata: EventMetadata, body: impl Into<Vec<u8>>, signature: impl Into<String>) -> Self {
        Self {
            metadata,
            body: body.into(),
            signature: signature.into(),
        }
    }

    /// Builds an event from request headers and the raw body.
    ///
    /// # Errors
    ///
    /// Returns an error if a required header is missing, the topic is empty,
    /// or the shop domain is invalid.
    pub fn from_headers(headers: &HeaderMap, body: impl Into<Vec<u8>>) -> Result<Self, EventError> {
        let topic = required(headers, TOPIC_HEADER)?;
        if namespace_of(topic).is_empty() {
            return Err(EventError::InvalidTopic {
                topic: topic.to_string(),
            });
        }

        let raw_domain = required(headers, SHOP_DOMAIN_HEADER)?;
        let domain = ShopDomain::parse(raw_domain).map_err(|_| EventError::InvalidDomain {
            value: raw_domain.to_string(),
        })?;

        let delivery_id = required(headers, WEBHOOK_ID_HEADER)?;
        let signature = required(headers, SIGNATURE_HEADER)?;

        let mut metadata = EventMetadata::new(topic, domain, delivery_id);
        metadata.api_version = optional(headers, API_VERSION_HEADER).map(str::to_string);

        Ok(Self::new(metadata, body, signature))
    }

    /// Parses the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not valid JSON.
    pub fn payload(&self) -> Result<JsonValue, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

fn optional<'a>(headers: &'a HeaderMap, name: &'static str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn required<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, EventError> {
    optional(headers, name).ok_or(EventError::MissingHeader { name })
}

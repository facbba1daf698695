//! Enrichment of resource events with Admin API data.
//!
//! Resource webhooks carry a thin payload. For each event the handler loads
//! the shop's credential from the vault, runs a GraphQL document against the
//! Admin API through the [`RateLimitedExecutor`], and forwards the payload
//! together with the query result.

use crate::error::HandlerError;
use crate::event::EventMetadata;
use crate::handler::{EventHandler, HandlerOutcome};
use crate::sink::{EventSink, ForwardedEvent};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use storelink_core::ShopDomain;
use storelink_executor::{
    CallError, OperationContext, RateLimitTelemetry, RateLimitedExecutor, parse_rate_limit_telemetry,
    parse_retry_after,
};
use storelink_vault::CredentialVault;
use tracing::{debug, info, instrument};

/// Header carrying the shop access token on Admin API calls.
pub const ACCESS_TOKEN_HEADER: &str = "x-shopify-access-token";

/// Payload field holding the resource's GraphQL id.
const RESOURCE_ID_FIELD: &str = "admin_graphql_api_id";

/// GraphQL document run for one namespace.
///
/// The document receives the resource id as the `$id` variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentQuery {
    /// GraphQL document.
    pub document: String,
    /// Scopes the stored credential must have been granted.
    pub required_scopes: Vec<String>,
}

impl EnrichmentQuery {
    /// Creates a query.
    #[must_use]
    pub fn new(document: impl Into<String>, required_scopes: &[&str]) -> Self {
        Self {
            document: document.into(),
            required_scopes: required_scopes.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

/// Admin GraphQL endpoint settings.
#[derive(Debug, Clone)]
pub struct AdminApi {
    http: reqwest::Client,
    api_version: String,
    base_url: Option<String>,
}

impl AdminApi {
    /// Creates settings for `api_version`, e.g. `2025-01`.
    #[must_use]
    pub fn new(http: reqwest::Client, api_version: impl Into<String>) -> Self {
        Self {
            http,
            api_version: api_version.into(),
            base_url: None,
        }
    }

    /// Sends every call to `base_url` instead of `https://<shop>`.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Returns the GraphQL endpoint for `domain`.
    #[must_use]
    pub fn graphql_url(&self, domain: &ShopDomain) -> String {
        let base = match &self.base_url {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => format!("https://{domain}"),
        };
        format!("{base}/admin/api/{}/graphql.json", self.api_version)
    }
}

/// Result of one GraphQL call.
struct QueryResponse {
    data: JsonValue,
    telemetry: Option<RateLimitTelemetry>,
}

/// Enriches events with a GraphQL query and publishes them to a sink.
///
/// Payloads without a resource id, such as deletions, are forwarded as they
/// are.
pub struct EnrichingHandler {
    vault: Arc<CredentialVault>,
    executor: RateLimitedExecutor,
    admin: AdminApi,
    sink: Arc<dyn EventSink>,
    query: EnrichmentQuery,
}

impl EnrichingHandler {
    /// Creates a handler that runs `query` for every event it receives.
    #[must_use]
    pub fn new(
        vault: Arc<CredentialVault>,
        executor: RateLimitedExecutor,
        admin: AdminApi,
        sink: Arc<dyn EventSink>,
        query: EnrichmentQuery,
    ) -> Self {
        Self {
            vault,
            executor,
            admin,
            sink,
            query,
        }
    }

    #[instrument(skip(self, metadata), fields(topic = %metadata.topic))]
    async fn enrich(
        &self,
        resource_id: &str,
        metadata: &EventMetadata,
    ) -> Result<(JsonValue, u32), HandlerError> {
        let secret = self
            .vault
            .get_secret(&metadata.domain)
            .await
            .map_err(|e| HandlerError::Downstream {
                operation: "get_secret".to_string(),
                reason: e.to_string(),
            })?
            .ok_or_else(|| HandlerError::MissingCredential {
                domain: metadata.domain.to_string(),
            })?;

        let required: Vec<&str> = self.query.required_scopes.iter().map(String::as_str).collect();
        if !secret.has_scopes(&required) {
            return Err(HandlerError::MissingScope {
                required: self.query.required_scopes.join(","),
            });
        }

        let url = self.admin.graphql_url(&metadata.domain);
        let http = &self.admin.http;
        let url = url.as_str();
        let token = secret.secret.as_str();
        let body = &serde_json::json!({
            "query": self.query.document,
            "variables": { "id": resource_id },
        });

        let context = OperationContext::new(format!("enrich_{}", metadata.namespace()))
            .for_shop(metadata.domain.clone());
        let result = self
            .executor
            .execute(&context, || async move { run_query(http, url, token, body).await })
            .await;
        let retry_count = result.retry_count;

        let response = result.into_result().map_err(|e| HandlerError::Downstream {
            operation: "enrich".to_string(),
            reason: e.to_string(),
        })?;

        if let Some(telemetry) = response.telemetry {
            self.pace(&telemetry).await;
        }

        Ok((response.data, retry_count))
    }

    /// Waits until the bucket can pay for another query of the same cost.
    async fn pace(&self, telemetry: &RateLimitTelemetry) {
        debug!(
            requested = telemetry.requested,
            actual = ?telemetry.actual,
            available = telemetry.throttle.current,
            maximum = telemetry.throttle.max,
            restore_rate = telemetry.throttle.restore_rate,
            "query cost"
        );

        let wait = telemetry
            .wait_for(telemetry.requested)
            .min(self.executor.config().max_delay());
        if !wait.is_zero() {
            info!(wait_ms = wait.as_millis() as u64, "query budget low, pausing");
            tokio::time::sleep(wait).await;
        }
    }
}

#[async_trait]
impl EventHandler for EnrichingHandler {
    async fn handle(
        &self,
        payload: &JsonValue,
        metadata: &EventMetadata,
    ) -> Result<HandlerOutcome, HandlerError> {
        let mut event = ForwardedEvent::from_delivery(payload, metadata);
        let mut retry_count = 0;

        match payload.get(RESOURCE_ID_FIELD).and_then(JsonValue::as_str) {
            Some(resource_id) => {
                let (data, retries) = self.enrich(resource_id, metadata).await?;
                event = event.with_enrichment(data);
                retry_count = retries;
            }
            None => debug!(topic = %metadata.topic, "no resource id, forwarding without enrichment"),
        }

        self.sink
            .publish(&event)
            .await
            .map_err(|e| HandlerError::Downstream {
                operation: "publish".to_string(),
                reason: e.to_string(),
            })?;

        Ok(HandlerOutcome::ok(format!("Forwarded {}", metadata.topic)).with_data(
            serde_json::json!({
                "idempotency_key": event.idempotency_key,
                "enriched": event.enrichment.is_some(),
                "retry_count": retry_count,
            }),
        ))
    }
}

async fn run_query(
    http: &reqwest::Client,
    url: &str,
    token: &str,
    body: &JsonValue,
) -> Result<QueryResponse, CallError> {
    let response = http
        .post(url)
        .header(ACCESS_TOKEN_HEADER, token)
        .json(body)
        .send()
        .await
        .map_err(|e| CallError::transport(e.to_string()))?;

    let status = response.status();
    let header_telemetry = parse_rate_limit_telemetry(response.headers());
    if !status.is_success() {
        let retry_after = parse_retry_after(response.headers());
        let message = response.text().await.unwrap_or_default();
        let error = CallError::status(status.as_u16(), message);
        return Err(match retry_after {
            Some(hint) => error.with_retry_after(hint),
            None => error,
        });
    }

    let body: JsonValue = response
        .json()
        .await
        .map_err(|e| CallError::transport(format!("invalid GraphQL response: {e}")))?;
    if let Some(errors) = body.get("errors").filter(|errors| !errors.is_null()) {
        return Err(graphql_error(errors));
    }

    let telemetry = header_telemetry.or_else(|| {
        body.get("extensions")
            .and_then(RateLimitTelemetry::from_graphql_extensions)
    });
    Ok(QueryResponse {
        data: body.get("data").cloned().unwrap_or(JsonValue::Null),
        telemetry,
    })
}

/// Converts a GraphQL `errors` array into a call error.
///
/// Throttling arrives as a 200 with a `THROTTLED` error code and is marked so
/// the executor retries it.
fn graphql_error(errors: &JsonValue) -> CallError {
    let errors = errors.as_array().map(Vec::as_slice).unwrap_or_default();
    let throttled = errors.iter().any(|error| {
        error.pointer("/extensions/code").and_then(JsonValue::as_str) == Some("THROTTLED")
    });
    let messages: Vec<&str> = errors
        .iter()
        .filter_map(|error| error.get("message").and_then(JsonValue::as_str))
        .collect();
    let message = if messages.is_empty() {
        "GraphQL error".to_string()
    } else {
        messages.join("; ")
    };

    if throttled {
        CallError::transport(format!("throttled: {message}"))
    } else {
        CallError::transport(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graphql_url_uses_shop_or_override() {
        let shop = ShopDomain::parse("acme.myshopify.com").unwrap();
        let admin = AdminApi::new(reqwest::Client::new(), "2025-01");
        assert_eq!(
            admin.graphql_url(&shop),
            "https://acme.myshopify.com/admin/api/2025-01/graphql.json"
        );

        let admin = admin.with_base_url("http://127.0.0.1:4000/");
        assert_eq!(
            admin.graphql_url(&shop),
            "http://127.0.0.1:4000/admin/api/2025-01/graphql.json"
        );
    }

    #[test]
    fn throttled_errors_are_retryable() {
        let config = storelink_executor::RetryConfig::default();
        let throttled = graphql_error(&serde_json::json!([
            { "message": "Throttled", "extensions": { "code": "THROTTLED" } }
        ]));
        assert!(storelink_executor::is_retryable(&throttled, &config));

        let invalid = graphql_error(&serde_json::json!([
            { "message": "Invalid id: gid://shopify/Order/x" }
        ]));
        assert!(!storelink_executor::is_retryable(&invalid, &config));
        assert_eq!(invalid.message, "Invalid id: gid://shopify/Order/x");
    }
}

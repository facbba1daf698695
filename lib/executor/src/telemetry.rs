//! Provider rate-limit telemetry.
//!
//! The platform reports query cost and the remaining point budget on every
//! GraphQL response, and a `used/max` call counter on every REST response.
//! Telemetry is best-effort: absent data is `None`, malformed data comes back
//! zeroed rather than as an error.

use http::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;

/// Header carrying the JSON cost object of a GraphQL call.
pub const COST_HEADER: &str = "x-shopify-graphql-cost";

/// Header carrying the REST call counter as `used/max`.
pub const CALL_LIMIT_HEADER: &str = "x-shopify-shop-api-call-limit";

/// Header carrying the seconds to wait after a 429.
pub const RETRY_AFTER_HEADER: &str = "retry-after";

/// Remaining budget in the platform's leaky bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleStatus {
    /// Bucket size in cost points.
    #[serde(rename = "maximumAvailable")]
    pub max: f64,
    /// Points currently available.
    #[serde(rename = "currentlyAvailable")]
    pub current: f64,
    /// Points restored per second.
    #[serde(rename = "restoreRate")]
    pub restore_rate: f64,
}

/// Cost of one GraphQL call plus the bucket state after it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitTelemetry {
    /// Points the query was estimated to cost.
    #[serde(rename = "requestedQueryCost")]
    pub requested: f64,
    /// Points actually charged; absent when the query did not run.
    #[serde(rename = "actualQueryCost")]
    pub actual: Option<f64>,
    /// Bucket state after the call.
    #[serde(rename = "throttleStatus")]
    pub throttle: ThrottleStatus,
}

impl RateLimitTelemetry {
    /// Parses the `cost` object of a GraphQL response's `extensions`.
    ///
    /// Returns `None` if there is no `cost` entry.
    #[must_use]
    pub fn from_graphql_extensions(extensions: &JsonValue) -> Option<Self> {
        let cost = extensions.get("cost")?;
        Some(Self::deserialize(cost).unwrap_or_default())
    }

    /// How long to wait before the bucket can pay for a query of `cost`.
    ///
    /// Zero when enough points are available or the restore rate is unknown.
    #[must_use]
    pub fn wait_for(&self, cost: f64) -> Duration {
        let deficit = cost - self.throttle.current;
        if deficit <= 0.0 || self.throttle.restore_rate <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(deficit / self.throttle.restore_rate).unwrap_or(Duration::ZERO)
    }
}

/// Parses GraphQL cost telemetry from response headers.
///
/// Returns `None` if the cost header is absent and zeroed telemetry if it is
/// present but unreadable.
#[must_use]
pub fn parse_rate_limit_telemetry(headers: &HeaderMap) -> Option<RateLimitTelemetry> {
    let value = headers.get(COST_HEADER)?;
    let parsed = value
        .to_str()
        .ok()
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_else(|| {
            tracing::debug!("malformed rate limit telemetry header");
            RateLimitTelemetry::default()
        });
    Some(parsed)
}

/// REST call counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallLimit {
    /// Calls currently counted against the bucket.
    pub used: u32,
    /// Bucket size.
    pub max: u32,
}

impl CallLimit {
    /// Returns the number of calls left before throttling.
    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.max.saturating_sub(self.used)
    }
}

/// Parses the REST call counter header.
///
/// Returns `None` if the header is absent and a zeroed counter if it is
/// present but unreadable.
#[must_use]
pub fn parse_call_limit(headers: &HeaderMap) -> Option<CallLimit> {
    let value = headers.get(CALL_LIMIT_HEADER)?;
    let parsed = value
        .to_str()
        .ok()
        .and_then(|raw| {
            let (used, max) = raw.trim().split_once('/')?;
            Some(CallLimit {
                used: used.trim().parse().ok()?,
                max: max.trim().parse().ok()?,
            })
        })
        .unwrap_or_default();
    Some(parsed)
}

/// Parses a `Retry-After` header given in (possibly fractional) seconds.
#[must_use]
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let seconds: f64 = headers
        .get(RETRY_AFTER_HEADER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()?;
    Duration::try_from_secs_f64(seconds).ok()
}

//! Deciding which failures are worth retrying.

use crate::config::RetryConfig;
use crate::error::CallError;
use storelink_core::ErrorCategory;

/// Message fragments that mark a failure as transient.
const TRANSIENT_INDICATORS: &[&str] = &[
    "rate limit",
    "too many requests",
    "throttled",
    "quota exceeded",
    "service unavailable",
    "timeout",
];

/// Fragments that mark a failure as throttling specifically.
const THROTTLE_INDICATORS: &[&str] = &["rate limit", "too many requests", "throttled", "quota exceeded"];

/// Returns true if `error` should be retried under `config`.
#[must_use]
pub fn is_retryable(error: &CallError, config: &RetryConfig) -> bool {
    if error
        .status
        .is_some_and(|status| config.retryable_status_codes.contains(&status))
    {
        return true;
    }
    message_matches(&error.message, TRANSIENT_INDICATORS)
}

/// Returns the report category for a failure.
#[must_use]
pub fn categorize(error: &CallError) -> ErrorCategory {
    if error.is_unauthorized() {
        ErrorCategory::Authentication
    } else if error.status == Some(429) || message_matches(&error.message, THROTTLE_INDICATORS) {
        ErrorCategory::RateLimit
    } else {
        ErrorCategory::ExternalApi
    }
}

fn message_matches(message: &str, indicators: &[&str]) -> bool {
    let message = message.to_ascii_lowercase();
    indicators.iter().any(|indicator| message.contains(indicator))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        let config = RetryConfig::default();
        for status in [429, 500, 502, 503, 504] {
            assert!(is_retryable(&CallError::status(status, "x"), &config));
        }
        for status in [400, 401, 403, 404, 422] {
            assert!(!is_retryable(&CallError::status(status, "x"), &config));
        }
    }

    #[test]
    fn retryable_messages() {
        let config = RetryConfig::default();
        for message in [
            "Rate limit exceeded",
            "429 Too Many Requests",
            "Throttled",
            "daily quota exceeded",
            "Service Unavailable",
            "timeout after 5000ms",
        ] {
            assert!(
                is_retryable(&CallError::transport(message), &config),
                "{message}"
            );
        }
        assert!(!is_retryable(&CallError::transport("connection reset"), &config));
    }

    #[test]
    fn unauthorized_is_not_retried() {
        let config = RetryConfig::default();
        assert!(!is_retryable(&CallError::status(401, "invalid token"), &config));
        assert!(!is_retryable(&CallError::status(403, "missing scope"), &config));
    }

    #[test]
    fn custom_status_list() {
        let mut config = RetryConfig::default();
        config.retryable_status_codes = vec![409];
        assert!(is_retryable(&CallError::status(409, "conflict"), &config));
        assert!(!is_retryable(&CallError::status(500, "boom"), &config));
    }

    #[test]
    fn categories() {
        assert_eq!(
            categorize(&CallError::status(401, "x")),
            ErrorCategory::Authentication
        );
        assert_eq!(
            categorize(&CallError::status(429, "x")),
            ErrorCategory::RateLimit
        );
        assert_eq!(
            categorize(&CallError::transport("Throttled")),
            ErrorCategory::RateLimit
        );
        assert_eq!(
            categorize(&CallError::status(503, "x")),
            ErrorCategory::ExternalApi
        );
    }
}

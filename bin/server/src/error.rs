//! Request error types for the HTTP transport.
//!
//! Each error maps to a status code and a user-safe message. Details are
//! logged, never returned.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::fmt;

/// Errors from the install and callback routes.
#[derive(Debug)]
pub enum OAuthError {
    /// A required query parameter is absent.
    MissingParameter { name: &'static str },
    /// The shop parameter is not a valid shop domain.
    InvalidShop { value: String },
    /// The callback's query signature does not verify.
    InvalidSignature,
    /// The state token is unknown, expired, or already used.
    InvalidState,
    /// The state token was issued for a different shop.
    StateMismatch,
    /// Exchanging the authorization code failed.
    TokenExchange { details: String },
    /// The vault could not issue state or store the credential.
    Vault { details: String },
}

impl fmt::Display for OAuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingParameter { name } => write!(f, "missing parameter: {name}"),
            Self::InvalidShop { value } => write!(f, "invalid shop domain: '{value}'"),
            Self::InvalidSignature => write!(f, "callback signature mismatch"),
            Self::InvalidState => write!(f, "invalid or expired state"),
            Self::StateMismatch => write!(f, "state was issued for another shop"),
            Self::TokenExchange { details } => write!(f, "token exchange failed: {details}"),
            Self::Vault { details } => write!(f, "vault error: {details}"),
        }
    }
}

impl std::error::Error for OAuthError {}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::MissingParameter { .. } => (StatusCode::BAD_REQUEST, "Missing parameter"),
            Self::InvalidShop { .. } => (StatusCode::BAD_REQUEST, "Invalid shop domain"),
            Self::InvalidSignature => (StatusCode::UNAUTHORIZED, "Invalid signature"),
            Self::InvalidState => (StatusCode::BAD_REQUEST, "Invalid or expired state"),
            Self::StateMismatch => (StatusCode::BAD_REQUEST, "State mismatch"),
            Self::TokenExchange { .. } => (StatusCode::BAD_GATEWAY, "Authentication failed"),
            Self::Vault { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        };

        match status {
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
                tracing::warn!(error = %self, "install request rejected");
            }
            _ => tracing::error!(error = %self, "install request failed"),
        }

        (status, message).into_response()
    }
}

/// Errors from the webhook route.
#[derive(Debug)]
pub enum WebhookError {
    /// Required headers are missing or malformed.
    MalformedRequest { details: String },
}

impl fmt::Display for WebhookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedRequest { details } => write!(f, "malformed webhook: {details}"),
        }
    }
}

impl std::error::Error for WebhookError {}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self, "webhook rejected");
        match self {
            Self::MalformedRequest { .. } => {
                (StatusCode::BAD_REQUEST, "Malformed webhook").into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oauth_statuses() {
        let cases = [
            (OAuthError::MissingParameter { name: "shop" }, StatusCode::BAD_REQUEST),
            (OAuthError::InvalidSignature, StatusCode::UNAUTHORIZED),
            (OAuthError::StateMismatch, StatusCode::BAD_REQUEST),
            (
                OAuthError::TokenExchange {
                    details: "status 500".to_string(),
                },
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }
}

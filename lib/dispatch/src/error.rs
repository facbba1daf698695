//! Error types for the dispatch crate.
//!
//! - `EventError`: an inbound delivery whose headers cannot be understood
//! - `HandlerError`: a handler that could not process a verified event
//! - `SinkError`: a downstream event sink that refused a forwarded event

use std::fmt;

/// Errors building an [`InboundEvent`](crate::InboundEvent) from a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// A required header is absent or not valid UTF-8.
    MissingHeader { name: &'static str },
    /// The topic has no namespace.
    InvalidTopic { topic: String },
    /// The source domain is not a valid shop domain.
    InvalidDomain { value: String },
}

impl fmt::Display for EventError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingHeader { name } => write!(f, "missing header: {name}"),
            Self::InvalidTopic { topic } => write!(f, "invalid topic: '{topic}'"),
            Self::InvalidDomain { value } => write!(f, "invalid shop domain: '{value}'"),
        }
    }
}

impl std::error::Error for EventError {}

/// Errors returned by event handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// The payload does not have the shape the handler expects.
    InvalidPayload { reason: String },
    /// A collaborator the handler depends on failed.
    Downstream { operation: String, reason: String },
    /// No usable credential is stored for the shop.
    MissingCredential { domain: String },
    /// The stored credential was not granted the scopes a query needs.
    MissingScope { required: String },
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPayload { reason } => write!(f, "invalid payload: {reason}"),
            Self::Downstream { operation, reason } => {
                write!(f, "{operation} failed: {reason}")
            }
            Self::MissingCredential { domain } => {
                write!(f, "no usable credential for {domain}")
            }
            Self::MissingScope { required } => {
                write!(f, "credential lacks required scopes: {required}")
            }
        }
    }
}

impl std::error::Error for HandlerError {}

/// Errors from an [`EventSink`](crate::EventSink).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The sink could not be reached.
    Unavailable { reason: String },
    /// The sink refused the event.
    Rejected { reason: String },
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { reason } => write!(f, "event sink unavailable: {reason}"),
            Self::Rejected { reason } => write!(f, "event sink rejected event: {reason}"),
        }
    }
}

impl std::error::Error for SinkError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            EventError::MissingHeader {
                name: "x-shopify-topic"
            }
            .to_string(),
            "missing header: x-shopify-topic"
        );
        assert_eq!(
            HandlerError::Downstream {
                operation: "delete_secret".to_string(),
                reason: "store down".to_string(),
            }
            .to_string(),
            "delete_secret failed: store down"
        );
    }
}

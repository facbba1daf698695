//! Error handling foundation for storelink.
//!
//! This module provides the `Result` type alias using rootcause and the
//! validation error for external-domain identifiers. Each crate defines its
//! own domain-specific error types in its own error module, using rootcause's
//! `.context()` to add layer-appropriate context as errors propagate.

use rootcause::Report;
use std::fmt;

/// A Result type alias using rootcause's Report for error handling.
///
/// Each layer adds its own context via `.context()` as errors propagate.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;

/// Errors from validating an external-domain identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The identifier was empty.
    Empty,
    /// The identifier is not a shop domain on the platform.
    InvalidFormat { value: String },
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "shop domain is empty"),
            Self::InvalidFormat { value } => {
                write!(f, "invalid shop domain: '{value}'")
            }
        }
    }
}

impl std::error::Error for DomainError {}

//! The external-domain identifier every credential and event is keyed by.

use crate::error::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Suffix every shop domain on the platform carries.
const PLATFORM_SUFFIX: &str = ".myshopify.com";

/// A validated shop domain such as `acme-store.myshopify.com`.
///
/// Always lower-case. The store name before the suffix is restricted to
/// ASCII letters, digits, and hyphens and may not start with a hyphen, so a
/// `ShopDomain` is safe to interpolate into storage keys and URLs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ShopDomain(String);

impl ShopDomain {
    /// Validates and normalizes a shop domain.
    ///
    /// # Errors
    ///
    /// Returns `DomainError` if the value is empty or not a platform shop domain.
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        let normalized = value.trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return Err(DomainError::Empty);
        }

        let Some(store) = normalized.strip_suffix(PLATFORM_SUFFIX) else {
            return Err(DomainError::InvalidFormat {
                value: value.to_string(),
            });
        };

        let valid_store = !store.is_empty()
            && !store.starts_with('-')
            && store
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
        if !valid_store {
            return Err(DomainError::InvalidFormat {
                value: value.to_string(),
            });
        }

        Ok(Self(normalized))
    }

    /// Returns the domain as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShopDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ShopDomain {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ShopDomain {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ShopDomain> for String {
    fn from(domain: ShopDomain) -> Self {
        domain.0
    }
}

impl AsRef<str> for ShopDomain {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

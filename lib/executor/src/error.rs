//! Error types for the executor crate.
//!
//! `CallError` is what an outbound operation returns when it fails. The
//! executor only looks at its status code, message, and retry hint to decide
//! whether to try again.

use std::fmt;
use std::time::Duration;

/// A failed outbound call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallError {
    /// HTTP status returned by the platform, if the call got that far.
    pub status: Option<u16>,
    /// Description of the failure.
    pub message: String,
    /// Server-provided minimum wait before retrying.
    pub retry_after: Option<Duration>,
}

impl CallError {
    /// A failure carrying an HTTP status.
    #[must_use]
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
            retry_after: None,
        }
    }

    /// A failure before any response was received.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            retry_after: None,
        }
    }

    /// An attempt that ran past its per-attempt timeout.
    #[must_use]
    pub fn timeout(after: Duration) -> Self {
        Self::transport(format!("timeout after {}ms", after.as_millis()))
    }

    /// Attaches a retry-after hint.
    #[must_use]
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    /// Returns true for 401 and 403.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self.status, Some(401 | 403))
    }
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "status {status}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for CallError {}

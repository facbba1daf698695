//! Categorized error reporting.
//!
//! The executor and the dispatcher hand failures they cannot surface to a
//! caller to an [`ErrorReporter`]. Reporting is fire-and-forget: a reporter
//! must not block and must not fail the operation that produced the report.

use crate::id::ReportId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// How urgently a report needs attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Returns the lowercase name of this severity.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of failure a report describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Outbound call rejected for missing or bad credentials.
    Authentication,
    /// Throttling that outlasted the retry policy.
    RateLimit,
    /// Any other failed call to the platform.
    ExternalApi,
    /// Inbound delivery with a bad signature.
    WebhookSignature,
    /// A handler failed while processing a verified delivery.
    WebhookHandler,
    /// Ciphertext failed authentication.
    Integrity,
    /// The backing store failed.
    Storage,
    /// Malformed input.
    Validation,
}

impl ErrorCategory {
    /// Returns the snake_case name of this category.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::RateLimit => "rate_limit",
            Self::ExternalApi => "external_api",
            Self::WebhookSignature => "webhook_signature",
            Self::WebhookHandler => "webhook_handler",
            Self::Integrity => "integrity",
            Self::Storage => "storage",
            Self::Validation => "validation",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single categorized failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Unique identifier.
    pub id: ReportId,
    /// How urgent the failure is.
    pub severity: Severity,
    /// What kind of failure it is.
    pub category: ErrorCategory,
    /// Human-readable description of the failure.
    pub message: String,
    /// Operation, shop domain, delivery id, and similar context.
    pub context: BTreeMap<String, String>,
    /// When the failure was observed.
    pub occurred_at: DateTime<Utc>,
}

impl ErrorReport {
    /// Creates a new report with empty context.
    #[must_use]
    pub fn new(severity: Severity, category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            id: ReportId::new(),
            severity,
            category,
            message: message.into(),
            context: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    /// Adds a context entry.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Receives categorized failures.
pub trait ErrorReporter: Send + Sync {
    /// Records a report. Must not block the caller.
    fn report(&self, report: ErrorReport);
}

/// Reporter that writes reports to the tracing subscriber.
///
/// High and critical reports are logged at error level, the rest at warn.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, report: ErrorReport) {
        let context = format!("{:?}", report.context);
        match report.severity {
            Severity::High | Severity::Critical => tracing::error!(
                report_id = %report.id,
                severity = %report.severity,
                category = %report.category,
                context = %context,
                "{}",
                report.message
            ),
            Severity::Low | Severity::Medium => tracing::warn!(
                report_id = %report.id,
                severity = %report.severity,
                category = %report.category,
                context = %context,
                "{}",
                report.message
            ),
        }
    }
}

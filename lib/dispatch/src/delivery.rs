//! The lifecycle of one inbound delivery.
//!
//! ```text
//! RECEIVED ─verify─▶ VERIFIED ─dispatch─▶ PROCESSED | FAILED | UNROUTABLE
//!     └────────────▶ REJECTED
//! ```
//!
//! `REJECTED`, `PROCESSED`, `FAILED`, and `UNROUTABLE` are terminal. Every
//! delivery reaches a terminal state and produces a [`DeliveryReport`].

use crate::dispatcher::{EventDispatcher, no_handler};
use crate::event::InboundEvent;
use crate::handler::HandlerOutcome;
use crate::signature::verify_signature;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use storelink_core::{DispatchId, ErrorCategory, ErrorReport, ErrorReporter, Severity};
use tracing::{debug, info, instrument, warn};

/// Where a delivery is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryState {
    Received,
    Verified,
    Rejected,
    Processed,
    Failed,
    Unroutable,
}

impl DeliveryState {
    /// Returns the upper-case name of this state.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "RECEIVED",
            Self::Verified => "VERIFIED",
            Self::Rejected => "REJECTED",
            Self::Processed => "PROCESSED",
            Self::Failed => "FAILED",
            Self::Unroutable => "UNROUTABLE",
        }
    }

    /// Returns true if no further transition is possible.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Received | Self::Verified)
    }

    /// Returns true if `next` is a legal successor of this state.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Received, Self::Verified | Self::Rejected)
                | (Self::Verified, Self::Processed | Self::Failed | Self::Unroutable)
        )
    }
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit record of one delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryReport {
    /// Terminal state reached.
    pub state: DeliveryState,
    /// Handler outcome; absent for rejected deliveries.
    pub outcome: Option<HandlerOutcome>,
    /// Provider-issued delivery id.
    pub delivery_id: String,
    /// Identifier of this processing attempt.
    pub dispatch_id: DispatchId,
    /// Topic of the delivery.
    pub topic: String,
}

/// Runs deliveries through verification and dispatch.
#[derive(Clone)]
pub struct Delivery {
    dispatcher: Arc<EventDispatcher>,
    reporter: Arc<dyn ErrorReporter>,
}

impl Delivery {
    /// Creates a delivery pipeline.
    #[must_use]
    pub fn new(dispatcher: Arc<EventDispatcher>, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self {
            dispatcher,
            reporter,
        }
    }

    /// Returns the dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    /// Verifies and dispatches one delivery.
    ///
    /// Rejections and handler failures are reported; the returned report
    /// always carries a terminal state.
    #[instrument(
        skip(self, event, secret),
        fields(
            topic = %event.metadata.topic,
            domain = %event.metadata.domain,
            delivery_id = %event.metadata.delivery_id,
        )
    )]
    pub async fn receive(&self, event: &InboundEvent, secret: &str) -> DeliveryReport {
        let dispatch_id = DispatchId::new();
        let mut state = DeliveryState::Received;

        if !verify_signature(&event.body, &event.signature, secret) {
            advance(&mut state, DeliveryState::Rejected);
            self.report_rejected(event, dispatch_id);
            return report(state, None, event, dispatch_id);
        }
        advance(&mut state, DeliveryState::Verified);

        if !self.dispatcher.can_route(&event.metadata.topic) {
            info!("no handler registered for topic");
            advance(&mut state, DeliveryState::Unroutable);
            let outcome = no_handler(&event.metadata.topic);
            return report(state, Some(outcome), event, dispatch_id);
        }

        let payload = match event.payload() {
            Ok(payload) => payload,
            Err(e) => {
                let outcome = HandlerOutcome::error("Payload is not valid JSON", e.to_string());
                advance(&mut state, DeliveryState::Failed);
                self.report_failed(event, dispatch_id, &outcome);
                return report(state, Some(outcome), event, dispatch_id);
            }
        };

        let (next, outcome) = match self.dispatcher.route(&payload, &event.metadata).await {
            None => {
                info!("no handler registered for topic");
                (DeliveryState::Unroutable, no_handler(&event.metadata.topic))
            }
            Some(outcome) if outcome.success => (DeliveryState::Processed, outcome),
            Some(outcome) => {
                self.report_failed(event, dispatch_id, &outcome);
                (DeliveryState::Failed, outcome)
            }
        };
        advance(&mut state, next);

        report(state, Some(outcome), event, dispatch_id)
    }

    fn report_rejected(&self, event: &InboundEvent, dispatch_id: DispatchId) {
        warn!("delivery signature rejected");
        let report = ErrorReport::new(
            Severity::High,
            ErrorCategory::WebhookSignature,
            format!("invalid signature for topic {}", event.metadata.topic),
        );
        self.reporter.report(with_event_context(report, event, dispatch_id));
    }

    fn report_failed(
        &self,
        event: &InboundEvent,
        dispatch_id: DispatchId,
        outcome: &HandlerOutcome,
    ) {
        let report = ErrorReport::new(
            Severity::Medium,
            ErrorCategory::WebhookHandler,
            outcome.message.clone(),
        );
        let error = outcome
            .data
            .as_ref()
            .and_then(|data| data.get("error"))
            .and_then(|error| error.as_str());
        let report = match error {
            Some(error) => report.with_context("error", error),
            None => report,
        };
        self.reporter.report(with_event_context(report, event, dispatch_id));
    }
}

fn advance(state: &mut DeliveryState, next: DeliveryState) {
    debug_assert!(state.can_transition_to(next), "{state} -> {next}");
    debug!(from = %state, to = %next, "delivery transition");
    *state = next;
}

fn with_event_context(
    report: ErrorReport,
    event: &InboundEvent,
    dispatch_id: DispatchId,
) -> ErrorReport {
    report
        .with_context("topic", event.metadata.topic.clone())
        .with_context("domain", event.metadata.domain.as_str())
        .with_context("delivery_id", event.metadata.delivery_id.clone())
        .with_context("dispatch_id", dispatch_id.to_string())
}

fn report(
    state: DeliveryState,
    outcome: Option<HandlerOutcome>,
    event: &InboundEvent,
    dispatch_id: DispatchId,
) -> DeliveryReport {
    DeliveryReport {
        state,
        outcome,
        delivery_id: event.metadata.delivery_id.clone(),
        dispatch_id,
        topic: event.metadata.topic.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions() {
        use DeliveryState::*;
        assert!(Received.can_transition_to(Verified));
        assert!(Received.can_transition_to(Rejected));
        assert!(Verified.can_transition_to(Processed));
        assert!(Verified.can_transition_to(Failed));
        assert!(Verified.can_transition_to(Unroutable));

        assert!(!Received.can_transition_to(Processed));
        assert!(!Rejected.can_transition_to(Verified));
        for terminal in [Rejected, Processed, Failed, Unroutable] {
            assert!(terminal.is_terminal());
            for next in [Received, Verified, Rejected, Processed, Failed, Unroutable] {
                assert!(!terminal.can_transition_to(next));
            }
        }
        assert!(!Received.is_terminal());
        assert!(!Verified.is_terminal());
    }

    #[test]
    fn state_serializes_upper_case() {
        assert_eq!(
            serde_json::to_string(&DeliveryState::Unroutable).unwrap(),
            "\"UNROUTABLE\""
        );
        assert_eq!(DeliveryState::Processed.to_string(), "PROCESSED");
    }
}

//! Webhook intake.
//!
//! Status mapping: a delivery whose signature fails is 401 and malformed
//! headers are 400. Every other outcome is 200, including handler failures,
//! because the failure has already been reported and a non-2xx would make
//! the platform redeliver an event whose side effects may have happened.

use crate::error::WebhookError;
use crate::state::AppState;
use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use std::sync::Arc;
use storelink_dispatch::{DeliveryReport, DeliveryState, InboundEvent};

/// Receives one webhook delivery.
pub async fn receive(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<DeliveryReport>), WebhookError> {
    let event = InboundEvent::from_headers(&headers, body.to_vec()).map_err(|e| {
        WebhookError::MalformedRequest {
            details: e.to_string(),
        }
    })?;

    let report = state
        .delivery
        .receive(&event, state.platform.webhook_secret())
        .await;

    tracing::info!(
        topic = %report.topic,
        delivery_id = %report.delivery_id,
        dispatch_id = %report.dispatch_id,
        state = %report.state,
        "webhook delivery complete"
    );

    Ok((status_for(report.state), Json(report)))
}

/// Maps a terminal delivery state to the response status.
fn status_for(state: DeliveryState) -> StatusCode {
    match state {
        DeliveryState::Rejected => StatusCode::UNAUTHORIZED,
        _ => StatusCode::OK,
    }
}

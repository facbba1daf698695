//! Router construction.

use crate::state::AppState;
use crate::{oauth, webhooks};
use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Builds the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/auth/install", get(oauth::install))
        .route("/auth/callback", get(oauth::callback))
        .route("/webhooks", post(webhooks::receive))
        .route("/health", get(|| async { "ok" }))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

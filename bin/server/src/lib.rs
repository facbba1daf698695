//! storelink HTTP server.
//!
//! This crate wires the vault, executor, and dispatcher to HTTP:
//! - App install (`/auth/install`, `/auth/callback`)
//! - Webhook intake (`/webhooks`)
//! - PostgreSQL key-value storage and NATS event forwarding
//! - Admin API enrichment queries for forwarded events

pub mod app;
pub mod config;
pub mod db;
pub mod enrichment;
pub mod error;
pub mod oauth;
pub mod sink;
pub mod state;
pub mod webhooks;

pub use app::router;
pub use state::AppState;

//! Shared application state.

use crate::config::PlatformConfig;
use std::sync::Arc;
use storelink_core::ErrorReporter;
use storelink_dispatch::Delivery;
use storelink_executor::RateLimitedExecutor;
use storelink_vault::CredentialVault;

/// Handles shared by every request.
pub struct AppState {
    /// Encrypted credential storage and OAuth state.
    pub vault: Arc<CredentialVault>,
    /// Retrying wrapper for outbound platform calls.
    pub executor: RateLimitedExecutor,
    /// Webhook verification and dispatch.
    pub delivery: Delivery,
    /// Sink for failures that have no caller to return to.
    pub reporter: Arc<dyn ErrorReporter>,
    /// HTTP client for outbound platform calls.
    pub http: reqwest::Client,
    /// App registration.
    pub platform: PlatformConfig,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(
        vault: Arc<CredentialVault>,
        executor: RateLimitedExecutor,
        delivery: Delivery,
        reporter: Arc<dyn ErrorReporter>,
        http: reqwest::Client,
        platform: PlatformConfig,
    ) -> Self {
        Self {
            vault,
            executor,
            delivery,
            reporter,
            http,
            platform,
        }
    }
}

//! Centralized server configuration.
//!
//! This module provides strongly-typed configuration for the server,
//! loaded via the `config` crate from environment variables.
//!
//! See [`VaultConfig`] and [`RetryConfig`] for the library sections.

use serde::Deserialize;
use storelink_executor::RetryConfig;
use storelink_vault::VaultConfig;

/// Keys whose environment values are comma-separated lists.
const LIST_KEYS: &[&str] = &[
    "platform.scopes",
    "webhooks.forward_namespaces",
    "webhooks.enrich_namespaces",
    "retry.retryable_status_codes",
];

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// PostgreSQL database connection URL.
    pub database_url: String,

    /// Address the HTTP listener binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// NATS server URL. Forwarded events are logged instead when unset.
    #[serde(default)]
    pub nats_url: Option<String>,

    /// App credentials and install settings.
    pub platform: PlatformConfig,

    /// Credential vault configuration.
    pub vault: VaultConfig,

    /// Retry policy for outbound platform calls.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Webhook intake configuration.
    #[serde(default)]
    pub webhooks: WebhookConfig,

    /// Background maintenance configuration.
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
}

/// App registration on the platform.
#[derive(Clone, Deserialize)]
pub struct PlatformConfig {
    /// App API key (OAuth client id).
    pub api_key: String,

    /// App API secret (OAuth client secret). Also signs install callbacks.
    pub api_secret: String,

    /// Access scopes requested at install.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Callback URL registered with the platform.
    pub redirect_url: String,

    /// Webhook signing secret. Defaults to the API secret.
    #[serde(default)]
    pub webhook_secret: Option<String>,

    /// Overrides `https://<shop>` for admin endpoints.
    /// Only useful for local proxies and tests.
    #[serde(default)]
    pub admin_base_url: Option<String>,

    /// Admin API version enrichment queries run against.
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

impl PlatformConfig {
    /// Returns the secret webhook signatures are verified with.
    #[must_use]
    pub fn webhook_secret(&self) -> &str {
        self.webhook_secret.as_deref().unwrap_or(&self.api_secret)
    }
}

impl std::fmt::Debug for PlatformConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformConfig")
            .field("api_key", &self.api_key)
            .field("scopes", &self.scopes)
            .field("redirect_url", &self.redirect_url)
            .field("admin_base_url", &self.admin_base_url)
            .field("api_version", &self.api_version)
            .finish_non_exhaustive()
    }
}

/// Webhook intake configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    /// Topic namespaces forwarded to the event sink.
    #[serde(default = "default_forward_namespaces")]
    pub forward_namespaces: Vec<String>,

    /// Forwarded namespaces whose events are enriched with Admin API data
    /// before publishing. Namespaces without a built-in query are forwarded
    /// as they are.
    #[serde(default = "default_forward_namespaces")]
    pub enrich_namespaces: Vec<String>,
}

fn default_forward_namespaces() -> Vec<String> {
    ["orders", "products", "customers"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            forward_namespaces: default_forward_namespaces(),
            enrich_namespaces: default_forward_namespaces(),
        }
    }
}

/// Background maintenance configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MaintenanceConfig {
    /// Interval between purges of expired key-value rows, in seconds.
    #[serde(default = "default_purge_interval_seconds")]
    pub purge_interval_seconds: u64,
}

fn default_api_version() -> String {
    "2025-01".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_purge_interval_seconds() -> u64 {
    300
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            purge_interval_seconds: default_purge_interval_seconds(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// Nested keys use `__`, e.g. `PLATFORM__API_KEY`. List values are
    /// comma-separated.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let environment = LIST_KEYS.iter().fold(
            config::Environment::default()
                .separator("__")
                .list_separator(",")
                .try_parsing(true),
            |environment, key| environment.with_list_parse_key(key),
        );

        config::Config::builder()
            .add_source(environment)
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_json(json: &str) -> ServerConfig {
        config::Config::builder()
            .add_source(config::File::from_str(json, config::FileFormat::Json))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    const MINIMAL: &str = r#"{
        "database_url": "postgres://localhost/storelink",
        "platform": {
            "api_key": "key",
            "api_secret": "secret",
            "redirect_url": "https://app.example.com/auth/callback"
        },
        "vault": {
            "master_secret": "master",
            "kdf_salt": "deployment-salt"
        }
    }"#;

    #[test]
    fn minimal_config_has_correct_defaults() {
        let config = from_json(MINIMAL);
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.nats_url, None);
        assert_eq!(config.vault.state_ttl_seconds, 600);
        assert_eq!(config.retry, RetryConfig::default());
        assert_eq!(
            config.webhooks.forward_namespaces,
            vec!["orders", "products", "customers"]
        );
        assert_eq!(
            config.webhooks.enrich_namespaces,
            config.webhooks.forward_namespaces
        );
        assert_eq!(config.platform.api_version, "2025-01");
        assert_eq!(config.maintenance.purge_interval_seconds, 300);
    }

    #[test]
    fn webhook_secret_falls_back_to_api_secret() {
        let mut config = from_json(MINIMAL);
        assert_eq!(config.platform.webhook_secret(), "secret");

        config.platform.webhook_secret = Some("hooks".to_string());
        assert_eq!(config.platform.webhook_secret(), "hooks");
    }

    #[test]
    fn debug_hides_secrets() {
        let config = from_json(MINIMAL);
        let debug = format!("{:?}", config.platform);
        assert!(debug.contains("key"));
        assert!(!debug.contains("secret"));
    }
}

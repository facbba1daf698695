//! App install flow.
//!
//! - `/auth/install?shop=...` issues a state token and redirects to the
//!   platform's authorize page
//! - `/auth/callback` verifies the callback, consumes the state, exchanges the
//!   code for an access token, and stores it in the vault

use crate::error::OAuthError;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::response::Redirect;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::sync::Arc;
use storelink_core::{ErrorCategory, ErrorReport, Severity, ShopDomain};
use storelink_executor::{CallError, OperationContext, parse_retry_after};
use storelink_vault::{StateValidation, parse_scope};
use subtle::ConstantTimeEq;
use tracing::{debug, info, instrument};
use url::Url;

type HmacSha256 = Hmac<Sha256>;

/// Query parameters for the install route.
#[derive(Debug, Deserialize)]
pub struct InstallQuery {
    shop: String,
}

/// Body of the access token request.
#[derive(Serialize)]
struct AccessTokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    code: &'a str,
}

/// Response of the access token request.
#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: String,
    #[serde(default)]
    scope: String,
}

/// Starts an install by redirecting to the platform's authorize page.
pub async fn install(
    State(state): State<Arc<AppState>>,
    Query(query): Query<InstallQuery>,
) -> Result<Redirect, OAuthError> {
    let shop = parse_shop(&query.shop)?;

    let token = state
        .vault
        .issue_state(&shop)
        .await
        .map_err(|e| vault_failure(&state, &shop, "issue_state", e.to_string()))?;

    let url = authorize_url(&state, &shop, &token)?;
    debug!(shop = %shop, "redirecting to authorize page");
    Ok(Redirect::to(url.as_str()))
}

/// Completes an install.
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Redirect, OAuthError> {
    let signature = required(&params, "hmac")?;
    if !verify_query_signature(&params, signature, &state.platform.api_secret) {
        return Err(OAuthError::InvalidSignature);
    }

    let shop = parse_shop(required(&params, "shop")?)?;
    let code = required(&params, "code")?;
    let token = required(&params, "state")?;

    match state.vault.consume_state(token).await {
        StateValidation::Valid { domain } if domain == shop => {}
        StateValidation::Valid { .. } => return Err(OAuthError::StateMismatch),
        StateValidation::Invalid => return Err(OAuthError::InvalidState),
    }

    let tokens = exchange_code(&state, &shop, code).await?;
    state
        .vault
        .store_secret(&shop, &tokens.access_token, &parse_scope(&tokens.scope))
        .await
        .map_err(|e| vault_failure(&state, &shop, "store_secret", e.to_string()))?;

    info!(shop = %shop, "app installed");
    let admin_url = format!("https://{shop}/admin/apps/{}", state.platform.api_key);
    Ok(Redirect::to(&admin_url))
}

/// Reports a vault failure and converts it for the response.
fn vault_failure(
    state: &AppState,
    shop: &ShopDomain,
    operation: &'static str,
    details: String,
) -> OAuthError {
    let report = ErrorReport::new(
        Severity::High,
        ErrorCategory::Storage,
        format!("vault {operation} failed during install: {details}"),
    )
    .with_context("operation", operation)
    .with_context("domain", shop.as_str());
    state.reporter.report(report);
    OAuthError::Vault { details }
}

/// Builds the authorize URL for `shop`.
fn authorize_url(state: &AppState, shop: &ShopDomain, token: &str) -> Result<Url, OAuthError> {
    let mut url = Url::parse(&format!("https://{shop}/admin/oauth/authorize")).map_err(|_| {
        OAuthError::InvalidShop {
            value: shop.to_string(),
        }
    })?;
    url.query_pairs_mut()
        .append_pair("client_id", &state.platform.api_key)
        .append_pair("scope", &state.platform.scopes.join(","))
        .append_pair("redirect_uri", &state.platform.redirect_url)
        .append_pair("state", token);
    Ok(url)
}

/// Returns the access token endpoint for `shop`.
fn token_url(state: &AppState, shop: &ShopDomain) -> String {
    match &state.platform.admin_base_url {
        Some(base) => format!("{}/admin/oauth/access_token", base.trim_end_matches('/')),
        None => format!("https://{shop}/admin/oauth/access_token"),
    }
}

/// Exchanges an authorization code for an access token through the executor.
#[instrument(skip(state, shop, code), fields(shop = %shop))]
async fn exchange_code(
    state: &AppState,
    shop: &ShopDomain,
    code: &str,
) -> Result<AccessTokenResponse, OAuthError> {
    let url = token_url(state, shop);
    let http = &state.http;
    let url = url.as_str();
    let body = &AccessTokenRequest {
        client_id: &state.platform.api_key,
        client_secret: &state.platform.api_secret,
        code,
    };

    let context = OperationContext::new("exchange_access_token").for_shop(shop.clone());
    let result = state
        .executor
        .execute(&context, || async move {
            let response = http
                .post(url)
                .json(body)
                .send()
                .await
                .map_err(|e| CallError::transport(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let retry_after = parse_retry_after(response.headers());
                let message = response.text().await.unwrap_or_default();
                let error = CallError::status(status.as_u16(), message);
                return Err(match retry_after {
                    Some(hint) => error.with_retry_after(hint),
                    None => error,
                });
            }

            response
                .json::<AccessTokenResponse>()
                .await
                .map_err(|e| CallError::transport(format!("invalid token response: {e}")))
        })
        .await;

    result.into_result().map_err(|e| OAuthError::TokenExchange {
        details: e.to_string(),
    })
}

/// Verifies the hex HMAC the platform puts on install callbacks.
///
/// The message is every parameter except `hmac`, sorted by key and joined
/// as `key=value` pairs with `&`.
fn verify_query_signature(
    params: &BTreeMap<String, String>,
    signature: &str,
    secret: &str,
) -> bool {
    let Ok(provided) = hex::decode(signature) else {
        return false;
    };
    let expected = query_digest(params, secret);
    expected.as_slice().ct_eq(provided.as_slice()).into()
}

fn query_digest(params: &BTreeMap<String, String>, secret: &str) -> Vec<u8> {
    let message = params
        .iter()
        .filter(|(key, _)| key.as_str() != "hmac")
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return Vec::new();
    };
    mac.update(message.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

fn required<'a>(
    params: &'a BTreeMap<String, String>,
    name: &'static str,
) -> Result<&'a str, OAuthError> {
    params
        .get(name)
        .map(String::as_str)
        .filter(|value| !value.is_empty())
        .ok_or(OAuthError::MissingParameter { name })
}

fn parse_shop(value: &str) -> Result<ShopDomain, OAuthError> {
    ShopDomain::parse(value).map_err(|_| OAuthError::InvalidShop {
        value: value.to_string(),
    })
}

/// Signs callback parameters the way the platform does. Test helper.
#[cfg(test)]
pub(crate) fn sign_query(params: &BTreeMap<String, String>, secret: &str) -> String {
    hex::encode(query_digest(params, secret))
}

//! Router tests against in-memory collaborators.

use async_trait::async_trait;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use storelink_core::{ErrorCategory, ErrorReport, ErrorReporter, ShopDomain};
use storelink_dispatch::{
    AppLifecycleHandler, Delivery, EventDispatcher, ForwardingHandler, MemorySink,
    compute_signature,
};
use storelink_executor::{RateLimitedExecutor, RetryConfig};
use storelink_server::config::PlatformConfig;
use storelink_server::{AppState, router};
use storelink_vault::cipher::KEY_LEN;
use storelink_vault::{CredentialVault, KeyValueStore, MemoryStore, SecretCipher, StoreError};
use tower::ServiceExt;
use url::Url;

const API_KEY: &str = "app-key";
const API_SECRET: &str = "app-secret";

#[derive(Default)]
struct RecordingReporter {
    reports: Mutex<Vec<ErrorReport>>,
}

impl RecordingReporter {
    fn reports(&self) -> Vec<ErrorReport> {
        self.reports.lock().unwrap().clone()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, report: ErrorReport) {
        self.reports.lock().unwrap().push(report);
    }
}

/// Store whose every operation fails.
struct UnavailableStore;

#[async_trait]
impl KeyValueStore for UnavailableStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(unavailable())
    }

    async fn put(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> Result<(), StoreError> {
        Err(unavailable())
    }

    async fn delete_if_exists(&self, _key: &str) -> Result<bool, StoreError> {
        Err(unavailable())
    }

    async fn take(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(unavailable())
    }
}

fn unavailable() -> StoreError {
    StoreError::Unavailable {
        reason: "connection refused".to_string(),
    }
}

struct Harness {
    state: Arc<AppState>,
    sink: Arc<MemorySink>,
    reporter: Arc<RecordingReporter>,
}

fn harness(admin_base_url: Option<String>) -> Harness {
    harness_with_store(admin_base_url, Arc::new(MemoryStore::new()))
}

fn harness_with_store(admin_base_url: Option<String>, store: Arc<dyn KeyValueStore>) -> Harness {
    let reporter = Arc::new(RecordingReporter::default());
    let vault = Arc::new(CredentialVault::new(
        SecretCipher::from_key(&[1u8; KEY_LEN]),
        store,
        Duration::from_secs(600),
    ));
    let sink = Arc::new(MemorySink::new());

    let mut dispatcher = EventDispatcher::new();
    dispatcher.register_handler(
        AppLifecycleHandler::NAMESPACE,
        Arc::new(AppLifecycleHandler::new(vault.clone())),
    );
    dispatcher.register_handler("orders", Arc::new(ForwardingHandler::new(sink.clone())));

    let retry = RetryConfig::default()
        .with_max_retries(1)
        .with_delays(Duration::from_millis(100), Duration::from_millis(200));

    let platform = PlatformConfig {
        api_key: API_KEY.to_string(),
        api_secret: API_SECRET.to_string(),
        scopes: vec!["read_orders".to_string(), "write_products".to_string()],
        redirect_url: "https://app.example.com/auth/callback".to_string(),
        webhook_secret: None,
        admin_base_url,
        api_version: "2025-01".to_string(),
    };

    let state = Arc::new(AppState::new(
        vault,
        RateLimitedExecutor::new(retry, reporter.clone()),
        Delivery::new(Arc::new(dispatcher), reporter.clone()),
        reporter.clone(),
        reqwest::Client::new(),
        platform,
    ));

    Harness {
        state,
        sink,
        reporter,
    }
}

fn shop() -> ShopDomain {
    ShopDomain::parse("acme.myshopify.com").unwrap()
}

fn webhook(topic: &str, body: &str, signature: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhooks")
        .header("x-shopify-topic", topic)
        .header("x-shopify-shop-domain", "acme.myshopify.com")
        .header("x-shopify-webhook-id", "b54557e4-bdd9-4b37-8a5f-bf7d70bcd043")
        .header("x-shopify-hmac-sha256", signature)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Runs the install route and returns the issued state token.
async fn install(h: &Harness) -> String {
    let response = router(h.state.clone())
        .oneshot(get("/auth/install?shop=acme.myshopify.com"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let location = response.headers()[header::LOCATION].to_str().unwrap();
    let url = Url::parse(location).unwrap();
    url.query_pairs()
        .find(|(key, _)| key == "state")
        .map(|(_, value)| value.into_owned())
        .unwrap()
}

fn callback_uri(shop: &str, code: &str, state: &str, secret: &str) -> String {
    let mut params = BTreeMap::new();
    params.insert("code", code);
    params.insert("shop", shop);
    params.insert("state", state);
    params.insert("timestamp", "1337178173");

    let message = params
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(message.as_bytes());
    let hmac = hex::encode(mac.finalize().into_bytes());

    format!("/auth/callback?{message}&hmac={hmac}")
}

#[tokio::test]
async fn health() {
    let response = router(harness(None).state)
        .oneshot(get("/health"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn install_redirects_to_authorize_page() {
    let h = harness(None);
    let response = router(h.state.clone())
        .oneshot(get("/auth/install?shop=ACME.myshopify.com"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let location = response.headers()[header::LOCATION].to_str().unwrap();
    let url = Url::parse(location).unwrap();
    assert_eq!(url.host_str(), Some("acme.myshopify.com"));
    assert_eq!(url.path(), "/admin/oauth/authorize");

    let query: BTreeMap<_, _> = url.query_pairs().into_owned().collect();
    assert_eq!(query["client_id"], API_KEY);
    assert_eq!(query["scope"], "read_orders,write_products");
    assert_eq!(query["redirect_uri"], "https://app.example.com/auth/callback");
    assert_eq!(query["state"].len(), 64);
    assert!(query["state"].bytes().all(|b| b.is_ascii_hexdigit()));
}

#[tokio::test]
async fn install_rejects_foreign_domain() {
    let response = router(harness(None).state)
        .oneshot(get("/auth/install?shop=evil.example.com"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn install_with_unavailable_vault_is_reported() {
    let h = harness_with_store(None, Arc::new(UnavailableStore));
    let response = router(h.state.clone())
        .oneshot(get("/auth/install?shop=acme.myshopify.com"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let reports = h.reporter.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].category, ErrorCategory::Storage);
    assert_eq!(reports[0].context["operation"], "issue_state");
    assert_eq!(reports[0].context["domain"], "acme.myshopify.com");
}

#[tokio::test]
async fn callback_exchanges_code_and_stores_token() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/admin/oauth/access_token")
        .match_body(mockito::Matcher::PartialJson(serde_json::json!({
            "client_id": API_KEY,
            "client_secret": API_SECRET,
            "code": "c0de",
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"shpat_abc123","scope":"read_orders,write_products"}"#)
        .create_async()
        .await;

    let h = harness(Some(server.url()));
    let state = install(&h).await;

    let response = router(h.state.clone())
        .oneshot(get(&callback_uri(
            "acme.myshopify.com",
            "c0de",
            &state,
            API_SECRET,
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    mock.assert_async().await;

    let secret = h.state.vault.get_secret(&shop()).await.unwrap().unwrap();
    assert_eq!(secret.secret, "shpat_abc123");
    assert_eq!(secret.scope, vec!["read_orders", "write_products"]);
}

#[tokio::test]
async fn callback_state_is_single_use() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/admin/oauth/access_token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"shpat_abc123","scope":"read_orders"}"#)
        .create_async()
        .await;

    let h = harness(Some(server.url()));
    let state = install(&h).await;
    let uri = callback_uri("acme.myshopify.com", "c0de", &state, API_SECRET);

    let first = router(h.state.clone()).oneshot(get(&uri)).await.unwrap();
    assert_eq!(first.status(), StatusCode::SEE_OTHER);

    let replay = router(h.state.clone()).oneshot(get(&uri)).await.unwrap();
    assert_eq!(replay.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn callback_rejects_state_for_another_shop() {
    let h = harness(None);
    let state = install(&h).await;

    let response = router(h.state.clone())
        .oneshot(get(&callback_uri(
            "other.myshopify.com",
            "c0de",
            &state,
            API_SECRET,
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn callback_rejects_bad_signature_without_consuming_state() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/admin/oauth/access_token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"shpat_abc123","scope":""}"#)
        .create_async()
        .await;

    let h = harness(Some(server.url()));
    let state = install(&h).await;

    let forged = router(h.state.clone())
        .oneshot(get(&callback_uri(
            "acme.myshopify.com",
            "c0de",
            &state,
            "wrong-secret",
        )))
        .await
        .unwrap();
    assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);

    let genuine = router(h.state.clone())
        .oneshot(get(&callback_uri(
            "acme.myshopify.com",
            "c0de",
            &state,
            API_SECRET,
        )))
        .await
        .unwrap();
    assert_eq!(genuine.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn callback_reports_rejected_exchange_as_bad_gateway() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/admin/oauth/access_token")
        .with_status(401)
        .with_body("invalid code")
        .expect(1)
        .create_async()
        .await;

    let h = harness(Some(server.url()));
    let state = install(&h).await;

    let response = router(h.state.clone())
        .oneshot(get(&callback_uri(
            "acme.myshopify.com",
            "c0de",
            &state,
            API_SECRET,
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    mock.assert_async().await;
    assert!(h.state.vault.get_secret(&shop()).await.unwrap().is_none());
    assert!(h.reporter.reports().iter().all(|r| r.category != ErrorCategory::Storage));
}

#[tokio::test]
async fn signed_webhook_is_processed() {
    let h = harness(None);
    let body = r#"{"id":820982911946154508}"#;
    let signature = compute_signature(body.as_bytes(), API_SECRET);

    let response = router(h.state.clone())
        .oneshot(webhook("orders/create", body, &signature))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let report = json_body(response).await;
    assert_eq!(report["state"], "PROCESSED");
    assert_eq!(report["delivery_id"], "b54557e4-bdd9-4b37-8a5f-bf7d70bcd043");
    assert_eq!(h.sink.events().len(), 1);
}

#[tokio::test]
async fn forged_webhook_is_unauthorized() {
    let h = harness(None);
    let body = r#"{"id":820982911946154508}"#;
    let signature = compute_signature(body.as_bytes(), "not-the-secret");

    let response = router(h.state.clone())
        .oneshot(webhook("orders/create", body, &signature))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(h.sink.events().is_empty());
}

#[tokio::test]
async fn unroutable_webhook_is_acknowledged() {
    let h = harness(None);
    let body = r#"{"id":1}"#;
    let signature = compute_signature(body.as_bytes(), API_SECRET);

    let response = router(h.state.clone())
        .oneshot(webhook("fulfillments/create", body, &signature))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["state"], "UNROUTABLE");
}

#[tokio::test]
async fn webhook_without_headers_is_bad_request() {
    let request = Request::builder()
        .method("POST")
        .uri("/webhooks")
        .body(Body::from("{}"))
        .unwrap();

    let response = router(harness(None).state)
        .oneshot(request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn uninstall_webhook_revokes_credential() {
    let h = harness(None);
    h.state
        .vault
        .store_secret(&shop(), "shpat_abc123", &[])
        .await
        .unwrap();

    let body = r#"{"id":548380009,"domain":"acme.myshopify.com"}"#;
    let signature = compute_signature(body.as_bytes(), API_SECRET);
    let response = router(h.state.clone())
        .oneshot(webhook("app/uninstalled", body, &signature))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(h.state.vault.get_secret(&shop()).await.unwrap().is_none());
}

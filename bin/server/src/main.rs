use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use storelink_core::{ErrorReporter, TracingReporter};
use storelink_dispatch::{
    AdminApi, AppLifecycleHandler, Delivery, EnrichingHandler, EventDispatcher, EventHandler,
    EventSink, ForwardingHandler,
};
use storelink_executor::RateLimitedExecutor;
use storelink_server::config::ServerConfig;
use storelink_server::db::PgKeyValueStore;
use storelink_server::enrichment;
use storelink_server::sink::{LogEventSink, NatsEventSink};
use storelink_server::{AppState, router};
use storelink_vault::CredentialVault;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env()?;
    tracing::info!("Loaded configuration");

    // Create database connection pool
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&db_pool).await?;

    let store = PgKeyValueStore::new(db_pool);
    purge_expired(&store).await;

    // Spawn periodic purge of expired state and credentials
    let purge_store = store.clone();
    let purge_interval = Duration::from_secs(config.maintenance.purge_interval_seconds);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(purge_interval);
        loop {
            interval.tick().await;
            purge_expired(&purge_store).await;
        }
    });

    // Argon2 key derivation
    tracing::info!("Deriving vault key...");
    let vault = Arc::new(
        CredentialVault::from_config(&config.vault, Arc::new(store))
            .map_err(|e| e.to_string())?,
    );

    let reporter: Arc<dyn ErrorReporter> = Arc::new(TracingReporter);
    let executor = RateLimitedExecutor::new(config.retry.clone(), reporter.clone());

    let sink: Arc<dyn EventSink> = match &config.nats_url {
        Some(url) => {
            tracing::info!("Connecting to NATS...");
            Arc::new(NatsEventSink::connect(url).await?)
        }
        None => {
            tracing::warn!("No NATS URL configured; forwarded events will only be logged");
            Arc::new(LogEventSink)
        }
    };

    let http = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()?;
    let mut admin = AdminApi::new(http.clone(), config.platform.api_version.clone());
    if let Some(base_url) = &config.platform.admin_base_url {
        admin = admin.with_base_url(base_url.clone());
    }

    let mut dispatcher = EventDispatcher::new();
    dispatcher.register_handler(
        AppLifecycleHandler::NAMESPACE,
        Arc::new(AppLifecycleHandler::new(vault.clone())),
    );
    let forwarding: Arc<dyn EventHandler> = Arc::new(ForwardingHandler::new(sink.clone()));
    for namespace in &config.webhooks.forward_namespaces {
        let enrichment = config
            .webhooks
            .enrich_namespaces
            .contains(namespace)
            .then(|| enrichment::query_for(namespace))
            .flatten();
        let handler: Arc<dyn EventHandler> = match enrichment {
            Some(query) => Arc::new(EnrichingHandler::new(
                vault.clone(),
                executor.clone(),
                admin.clone(),
                sink.clone(),
                query,
            )),
            None => forwarding.clone(),
        };
        dispatcher.register_handler(namespace.clone(), handler);
    }
    tracing::info!(namespaces = ?dispatcher.namespaces(), "Registered webhook handlers");

    let delivery = Delivery::new(Arc::new(dispatcher), reporter.clone());

    let app_state = Arc::new(AppState::new(
        vault,
        executor,
        delivery,
        reporter,
        http,
        config.platform,
    ));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("listening on http://{}", config.bind_addr);

    axum::serve(listener, router(app_state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

async fn purge_expired(store: &PgKeyValueStore) {
    match store.purge_expired().await {
        Ok(count) if count > 0 => {
            tracing::debug!(purged_entries = count, "Purged expired key-value entries");
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(error = %e, "Failed to purge expired key-value entries");
        }
    }
}

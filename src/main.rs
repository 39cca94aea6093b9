//! Rodada backend server
//!
//! Rents out dockless bikes over WhatsApp: the chat webhook drives a
//! per-rider conversation, unlock codes open IoT locks, and a watchdog
//! closes rides when the lock reports itself bolted again.

use axum::extract::State;
use axum::http::{HeaderValue, Method};
use axum::{routing::get, Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};

use rodada_server::assistant::AssistantClient;
use rodada_server::billing::BillingService;
use rodada_server::chat::{ChatEngine, SessionStore};
use rodada_server::config::Config;
use rodada_server::db;
use rodada_server::iot::IotClient;
use rodada_server::messaging::WhatsAppClient;
use rodada_server::middleware;
use rodada_server::payments::CheckoutClient;
use rodada_server::registry::RegistryService;
use rodada_server::riders::RiderService;
use rodada_server::rides::{RideService, RideWatchdog};
use rodada_server::routes;
use rodada_server::state::AppState;
use rodada_server::tokens::TokenStore;

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .init();

    tracing::info!(environment = %config.environment.as_str(), "Starting Rodada server");

    let db_pool = match db::create_pool(&config).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = db::run_migrations(&db_pool).await {
        tracing::error!("Failed to run migrations: {}", e);
        std::process::exit(1);
    }

    // Wire up services. Cross-service calls all go through these Arcs.
    let registry = Arc::new(RegistryService::new(db_pool.clone()));
    let tokens = Arc::new(TokenStore::new(
        db_pool.clone(),
        config.unlock_token_ttl_secs,
    ));
    let riders = Arc::new(RiderService::new(db_pool.clone()));
    let sessions = SessionStore::new(db_pool.clone());

    let messaging = Arc::new(WhatsAppClient::new(
        config.whatsapp_api_url.clone(),
        config.whatsapp_account_sid.clone(),
        config.whatsapp_auth_token.clone(),
        config.whatsapp_from.clone(),
    ));
    let assistant = Arc::new(AssistantClient::new(
        config.assistant_api_url.clone(),
        config.assistant_api_key.clone(),
        config.assistant_model.clone(),
    ));
    let checkout = Arc::new(CheckoutClient::new(
        config.payment_api_url.clone(),
        config.payment_access_token.clone(),
        config.public_base_url.clone(),
    ));
    let iot = Arc::new(IotClient::new(
        config.iot_api_url.clone(),
        config.iot_app_key.clone(),
        config.iot_app_secret.clone(),
        config.iot_account.clone(),
        config.iot_password.clone(),
        config.iot_request_timeout_secs,
    ));

    let billing = Arc::new(BillingService::new(db_pool.clone(), checkout.clone()));
    let rides = Arc::new(RideService::new(
        db_pool.clone(),
        sessions.clone(),
        messaging.clone(),
    ));
    let chat_engine = Arc::new(ChatEngine::new(
        db_pool.clone(),
        sessions.clone(),
        registry.clone(),
        tokens.clone(),
        riders.clone(),
        billing.clone(),
        messaging.clone(),
        assistant.clone(),
    ));

    let app_state = AppState::new(
        chat_engine,
        tokens.clone(),
        riders.clone(),
        rides.clone(),
        billing.clone(),
        iot.clone(),
        messaging.clone(),
        sessions.clone(),
        db_pool.clone(),
    );

    // Vendor tokens rotate in the background so unlocks never pay the
    // authentication round trip.
    tokio::spawn(iot.clone().run_refresh_loop(config.iot_token_refresh_secs));

    let watchdog = Arc::new(RideWatchdog::new(
        db_pool.clone(),
        rides.clone(),
        iot.clone(),
        tokens.clone(),
    ));
    // The scheduler stops firing if this handle drops.
    let _scheduler = match watchdog.start(&config.watchdog_schedule).await {
        Ok(scheduler) => scheduler,
        Err(e) => {
            tracing::error!("Failed to start ride watchdog: {:#}", e);
            std::process::exit(1);
        }
    };

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .merge(routes::chat_routes())
        .merge(routes::unlock_routes())
        .merge(routes::payment_routes())
        .with_state(app_state)
        .layer(axum::middleware::from_fn(middleware::security_headers))
        .layer(axum::middleware::from_fn(middleware::request_tracing))
        .layer(configure_cors(&config));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Webhook endpoint at http://{}/webhook", addr);
    tracing::info!("Health check at http://{}/health", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server shutdown complete");
}

async fn root() -> &'static str {
    "Rodada API Server"
}

#[derive(serde::Serialize)]
struct HealthResponse {
    status: String,
    database: String,
    version: String,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = match db::check_health(&state.db_pool).await {
        Ok(()) => "connected".to_string(),
        Err(e) => format!("error: {}", e),
    };

    let status = if database == "connected" {
        "healthy"
    } else {
        "unhealthy"
    };

    Json(HealthResponse {
        status: status.to_string(),
        database,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

fn configure_cors(config: &Config) -> CorsLayer {
    let Some(allowed_origins) = config.cors_allowed_origins.as_deref() else {
        return CorsLayer::permissive();
    };

    let origins: Vec<HeaderValue> = allowed_origins
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}

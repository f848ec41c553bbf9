//! Axum-based API gateway: the HTTP + WebSocket surface over the core.
//!
//! Exit codes: 0 normal shutdown; 1 fatal startup error (no model backend
//! available); 2 configuration error.

mod handlers;
mod state;

use axum::routing::{get, post};
use axum::Router;
use state::AppState;
use std::process::ExitCode;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use aegis_core::{build_engine, CoreConfig, Credentials};

fn router(app_state: AppState) -> Router {
    // CORS allow-all for IoT/mobile clients; gzip on large responses.
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    let compression = CompressionLayer::new();

    Router::new()
        .route("/chat", post(handlers::chat::chat))
        .route("/clear", post(handlers::chat::clear))
        .route("/ws/chat", get(handlers::chat::ws_chat))
        .route("/api/privacy-status", get(handlers::privacy::privacy_status))
        .route("/api/request-cloud-access", post(handlers::privacy::request_cloud_access))
        .route("/api/brain-stats", get(handlers::stats::brain_stats))
        .route("/api/task-history", get(handlers::stats::task_history))
        .route("/api/agent-performance", get(handlers::stats::agent_performance))
        .route("/api/orchestrator-status", get(handlers::stats::orchestrator_status))
        .layer(cors)
        .layer(compression)
        .with_state(app_state)
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = match CoreConfig::load() {
        Ok(config) => config,
        Err(err) => {
            error!("configuration error: {}", err);
            return ExitCode::from(2);
        }
    };
    let creds = Credentials::from_env();

    let engine = match build_engine(&config, &creds).await {
        Ok(engine) => engine,
        Err(err) => {
            error!("startup failed: {}", err);
            return ExitCode::from(1);
        }
    };
    if !engine.orchestrator().any_backend_available() {
        error!(
            "no model backend available: start the local runtime at {} or configure a cloud key",
            config.local_base_url
        );
        return ExitCode::from(1);
    }

    let app_state = AppState::new(Arc::new(engine));

    // One periodic timer drives all memory housekeeping: cortex tick every
    // minute, integration sync every five, full consolidation hourly.
    let maintenance = Arc::clone(&app_state.engine);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        let mut ticks: u64 = 0;
        loop {
            interval.tick().await;
            ticks += 1;
            let memory = maintenance.memory();
            memory.cortex().tick();
            if ticks % 5 == 0 {
                memory.sync();
            }
            if ticks % 60 == 0 {
                memory.consolidate();
            }
        }
    });

    let app = router(app_state.clone());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("cannot bind {}: {}", addr, err);
            return ExitCode::from(1);
        }
    };
    info!("{} listening on {}", config.app_name, addr);

    if let Err(err) = axum::serve(listener, app).await {
        error!("server error: {}", err);
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

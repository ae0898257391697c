use axum::extract::State;
use axum::{http::Method, response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

mod config;
mod database;
mod errors;
mod handlers;
mod models;
mod routes;
mod scoring;
mod services;
mod state;

use config::{AppConfig, StoreBackend};
use database::connection::get_db_client;
use services::memory_store::MemoryStore;
use services::mongo_store::MongoStore;
use services::score_store::ScoreStore;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!(config = %config.get_config_info(), "configuration loaded");

    let store = initialize_store(&config).await?;
    let addr = SocketAddr::new(config.host.parse()?, config.port);
    let app_state = AppState::new(store, config);

    let app = build_router(app_state);
    start_server(app, addr).await
}

async fn initialize_store(config: &AppConfig) -> anyhow::Result<Arc<dyn ScoreStore>> {
    match config.store_backend {
        StoreBackend::Memory => {
            tracing::warn!("using in-memory store, nothing survives a restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Mongo => {
            let db = get_db_client(config).await?;
            let store = MongoStore::new(db);
            store.ensure_indexes().await?;
            tracing::info!("MongoDB store ready");
            Ok(Arc::new(store))
        }
    }
}

fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(false);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_check))
        .route("/api/health", get(api_health_check))
        .nest("/api/matches", routes::matches::routes())
        .nest("/api/tournaments", routes::tournaments::routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

async fn start_server(app: Router, addr: SocketAddr) -> anyhow::Result<()> {
    tracing::info!("🚀 Server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        tracing::error!("Failed to bind to {}: {}", addr, e);
        e
    })?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn root_handler() -> &'static str {
    "🏏 Cricket Scoring API"
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn api_health_check(State(state): State<AppState>) -> Json<Value> {
    let store_status = match state.store.ping().await {
        Ok(_) => "connected",
        Err(e) => {
            tracing::warn!(error = %e, "store ping failed");
            "disconnected"
        }
    };

    Json(json!({
        "status": "healthy",
        "store": store_status,
        "backend": state.store.backend(),
        "live_matches": state.matches.live_count().await,
        "config": state.config.get_config_info(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

//! HTTP server setup and startup bootstrap.

use axum::{
    routing::{get, post},
    Router,
};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::config::Config;
use crate::providers::credentials::{process_env, EnvLookup};
use crate::providers::ProviderRegistry;
use crate::storage;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::SqlitePool,
    pub http_client: Client,
    pub registry: Arc<ProviderRegistry>,
    pub config: Arc<Config>,
    pub env: EnvLookup,
    /// Upstream URL for the models-list passthrough; swapped out in tests.
    pub models_url: String,
}

/// Create the axum router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // OpenAI-compatible endpoints, versioned and bare
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .route("/chat/completions", post(handlers::chat_completions))
        .route("/v1/models", get(handlers::list_models))
        .route("/models", get(handlers::list_models))
        .route("/health", get(handlers::health))
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP server.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let listen_addr = config.server.listen.clone();
    let db_path = config.database().path;

    let pool = storage::init_pool(&db_path).await?;
    storage::prices::seed_from_catalog(&pool).await?;
    if let Some(wanted) = &config.default_configuration {
        storage::configurations::upsert_default(&pool, wanted).await?;
    }

    // Create HTTP client with reasonable defaults
    let http_client = Client::builder()
        .timeout(Duration::from_secs(120))
        .connect_timeout(Duration::from_secs(10))
        .build()?;

    let env = process_env();
    let registry = Arc::new(ProviderRegistry::builtin(http_client.clone(), env.clone()));

    let state = AppState {
        pool,
        http_client,
        registry,
        config: Arc::new(config),
        env,
        models_url: handlers::OPENAI_MODELS_URL.to_string(),
    };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(address = %listen_addr, "Starting llmlens proxy server");

    axum::serve(listener, app).await?;

    Ok(())
}

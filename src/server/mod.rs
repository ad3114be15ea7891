//! HTTP server for the recommendation service

pub mod http;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::service::MlService;

/// Training payloads carry whole audit histories
const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

/// Shared server state
#[derive(Clone)]
pub struct ServerState {
    pub service: Arc<MlService>,
}

/// Build the application router
pub fn router(state: ServerState) -> Router {
    let cors = cors_layer(&state.service.config().server.allowed_origins);

    let api = Router::new()
        .route("/train", post(http::train_handler))
        .route("/recommend", post(http::recommend_handler))
        .route("/feedback", post(http::feedback_handler))
        .route("/retrain", post(http::retrain_handler))
        .route("/health", get(http::health_handler));

    Router::new()
        .route("/", get(http::root_handler))
        .route("/health", get(http::health_handler))
        .nest("/api/ml", api)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(allowed))
}

/// Start the web server and run until Ctrl+C
pub async fn start(config: Config) -> Result<()> {
    let addr: SocketAddr = config
        .server
        .bind_address()
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.server.bind_address()))?;

    info!("{} starting", crate::info());
    info!("Environment: {}", config.server.environment);
    info!("Model path: {}", config.storage.model_dir.display());
    info!("CORS origins: {}", config.server.allowed_origins.join(", "));

    let service = tokio::task::spawn_blocking(move || MlService::open(config))
        .await
        .context("Service startup task failed")?
        .context("Failed to open model storage")?;
    let state = ServerState {
        service: Arc::new(service),
    };

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("ML service shutting down");
        })
        .await
        .context("Server error")?;

    Ok(())
}

pub mod extractors;
pub mod handlers;
pub mod middleware;

use crate::{
    config::{DECISION_THRESHOLD, INPUT_SIZE},
    models::ModelRegistry,
    utils::error::ValidatorError,
    validation::ViewpointValidator,
    Config, Result,
};
use axum::{
    extract::{DefaultBodyLimit, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, timeout::TimeoutLayer};

/// 处理器共享状态
#[derive(Clone)]
pub struct AppState {
    pub validator: ViewpointValidator,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(validator: ViewpointValidator, config: Config) -> Self {
        Self {
            validator,
            config: Arc::new(config),
        }
    }
}

pub async fn serve(config: Config) -> Result<()> {
    let registry = Arc::new(ModelRegistry::new(&config));

    if config.model_config.preload {
        let registry = Arc::clone(&registry);
        tokio::task::spawn_blocking(move || registry.preload())
            .await
            .map_err(|e| ValidatorError::Internal(format!("Model preload failed: {}", e)))?;
    }

    let validator = ViewpointValidator::new(registry, &config);
    let state = AppState::new(validator, config.clone());
    let app = create_app(state);

    let addr: SocketAddr = config.bind_addr.parse().map_err(|e| {
        ValidatorError::Config(format!("Invalid bind address {}: {}", config.bind_addr, e))
    })?;

    tracing::info!("Server starting on http://{}", addr);
    tracing::info!("API endpoints:");
    tracing::info!("  GET  /              - Service status");
    tracing::info!("  POST /validate      - Multipart upload (image, angle)");
    tracing::info!("  POST /validate/json - JSON base64 upload");
    tracing::info!("  GET  /health        - Health check");
    tracing::info!("  GET  /api/info      - Service information");

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        ValidatorError::Internal(format!("Failed to bind to address {}: {}", addr, e))
    })?;

    axum::serve(listener, app)
        .await
        .map_err(|e| ValidatorError::Internal(format!("Server failed to start: {}", e)))?;

    Ok(())
}

pub fn create_app(state: AppState) -> Router {
    let max_request_size = state.config.server_config.max_request_size;
    let request_timeout = Duration::from_secs(state.config.server_config.request_timeout);

    Router::new()
        .route("/", get(root_handler))
        .route("/validate", post(handlers::validate_upload_handler))
        .route("/validate/json", post(handlers::validate_json_handler))
        .route("/health", get(health_handler))
        .route("/api/info", get(info_handler))
        .layer(axum::middleware::from_fn(middleware::request_logging))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_request_size))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root_handler() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Viewpoint validator API is running",
        "status": "healthy"
    }))
}

/// 健康检查端点
async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "models_loaded": state.validator.registry().loaded_labels(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// 服务信息端点
async fn info_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let registry = state.validator.registry();
    let model_config = &state.config.model_config;

    Json(json!({
        "service": "Viewpoint Validator",
        "version": env!("CARGO_PKG_VERSION"),
        "description": env!("CARGO_PKG_DESCRIPTION"),
        "labels": registry.labels(),
        "input_size": [INPUT_SIZE, INPUT_SIZE],
        "threshold": DECISION_THRESHOLD,
        "normalization": model_config.normalization,
        "model_output": model_config.output,
        "models": registry.stats(),
    }))
}

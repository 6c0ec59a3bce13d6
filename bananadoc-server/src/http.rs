//! BananaDoc HTTP REST API
//!
//! Each endpoint is a thin axum handler over an inner function returning
//! `(StatusCode, serde_json::Value)`, so the logic is testable without
//! going through the router.
//!
//! Endpoints:
//! - GET  /health           service and model status
//! - GET  /version          server version info
//! - POST /predict          classify a base64 leaf image
//! - POST /chat             ask the assistant about the current diagnosis
//! - POST /clear-context    forget the diagnosis and chat history
//! - GET  /context          raw conversation snapshot (opt-in)
//! - GET  /deficiencies     known deficiency labels
//! - GET  /deficiency/:name knowledge-base entry for one label

use std::sync::Arc;

use anyhow::Result;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use bananadoc_core::{
    imaging, knowledge, validation, BananaDocConfig, Classifier, ConversationCoordinator,
    PredictionRecord,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub coordinator: Arc<ConversationCoordinator>,
    /// `None` when the model file could not be loaded at startup.
    pub classifier: Option<Arc<dyn Classifier>>,
    pub config: BananaDocConfig,
}

/// Largest accepted request body: a base64 image at the size limit plus the
/// JSON around it.
pub const BODY_LIMIT: usize = validation::MAX_IMAGE_BYTES * 4 / 3 + 64 * 1024;

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/predict", post(predict_handler))
        .route("/chat", post(chat_handler))
        .route("/clear-context", post(clear_context_handler))
        .route("/context", get(context_handler))
        .route("/deficiencies", get(deficiencies_handler))
        .route("/deficiency/:name", get(deficiency_handler))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .with_state(state)
}

/// Serve `state` on the configured address until the shutdown signal fires.
pub async fn start_http_server(
    state: HttpState,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", state.config.http.host, state.config.http.port);
    let app = build_router(Arc::new(state));

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("BananaDoc API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request / Response DTOs
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct PredictRequest {
    pub image: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ChatRequest {
    pub query: Option<String>,
    /// Diagnosis to answer against instead of the stored one.
    pub context: Option<PredictionRecord>,
}

/// Standard HTTP error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            error: msg.into(),
            status: "error".to_string(),
        }
    }
}

fn error(status: StatusCode, msg: impl Into<String>) -> (StatusCode, serde_json::Value) {
    (status, serde_json::json!(ErrorResponse::new(msg)))
}

/// Body that failed JSON extraction. A missing content type stays 415, an
/// oversized body 413, and everything else is a 400.
fn rejection_error(rejection: &JsonRejection) -> (StatusCode, serde_json::Value) {
    let status = match rejection.status() {
        s if s == StatusCode::UNSUPPORTED_MEDIA_TYPE || s == StatusCode::PAYLOAD_TOO_LARGE => s,
        _ => StatusCode::BAD_REQUEST,
    };
    tracing::debug!(status = %status, error = %rejection, "Rejected request body");
    error(status, rejection.body_text())
}

const INTERNAL_ERROR: &str = "An internal error occurred. Please try again later.";

// ============================================================================
// Inner (directly testable) functions
// ============================================================================

pub fn health_inner(state: &HttpState) -> (StatusCode, serde_json::Value) {
    (
        StatusCode::OK,
        serde_json::json!({
            "status": "healthy",
            "model_loaded": state.classifier.is_some(),
            "llm_enabled": state.coordinator.llm_enabled(),
            "version": env!("CARGO_PKG_VERSION"),
        }),
    )
}

pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "service": "bananadoc",
    })
}

/// Decode, classify, and make the result the current diagnosis.
pub async fn predict_inner(state: &HttpState, req: PredictRequest) -> (StatusCode, serde_json::Value) {
    let Some(image) = req.image else {
        return error(StatusCode::BAD_REQUEST, "No image provided");
    };

    let bytes = match validation::decode_image_payload(&image) {
        Ok(b) => b,
        Err(e) => return error(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let Some(classifier) = &state.classifier else {
        return error(StatusCode::SERVICE_UNAVAILABLE, "Model not loaded");
    };

    let tensor = match imaging::preprocess(&bytes) {
        Ok(t) => t,
        Err(e) => return error(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let scores = match classifier.classify(tensor).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(classifier = classifier.name(), error = %e, "Prediction failed");
            return error(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR);
        }
    };

    let record = match classifier.mapping().to_prediction(&scores) {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(error = %e, "Could not interpret model output");
            return error(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR);
        }
    };

    state.coordinator.update_with_prediction(record.clone()).await;
    (StatusCode::OK, serde_json::json!(record))
}

pub async fn chat_inner(state: &HttpState, req: ChatRequest) -> (StatusCode, serde_json::Value) {
    let Some(query) = req.query else {
        return error(StatusCode::BAD_REQUEST, "No query provided");
    };

    match state.coordinator.process_query(&query, req.context).await {
        Ok(reply) => (StatusCode::OK, serde_json::json!(reply)),
        Err(e) => error(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

pub async fn clear_context_inner(state: &HttpState) -> (StatusCode, serde_json::Value) {
    state.coordinator.clear().await;
    (
        StatusCode::OK,
        serde_json::json!({ "message": "Context cleared successfully" }),
    )
}

pub async fn context_inner(state: &HttpState) -> (StatusCode, serde_json::Value) {
    if !state.config.service.expose_context {
        return error(
            StatusCode::FORBIDDEN,
            "This endpoint is not available in production",
        );
    }
    (StatusCode::OK, serde_json::json!(state.coordinator.snapshot().await))
}

pub fn deficiencies_inner() -> serde_json::Value {
    serde_json::json!({ "deficiencies": knowledge::all_labels() })
}

pub fn deficiency_inner(name: &str) -> (StatusCode, serde_json::Value) {
    if let Err(e) = validation::validate_deficiency_name(name) {
        return error(StatusCode::BAD_REQUEST, e.to_string());
    }
    (StatusCode::OK, serde_json::json!(knowledge::info_for(name)))
}

// ============================================================================
// Axum handler wrappers
// ============================================================================

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state);
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn predict_handler(
    State(state): State<Arc<HttpState>>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> impl IntoResponse {
    let (status, body) = match payload {
        Ok(Json(req)) => predict_inner(&state, req).await,
        Err(rejection) => rejection_error(&rejection),
    };
    (status, Json(body))
}

pub async fn chat_handler(
    State(state): State<Arc<HttpState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> impl IntoResponse {
    let (status, body) = match payload {
        Ok(Json(req)) => chat_inner(&state, req).await,
        Err(rejection) => rejection_error(&rejection),
    };
    (status, Json(body))
}

pub async fn clear_context_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = clear_context_inner(&state).await;
    (status, Json(body))
}

pub async fn context_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = context_inner(&state).await;
    (status, Json(body))
}

pub async fn deficiencies_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(deficiencies_inner()))
}

pub async fn deficiency_handler(Path(name): Path<String>) -> impl IntoResponse {
    let (status, body) = deficiency_inner(&name);
    (status, Json(body))
}

// ============================================================================
// Unit Tests
// ============================================================================

//! HTTP handlers for the `/api/ml` routes

use axum::{
    extract::{rejection::JsonRejection, Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::audit::AuditInstance;
use crate::error::MlError;
use crate::feedback::FeedbackEvent;
use crate::server::ServerState;
use crate::service::join_training;
use crate::types::Level;

/// Service name reported by `GET /`
const SERVICE_NAME: &str = "ML Recommendation Service";

/// Train and retrain request
#[derive(Debug, Deserialize)]
pub struct TrainRequest {
    #[serde(default)]
    pub instances: Vec<AuditInstance>,
}

/// Recommendation request
#[derive(Debug, Deserialize)]
pub struct RecommendRequest {
    pub question_text: String,
    pub current_response: i64,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub context: Option<Map<String, Value>>,
}

/// Map a service error onto a status code and JSON body
fn error_response(err: MlError) -> Response {
    let (status, error) = match &err {
        MlError::InsufficientData { .. } => (StatusCode::BAD_REQUEST, "Insufficient training data"),
        MlError::InvalidFeedback { .. } => (StatusCode::BAD_REQUEST, "Invalid feedback"),
        MlError::NotTrained => (StatusCode::BAD_REQUEST, "Model not trained"),
        MlError::Storage { .. } | MlError::Serialization(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "Storage failure")
        }
        MlError::Classifier(_) | MlError::Task(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "Training failure")
        }
    };
    if status.is_server_error() {
        warn!("Request failed: {}", err);
    }
    (
        status,
        Json(json!({
            "error": error,
            "details": err.to_string()
        })),
    )
        .into_response()
}

fn bad_request(error: &str, details: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "error": error,
            "details": details
        })),
    )
        .into_response()
}

/// A body axum could not extract keeps its status code but gets the
/// `{"error", "details"}` shape used everywhere else
fn rejection_response(rejection: JsonRejection) -> Response {
    warn!("Rejected request body: {}", rejection.body_text());
    (
        rejection.status(),
        Json(json!({
            "error": "Invalid request body",
            "details": rejection.body_text()
        })),
    )
        .into_response()
}

/// `POST /api/ml/train`
pub async fn train_handler(
    State(state): State<ServerState>,
    payload: Result<Json<TrainRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejection_response(rejection),
    };
    info!("Training request with {} instances", req.instances.len());
    let instances_used = req.instances.len();

    match join_training(state.service.spawn_train(req.instances)).await {
        Ok(metrics) => (
            StatusCode::OK,
            Json(json!({
                "status": "success",
                "message": format!("Modelo entrenado exitosamente con {} instancias", instances_used),
                "metrics": metrics
            })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// `POST /api/ml/recommend`
pub async fn recommend_handler(
    State(state): State<ServerState>,
    payload: Result<Json<RecommendRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejection_response(rejection),
    };
    let Some(current) = Level::from_score(req.current_response) else {
        return bad_request(
            "Invalid current_response",
            format!("current_response must be between 0 and 3, got {}", req.current_response),
        );
    };
    let comment = req.comment.unwrap_or_default();
    let context = req.context.unwrap_or_default();

    match state.service.predict(&req.question_text, current, &comment, &context) {
        Ok(recommendation) => (
            StatusCode::OK,
            Json(json!({
                "status": "success",
                "recommendation": recommendation
            })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// `POST /api/ml/feedback`
pub async fn feedback_handler(
    State(state): State<ServerState>,
    payload: Result<Json<FeedbackEvent>, JsonRejection>,
) -> Response {
    let Json(event) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejection_response(rejection),
    };
    let service = state.service.clone();
    let result = tokio::task::spawn_blocking(move || service.submit_feedback(&event))
        .await
        .map_err(|e| MlError::Task(e.to_string()))
        .and_then(|r| r);

    match result {
        Ok(receipt) => (
            StatusCode::OK,
            Json(json!({
                "status": "feedback_received",
                "pending_count": receipt.pending_count,
                "message": "Feedback guardado exitosamente"
            })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// `POST /api/ml/retrain`
pub async fn retrain_handler(
    State(state): State<ServerState>,
    payload: Result<Json<TrainRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejection_response(rejection),
    };
    info!("Retrain request with {} historical instances", req.instances.len());

    match join_training(state.service.spawn_retrain(req.instances)).await {
        Ok(report) => (
            StatusCode::OK,
            Json(json!({
                "status": "success",
                "message": format!(
                    "Modelo re-entrenado exitosamente con {} instancias",
                    report.metrics.instances_used
                ),
                "metrics": report.metrics,
                "feedback_stats": report.feedback_stats
            })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// `GET /health` and `GET /api/ml/health`
pub async fn health_handler(State(state): State<ServerState>) -> Response {
    match state.service.health() {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => error_response(e),
    }
}

/// `GET /`
pub async fn root_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let server = &state.service.config().server;
    Json(json!({
        "service": SERVICE_NAME,
        "status": "running",
        "version": crate::VERSION,
        "environment": server.environment,
        "allowed_origins": server.allowed_origins
    }))
}

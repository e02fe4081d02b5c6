//! HTTP API: pipeline triggers, prediction, health checks and Prometheus metrics

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use churn_lib::{
    health::{components, ComponentStatus, HealthRegistry},
    promotion::PublishFault,
    ChurnPredictor, PipelineError, PromotionOrchestrator, TrainingPipeline,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub trainer: TrainingPipeline,
    pub publisher: PromotionOrchestrator,
    pub predictor: ChurnPredictor,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        trainer: TrainingPipeline,
        publisher: PromotionOrchestrator,
        predictor: ChurnPredictor,
    ) -> Self {
        Self {
            health_registry,
            trainer,
            publisher,
            predictor,
        }
    }
}

/// Body of `POST /predict`
#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub records: Vec<Map<String, Value>>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: String) -> axum::response::Response {
    (status, Json(ErrorBody { error: message })).into_response()
}

async fn index() -> impl IntoResponse {
    let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    format!("Namaste. Current date and time is: {now}")
}

/// Run the training pipeline; the report carries success or failure
async fn train(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let report = state.trainer.run().await;

    let failure = (!report.success).then(|| {
        report
            .messages
            .last()
            .cloned()
            .unwrap_or_else(|| "training failed".to_string())
    });
    state
        .health_registry
        .record_run(components::TRAINING, failure.as_deref(), report.storage_fault)
        .await;

    Json(report)
}

/// Run the publish workflow
async fn publish(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let report = state.publisher.run().await;

    let failure = report.fault.map(|_| {
        report
            .messages
            .last()
            .cloned()
            .unwrap_or_else(|| "publish failed".to_string())
    });
    let storage_fault = matches!(
        report.fault,
        Some(PublishFault::Storage | PublishFault::PartialPromotion)
    );
    state
        .health_registry
        .record_run(components::PUBLISHER, failure.as_deref(), storage_fault)
        .await;

    Json(report)
}

/// Score customer records with the live production model
async fn predict(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PredictRequest>,
) -> axum::response::Response {
    match state.predictor.predict(&request.records).await {
        Ok(response) => {
            state
                .health_registry
                .record_run(components::PREDICTOR, None, false)
                .await;
            Json(response).into_response()
        }
        Err(e) => {
            let status = match &e {
                PipelineError::NoProductionModel => StatusCode::NOT_FOUND,
                PipelineError::EmptyDataset
                | PipelineError::InvalidData(_)
                | PipelineError::MissingColumn(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            if status.is_server_error() {
                error!(error = %e, "Prediction request failed");
                state
                    .health_registry
                    .record_run(components::PREDICTOR, Some(&e.to_string()), e.is_storage_fault())
                    .await;
            }
            error_response(status, e.to_string())
        }
    }
}

/// Health check response - 200 while operational, 503 when unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> axum::response::Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/train", get(train))
        .route("/publish", get(publish))
        .route("/predict", post(predict))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

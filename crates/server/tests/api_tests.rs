//! Integration tests for the churn service API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use churn_lib::{
    health::{components, HealthRegistry},
    observability::{PipelineMetrics, StructuredLogger},
    store::{ArtifactStore, MemoryArtifactStore, StoreOperation},
    ChurnPredictor, PipelineSettings, PromotionOrchestrator, TrainingPipeline,
};
use churn_server::api::{create_router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn customer_csv(rows: usize) -> String {
    let mut csv = String::from(
        "CustomerID,Age,Gender,Tenure,Support Calls,Payment Delay,Subscription Type,Last Interaction,Churn\n",
    );
    for i in 0..rows {
        let churn = i % 2;
        let calls = if churn == 1 { 7 + i % 3 } else { i % 3 };
        let gender = if i % 3 == 0 { "Female" } else { "Male" };
        let plan = ["Basic", "Standard", "Premium"][i % 3];
        csv.push_str(&format!(
            "{i},{},{gender},{},{calls},{},{plan},{},{churn}\n",
            20 + i % 40,
            1 + i % 24,
            i % 30,
            1 + i % 20
        ));
    }
    csv
}

async fn setup_test_app() -> (Router, Arc<AppState>, Arc<MemoryArtifactStore>) {
    let store = Arc::new(MemoryArtifactStore::new());
    let settings = PipelineSettings::default();
    let metrics = PipelineMetrics::new();
    let logger = StructuredLogger::new("test-project");

    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let state = Arc::new(AppState::new(
        health_registry,
        TrainingPipeline::new(store.clone(), settings.clone(), metrics.clone(), logger.clone()),
        PromotionOrchestrator::new(store.clone(), settings.clone(), metrics.clone(), logger.clone()),
        ChurnPredictor::new(store.clone(), settings, metrics, logger),
    ));
    let router = create_router(state.clone());

    (router, state, store)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let (status, body) = get(app, uri).await;
    (status, serde_json::from_slice(&body).unwrap())
}

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

fn customer(calls: u32) -> Value {
    json!({
        "CustomerID": 1001,
        "Age": 35,
        "Gender": "Male",
        "Tenure": 12,
        "Support Calls": calls,
        "Payment Delay": 4,
        "Subscription Type": "Basic",
        "Last Interaction": 3
    })
}

#[tokio::test]
async fn test_index_greets_with_time() {
    let (app, _state, _store) = setup_test_app().await;

    let (status, body) = get(&app, "/").await;

    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(body)
        .unwrap()
        .starts_with("Namaste. Current date and time is: "));
}

#[tokio::test]
async fn test_train_publish_predict_flow() {
    let (app, _state, store) = setup_test_app().await;
    store
        .write("data/raw/customers.csv", customer_csv(80).as_bytes())
        .await
        .unwrap();

    let (status, report) = get_json(&app, "/train").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["success"], true, "{report}");
    let staged_model = report["model"].as_str().unwrap().to_string();

    let (status, report) = get_json(&app, "/publish").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["outcome"], "bootstrapped");
    assert_eq!(report["promoted"], true);
    assert_eq!(
        report["live_model"].as_str().unwrap(),
        staged_model.replace("models/stage/", "models/prod/")
    );
    assert_eq!(report["states"][0], "start");
    assert_eq!(report["states"].as_array().unwrap().last().unwrap(), "reported");

    let (status, response) = post_json(
        &app,
        "/predict",
        json!({ "records": [customer(9), customer(0)] }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{response}");
    assert_eq!(response["model"], report["live_model"]);
    let predictions = response["predictions"].as_array().unwrap();
    assert_eq!(predictions.len(), 2);
    for prediction in predictions {
        let probability = prediction["probability"].as_f64().unwrap();
        assert!((0.0..=1.0).contains(&probability));
    }
}

#[tokio::test]
async fn test_train_without_data_degrades_training() {
    let (app, _state, _store) = setup_test_app().await;

    let (status, report) = get_json(&app, "/train").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["success"], false);

    let (status, health) = get_json(&app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["components"][components::TRAINING]["status"], "degraded");
}

#[tokio::test]
async fn test_publish_with_nothing_staged() {
    let (app, _state, _store) = setup_test_app().await;

    let (status, report) = get_json(&app, "/publish").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["outcome"], "nothing_staged");
    assert_eq!(report["promoted"], false);
    assert!(report["live_model"].is_null());
}

#[tokio::test]
async fn test_publish_storage_fault_marks_store_unhealthy() {
    let (app, state, store) = setup_test_app().await;
    state.health_registry.set_ready(true).await;
    store.fail_on(StoreOperation::List, "models/").await;

    let (_, report) = get_json(&app, "/publish").await;
    assert_eq!(report["outcome"], "failed");
    assert_eq!(report["fault"], "storage");

    let (status, health) = get_json(&app, "/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["components"][components::STORE]["status"], "unhealthy");

    let (status, _) = get_json(&app, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_predict_without_production_model_is_404() {
    let (app, _state, _store) = setup_test_app().await;

    let (status, body) = post_json(&app, "/predict", json!({ "records": [customer(1)] })).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("no production model"));
}

#[tokio::test]
async fn test_predict_with_empty_records_is_400() {
    let (app, _state, _store) = setup_test_app().await;

    let (status, _) = post_json(&app, "/predict", json!({ "records": [] })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_readyz_returns_503_when_not_ready() {
    let (app, _state, _store) = setup_test_app().await;

    let (status, readiness) = get_json(&app, "/readyz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);
}

#[tokio::test]
async fn test_readyz_returns_ok_when_ready() {
    let (app, state, _store) = setup_test_app().await;
    state.health_registry.set_ready(true).await;

    let (status, readiness) = get_json(&app, "/readyz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, _state, _store) = setup_test_app().await;
    get(&app, "/publish").await;

    let (status, body) = get(&app, "/metrics").await;

    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("churn_pipeline_runs_total"));
}

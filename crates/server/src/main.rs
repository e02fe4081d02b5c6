//! Churn Server - customer churn training, promotion and prediction service
//!
//! Builds the artifact store once, wires it into every pipeline and serves
//! the HTTP API until interrupted.

use anyhow::{Context, Result};
use churn_lib::{
    create_store,
    health::HealthRegistry,
    observability::{PipelineMetrics, StructuredLogger},
    ChurnPredictor, PromotionOrchestrator, TrainingPipeline,
};
use churn_server::{api, config::ServiceConfig};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // optional .env file; real environment variables take precedence
    dotenvy::dotenv().ok();

    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting churn-server");

    let config = ServiceConfig::load()?;
    let settings = config.pipeline_settings()?;
    info!(
        project = %config.project_id,
        bucket = %config.bucket_name,
        stage = %settings.stage_prefix,
        prod = %settings.prod_prefix,
        "Service configured"
    );

    let store = create_store(config.store_backend()?).context("failed to create artifact store")?;

    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let metrics = PipelineMetrics::new();
    let logger = StructuredLogger::new(&config.project_id);
    logger.log_startup(SERVICE_VERSION, &config.bucket_name, store.backend());

    let trainer = TrainingPipeline::new(store.clone(), settings.clone(), metrics.clone(), logger.clone());
    let publisher =
        PromotionOrchestrator::new(store.clone(), settings.clone(), metrics.clone(), logger.clone());
    let predictor = ChurnPredictor::new(store, settings, metrics, logger.clone());

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        trainer,
        publisher,
        predictor,
    ));

    health_registry.set_ready(true).await;

    let server = api::serve(config.port, app_state);
    tokio::select! {
        result = server => {
            if let Err(e) = &result {
                error!(error = %e, "API server stopped");
            }
            result?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for shutdown signal")?;
            logger.log_shutdown("SIGINT received");
            info!("Shutting down");
        }
    }

    Ok(())
}

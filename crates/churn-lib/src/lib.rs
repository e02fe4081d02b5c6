//! Customer churn pipeline library
//!
//! This crate provides the core functionality for:
//! - Artifact storage (local filesystem, Google Cloud Storage, in-memory)
//! - Training a churn classifier and staging it with its evaluation table
//! - Promoting staged models into production
//! - Scoring customers with the live production model
//! - Health checks and observability

pub mod error;
pub mod evaluation;
pub mod health;
pub mod naming;
pub mod observability;
pub mod predictor;
pub mod promotion;
pub mod settings;
pub mod store;
pub mod training;

pub use error::{EvaluationError, NamingError, PipelineError, PipelineResult, StoreError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use observability::{PipelineMetrics, StructuredLogger};
pub use predictor::{ChurnPrediction, ChurnPredictor, PredictionResponse};
pub use promotion::{PromotionOrchestrator, PublishOutcome, PublishReport, PublishState};
pub use settings::PipelineSettings;
pub use store::{create_store, ArtifactHandle, ArtifactStore, StoreBackend};
pub use training::{Algorithm, TrainingPipeline, TrainingReport};

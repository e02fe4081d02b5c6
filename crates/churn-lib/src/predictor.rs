//! Scoring customer records with the live production model
//!
//! The live model is the sibling of the latest production evaluation table,
//! the same artifact publishing reports as live.

use crate::error::{PipelineError, PipelineResult};
use crate::evaluation::find_latest_evaluation;
use crate::naming::derive_model_name;
use crate::observability::{pipelines, PipelineMetrics, StructuredLogger};
use crate::settings::PipelineSettings;
use crate::store::ArtifactStore;
use crate::training::{load_transforms, preprocess, Dataset, ModelArtifact, PreprocessMode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Prediction for one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChurnPrediction {
    /// 1 when the customer is predicted to churn
    pub churn: u8,
    pub probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub model: String,
    pub predictions: Vec<ChurnPrediction>,
}

#[derive(Clone)]
pub struct ChurnPredictor {
    store: Arc<dyn ArtifactStore>,
    settings: PipelineSettings,
    metrics: PipelineMetrics,
    logger: StructuredLogger,
}

impl ChurnPredictor {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        settings: PipelineSettings,
        metrics: PipelineMetrics,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            store,
            settings,
            metrics,
            logger,
        }
    }

    /// Score raw customer records
    pub async fn predict(&self, records: &[Map<String, Value>]) -> PipelineResult<PredictionResponse> {
        let started = Instant::now();
        let result = self.score(records).await;

        let outcome = match &result {
            Ok(response) => {
                self.metrics.add_predictions(response.predictions.len() as u64);
                self.logger
                    .log_predictions(&response.model, response.predictions.len());
                "success"
            }
            Err(e) => {
                warn!(error = %e, "Prediction failed");
                if e.is_storage_fault() {
                    self.metrics.inc_storage_errors();
                }
                "failed"
            }
        };
        self.metrics
            .observe_run(pipelines::PREDICT, outcome, started.elapsed().as_secs_f64());
        result
    }

    async fn score(&self, records: &[Map<String, Value>]) -> PipelineResult<PredictionResponse> {
        if records.is_empty() {
            return Err(PipelineError::EmptyDataset);
        }
        let store = self.store.as_ref();

        let latest = find_latest_evaluation(store, &self.settings.prod_prefix)
            .await?
            .ok_or(PipelineError::NoProductionModel)?;
        let model_name = derive_model_name(&latest.handle.name)?;
        let artifact = ModelArtifact::from_bytes(&store.read(&model_name).await?)?;
        let transforms = load_transforms(store, &self.settings.processed_data_prefix).await?;
        debug!(model = %model_name, records = records.len(), "Scoring records");

        let input = Dataset::from_records(records)?;
        let prepared = preprocess(input, PreprocessMode::Inference(&transforms))?;
        let features = prepared
            .dataset
            .numeric_matrix(&artifact.model.feature_names)?;

        let predictions = features
            .iter()
            .map(|row| {
                let probability = artifact.model.predict_proba(row);
                ChurnPrediction {
                    churn: u8::from(probability >= 0.5),
                    probability,
                }
            })
            .collect();

        Ok(PredictionResponse {
            model: model_name,
            predictions,
        })
    }
}

//! End-to-end training run
//!
//! load raw data -> preprocess (fit) -> persist processed data and transforms
//! -> split -> train -> evaluate -> export model and evaluation to stage
//!
//! Each step appends a message to the report; the first failing step ends
//! the run.

use super::classifier::{LogisticRegression, ModelArtifact, TrainingOptions};
use super::dataset::{load_raw_data, Dataset};
use super::metrics::evaluate;
use super::preprocess::{preprocess, save_transforms, PreprocessMode, PROCESSED_DATA_FILE, TARGET_COLUMN};
use super::Algorithm;
use crate::error::{PipelineError, PipelineResult};
use crate::naming::{evaluation_file_name, join, model_file_name, run_timestamp};
use crate::observability::{pipelines, PipelineMetrics, StructuredLogger};
use crate::settings::PipelineSettings;
use crate::store::{replace, ArtifactStore};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Share of records held out for evaluation
pub const TEST_FRACTION: f64 = 0.2;

/// Shuffle seed, fixed so reruns on the same data produce the same split
pub const SPLIT_SEED: u64 = 7;

/// Shuffle `0..n` and cut it into `(train, test)` index sets
///
/// The test set takes `ceil(n * test_fraction)` indices.
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);
    let test_len = ((n as f64 * test_fraction).ceil() as usize).min(n);
    let train = indices.split_off(test_len);
    (train, indices)
}

/// Result of one training run
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrainingReport {
    pub messages: Vec<String>,
    pub success: bool,
    /// Staged model artifact
    pub model: Option<String>,
    /// Staged evaluation artifact
    pub evaluation: Option<String>,
    /// SHA-256 of the model artifact bytes
    pub checksum: Option<String>,
    /// Records left after preprocessing
    pub records: usize,
    pub accuracy: Option<f64>,
    /// Set when the run failed on an artifact store call
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub storage_fault: bool,
}

/// Runs training against an injected store
#[derive(Clone)]
pub struct TrainingPipeline {
    store: Arc<dyn ArtifactStore>,
    settings: PipelineSettings,
    options: TrainingOptions,
    metrics: PipelineMetrics,
    logger: StructuredLogger,
}

impl TrainingPipeline {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        settings: PipelineSettings,
        metrics: PipelineMetrics,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            store,
            settings,
            options: TrainingOptions::default(),
            metrics,
            logger,
        }
    }

    pub fn with_options(mut self, options: TrainingOptions) -> Self {
        self.options = options;
        self
    }

    /// Execute one training run to completion
    pub async fn run(&self) -> TrainingReport {
        let started = Instant::now();
        let mut report = TrainingReport::default();

        match self.execute(&mut report).await {
            Ok(()) => report.success = true,
            Err(e) => {
                error!(error = %e, "Training run failed");
                if e.is_storage_fault() {
                    self.metrics.inc_storage_errors();
                    report.storage_fault = true;
                }
                report.messages.push(format!("ERROR: Training failed. Details: {e}"));
            }
        }

        let outcome = if report.success { "success" } else { "failed" };
        self.metrics
            .observe_run(pipelines::TRAIN, outcome, started.elapsed().as_secs_f64());
        self.logger.log_training_run(
            report.model.as_deref(),
            report.records,
            report.accuracy,
            report.success,
        );
        report
    }

    async fn execute(&self, report: &mut TrainingReport) -> PipelineResult<()> {
        let store = self.store.as_ref();
        let settings = &self.settings;

        let raw = load_raw_data(store, &settings.raw_data_prefix).await?;
        report.messages.push(format!(
            "Loaded {} records from {}.",
            raw.len(),
            settings.raw_data_prefix
        ));

        let processed = preprocess(raw, PreprocessMode::Fit)?;
        report.messages.extend(processed.messages);
        report.records = processed.dataset.len();
        self.metrics.set_training_records(report.records as i64);

        let processed_name = join(&settings.processed_data_prefix, PROCESSED_DATA_FILE);
        replace(store, &processed_name, &processed.dataset.to_csv()?).await?;
        report
            .messages
            .push(format!("Processed data saved to {processed_name}"));
        for name in save_transforms(store, &settings.processed_data_prefix, &processed.transforms).await? {
            report.messages.push(format!("SUCCESS: saved {name}"));
        }

        let timestamp = run_timestamp(Utc::now());
        let (model, actual, predicted) = self.fit(&processed.dataset)?;
        report
            .messages
            .push("Model training completed successfully.".to_string());

        let algorithm = settings.algorithm.as_str();
        let model_name = join(&settings.stage_prefix, &model_file_name(algorithm, &timestamp));
        let artifact = ModelArtifact {
            algorithm: settings.algorithm,
            timestamp: timestamp.clone(),
            model,
        };
        let bytes = artifact.to_bytes()?;
        let checksum = hex::encode(Sha256::digest(&bytes));
        store.write(&model_name, &bytes).await?;
        info!(model = %model_name, checksum = %checksum, "Model exported to stage");
        report.messages.push(format!("Model exported to {model_name}"));
        report.model = Some(model_name);
        report.checksum = Some(checksum);

        // written after the model so the latest staged evaluation always has its model
        let table = evaluate(&actual, &predicted, algorithm, &timestamp)
            .map_err(|e| PipelineError::malformed("new evaluation", e))?;
        let evaluation_name = join(
            &settings.stage_prefix,
            &evaluation_file_name(algorithm, &timestamp),
        );
        let table_bytes = table
            .to_csv()
            .map_err(|e| PipelineError::malformed(&evaluation_name, e))?;
        store.write(&evaluation_name, &table_bytes).await?;
        report
            .messages
            .push(format!("Model evaluation exported to {evaluation_name}"));
        report.evaluation = Some(evaluation_name);
        report.accuracy = table.accuracy();

        Ok(())
    }

    /// Split, fit and score the held-out records
    fn fit(&self, dataset: &Dataset) -> PipelineResult<(LogisticRegression, Vec<u8>, Vec<u8>)> {
        if dataset.len() < 2 {
            return Err(PipelineError::InvalidData(format!(
                "need at least 2 records to train, found {}",
                dataset.len()
            )));
        }
        let feature_names: Vec<String> = dataset
            .columns()
            .iter()
            .filter(|c| c.as_str() != TARGET_COLUMN)
            .cloned()
            .collect();
        let features = dataset.numeric_matrix(&feature_names)?;
        let labels: Vec<f64> = dataset
            .numeric_matrix(&[TARGET_COLUMN.to_string()])?
            .into_iter()
            .map(|row| row[0])
            .collect();

        let (train, test) = train_test_split(dataset.len(), TEST_FRACTION, SPLIT_SEED);
        let pick = |idx: &[usize]| -> (Vec<Vec<f64>>, Vec<f64>) {
            (
                idx.iter().map(|&i| features[i].clone()).collect(),
                idx.iter().map(|&i| labels[i]).collect(),
            )
        };
        let (train_x, train_y) = pick(&train);
        let (test_x, test_y) = pick(&test);

        let model = match self.settings.algorithm {
            Algorithm::LogisticRegression => {
                LogisticRegression::fit(feature_names, &train_x, &train_y, &self.options)?
            }
        };

        let actual = test_y.iter().map(|y| u8::from(*y == 1.0)).collect();
        let predicted = test_x.iter().map(|row| model.predict(row)).collect();
        Ok((model, actual, predicted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::find_latest_evaluation;
    use crate::store::{MemoryArtifactStore, StoreOperation};

    /// Customers with many support calls churn
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

    fn pipeline(store: Arc<MemoryArtifactStore>) -> TrainingPipeline {
        TrainingPipeline::new(
            store,
            PipelineSettings::default(),
            PipelineMetrics::new(),
            StructuredLogger::new("test-project"),
        )
    }

    #[test]
    fn test_split_is_seeded_and_rounds_up() {
        let (train, test) = train_test_split(11, TEST_FRACTION, SPLIT_SEED);
        assert_eq!(test.len(), 3);
        assert_eq!(train.len(), 8);

        let (again, _) = train_test_split(11, TEST_FRACTION, SPLIT_SEED);
        assert_eq!(train, again);

        let mut all: Vec<_> = train.iter().chain(&test).copied().collect();
        all.sort();
        assert_eq!(all, (0..11).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_run_exports_model_and_evaluation_to_stage() {
        let store = Arc::new(MemoryArtifactStore::new());
        store
            .write("data/raw/customers.csv", customer_csv(60).as_bytes())
            .await
            .unwrap();

        let report = pipeline(store.clone()).run().await;

        assert!(report.success, "{:?}", report.messages);
        let model = report.model.clone().unwrap();
        let evaluation = report.evaluation.clone().unwrap();
        assert!(model.starts_with("models/stage/model_logistic_regression_"));
        assert!(model.ends_with(".joblib"));
        assert_eq!(crate::naming::derive_model_name(&evaluation).unwrap(), model);
        assert_eq!(report.checksum.as_ref().unwrap().len(), 64);
        assert_eq!(report.records, 60);

        let bytes = store.read(&model).await.unwrap();
        let artifact = ModelArtifact::from_bytes(&bytes).unwrap();
        assert!(!artifact.model.feature_names.contains(&TARGET_COLUMN.to_string()));

        let latest = find_latest_evaluation(store.as_ref(), "models/stage/")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.handle.name, evaluation);
        assert_eq!(latest.table.records().len(), 2);

        for name in ["processed_data.csv", "scaler.json", "encoder.json"] {
            assert!(store.exists(&format!("data/processed/{name}")).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_run_without_raw_data_fails() {
        let store = Arc::new(MemoryArtifactStore::new());

        let report = pipeline(store.clone()).run().await;

        assert!(!report.success);
        assert!(report.messages[0].starts_with("ERROR: Training failed"));
        assert!(report.model.is_none());
        assert!(store.names().await.is_empty());
    }

    #[tokio::test]
    async fn test_export_failure_stops_before_evaluation() {
        let store = Arc::new(MemoryArtifactStore::new());
        store
            .write("data/raw/customers.csv", customer_csv(20).as_bytes())
            .await
            .unwrap();
        store.fail_on(StoreOperation::Write, ".joblib").await;

        let report = pipeline(store.clone()).run().await;

        assert!(!report.success);
        assert!(report.evaluation.is_none());
        assert!(report.storage_fault);
        assert!(store.list("models/stage/").await.unwrap().is_empty());
    }
}

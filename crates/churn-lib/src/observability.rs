//! Observability infrastructure for the churn pipeline
//!
//! Provides:
//! - Prometheus metrics (run counts and latency, promotions, predictions, live model)
//! - Structured JSON logging with tracing

use prometheus::{
    register_gauge_vec, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, GaugeVec, HistogramVec, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for pipeline run durations (in seconds)
const RUN_DURATION_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

/// Pipeline names used as metric labels
pub mod pipelines {
    pub const TRAIN: &str = "train";
    pub const PUBLISH: &str = "publish";
    pub const PREDICT: &str = "predict";
}

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<PipelineMetricsInner> = OnceLock::new();

struct PipelineMetricsInner {
    runs_total: IntCounterVec,
    run_duration_seconds: HistogramVec,
    promotions_total: IntCounter,
    partial_promotions_total: IntCounter,
    predictions_total: IntCounter,
    storage_errors_total: IntCounter,
    training_records: IntGauge,
    live_model_info: GaugeVec,
}

impl PipelineMetricsInner {
    fn new() -> Self {
        Self {
            runs_total: register_int_counter_vec!(
                "churn_pipeline_runs_total",
                "Pipeline runs by pipeline and outcome",
                &["pipeline", "outcome"]
            )
            .expect("Failed to register runs_total"),

            run_duration_seconds: register_histogram_vec!(
                "churn_pipeline_run_duration_seconds",
                "Wall time of a pipeline run",
                &["pipeline"],
                RUN_DURATION_BUCKETS.to_vec()
            )
            .expect("Failed to register run_duration_seconds"),

            promotions_total: register_int_counter!(
                "churn_pipeline_promotions_total",
                "Staged models copied into production"
            )
            .expect("Failed to register promotions_total"),

            partial_promotions_total: register_int_counter!(
                "churn_pipeline_partial_promotions_total",
                "Promotions where the model reached production without its evaluation table"
            )
            .expect("Failed to register partial_promotions_total"),

            predictions_total: register_int_counter!(
                "churn_pipeline_predictions_total",
                "Records scored by the production model"
            )
            .expect("Failed to register predictions_total"),

            storage_errors_total: register_int_counter!(
                "churn_pipeline_storage_errors_total",
                "Artifact store failures surfaced to a pipeline run"
            )
            .expect("Failed to register storage_errors_total"),

            training_records: register_int_gauge!(
                "churn_pipeline_training_records",
                "Records used by the last training run after preprocessing"
            )
            .expect("Failed to register training_records"),

            live_model_info: register_gauge_vec!(
                "churn_pipeline_live_model_info",
                "Model artifact currently live in production",
                &["model"]
            )
            .expect("Failed to register live_model_info"),
        }
    }
}

/// Handle to the process-wide pipeline metrics
///
/// Clones share the same underlying Prometheus collectors.
#[derive(Clone)]
pub struct PipelineMetrics {
    _private: (),
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    /// Create a metrics handle (registers the collectors on first call)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(PipelineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &PipelineMetricsInner {
        GLOBAL_METRICS.get_or_init(PipelineMetricsInner::new)
    }

    /// Record a finished run
    pub fn observe_run(&self, pipeline: &str, outcome: &str, duration_secs: f64) {
        let inner = self.inner();
        inner.runs_total.with_label_values(&[pipeline, outcome]).inc();
        inner
            .run_duration_seconds
            .with_label_values(&[pipeline])
            .observe(duration_secs);
    }

    pub fn inc_promotions(&self) {
        self.inner().promotions_total.inc();
    }

    pub fn inc_partial_promotions(&self) {
        self.inner().partial_promotions_total.inc();
    }

    pub fn add_predictions(&self, count: u64) {
        self.inner().predictions_total.inc_by(count);
    }

    pub fn inc_storage_errors(&self) {
        self.inner().storage_errors_total.inc();
    }

    pub fn set_training_records(&self, count: i64) {
        self.inner().training_records.set(count);
    }

    /// Point the live-model gauge at `model`
    pub fn set_live_model(&self, model: &str) {
        self.inner().live_model_info.reset();
        self.inner()
            .live_model_info
            .with_label_values(&[model])
            .set(1.0);
    }
}

/// Structured logger for pipeline events
#[derive(Clone)]
pub struct StructuredLogger {
    project_id: String,
}

impl StructuredLogger {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
        }
    }

    pub fn log_startup(&self, version: &str, bucket: &str, backend: &str) {
        info!(
            event = "service_started",
            project = %self.project_id,
            version = %version,
            bucket = %bucket,
            store_backend = %backend,
            "Churn pipeline service started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            project = %self.project_id,
            reason = %reason,
            "Churn pipeline service shutting down"
        );
    }

    pub fn log_training_run(&self, model: Option<&str>, records: usize, accuracy: Option<f64>, success: bool) {
        if success {
            info!(
                event = "training_completed",
                project = %self.project_id,
                model = ?model,
                records = records,
                accuracy = ?accuracy,
                "Model trained and exported to stage"
            );
        } else {
            warn!(
                event = "training_failed",
                project = %self.project_id,
                model = ?model,
                records = records,
                "Training run failed"
            );
        }
    }

    pub fn log_publish(&self, outcome: &str, live_model: Option<&str>, promoted: bool) {
        if promoted {
            info!(
                event = "model_promoted",
                project = %self.project_id,
                outcome = %outcome,
                live_model = ?live_model,
                "Staged model promoted to production"
            );
        } else {
            info!(
                event = "model_not_promoted",
                project = %self.project_id,
                outcome = %outcome,
                live_model = ?live_model,
                "Publish run finished without promotion"
            );
        }
    }

    pub fn log_predictions(&self, model: &str, records: usize) {
        info!(
            event = "predictions_served",
            project = %self.project_id,
            model = %model,
            records = records,
            "Scored records with production model"
        );
    }
}

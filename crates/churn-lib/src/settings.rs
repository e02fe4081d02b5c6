//! Namespace layout and pipeline options shared by all runs

use crate::error::{PipelineError, PipelineResult};
use crate::evaluation::Metric;
use crate::training::Algorithm;

/// Storage layout and model options
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// Prefix holding raw customer CSV files
    pub raw_data_prefix: String,
    /// Prefix for processed data, scaler and encoder
    pub processed_data_prefix: String,
    /// Namespace for freshly trained models
    pub stage_prefix: String,
    /// Namespace for promoted models
    pub prod_prefix: String,
    pub algorithm: Algorithm,
    pub comparison_metrics: Vec<Metric>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            raw_data_prefix: "data/raw/".to_string(),
            processed_data_prefix: "data/processed/".to_string(),
            stage_prefix: "models/stage/".to_string(),
            prod_prefix: "models/prod/".to_string(),
            algorithm: Algorithm::LogisticRegression,
            comparison_metrics: Metric::DEFAULT_COMPARISON.to_vec(),
        }
    }
}

impl PipelineSettings {
    /// Reject layouts where promotion could not tell the namespaces apart
    pub fn validate(&self) -> PipelineResult<()> {
        let prefixes = [
            ("raw data", &self.raw_data_prefix),
            ("processed data", &self.processed_data_prefix),
            ("stage model", &self.stage_prefix),
            ("prod model", &self.prod_prefix),
        ];
        for (label, prefix) in prefixes {
            if prefix.trim().is_empty() {
                return Err(PipelineError::InvalidData(format!(
                    "{label} folder path must not be empty"
                )));
            }
        }
        if self.stage_prefix.starts_with(self.prod_prefix.as_str())
            || self.prod_prefix.starts_with(self.stage_prefix.as_str())
        {
            return Err(PipelineError::InvalidData(format!(
                "stage ({}) and prod ({}) folder paths must not overlap",
                self.stage_prefix, self.prod_prefix
            )));
        }
        if self.comparison_metrics.is_empty() {
            return Err(PipelineError::InvalidData(
                "at least one comparison metric is required".to_string(),
            ));
        }
        Ok(())
    }
}

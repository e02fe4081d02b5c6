//! Training pipeline: raw data to a staged model and evaluation table
//!
//! - `dataset`: loosely typed CSV tables
//! - `preprocess`: cleaning, feature engineering, scaling and encoding
//! - `classifier`: logistic regression
//! - `metrics`: per-class evaluation
//! - `pipeline`: the end-to-end run

mod classifier;
mod dataset;
mod metrics;
mod pipeline;
mod preprocess;

pub use classifier::{LogisticRegression, ModelArtifact, TrainingOptions};
pub use dataset::{load_raw_data, Cell, Dataset};
pub use metrics::evaluate;
pub use pipeline::{train_test_split, TrainingPipeline, TrainingReport, TEST_FRACTION, SPLIT_SEED};
pub use preprocess::{
    load_transforms, preprocess, save_transforms, FittedTransforms, LabelEncoder, PreprocessMode,
    Preprocessed, StandardScaler, ENCODER_FILE, HIGH_SUPPORT_USER, ID_COLUMN, PROCESSED_DATA_FILE,
    RECENTLY_ACTIVE, SCALER_FILE, TARGET_COLUMN,
};

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported model families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    LogisticRegression,
}

impl Algorithm {
    /// Name used in artifact file names
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::LogisticRegression => "logistic_regression",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "logistic_regression" => Ok(Algorithm::LogisticRegression),
            other => Err(PipelineError::UnknownAlgorithm(other.to_string())),
        }
    }
}

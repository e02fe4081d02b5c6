//! Error types shared across the pipeline
//!
//! "Not found" is never an error here: loaders return `Ok(None)` and the
//! caller decides what an absent artifact means.

use thiserror::Error;

/// Failure reported by an artifact store backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("invalid artifact name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("i/o error on {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("storage request for {name} failed: {message}")]
    Backend { name: String, message: String },

    #[error("injected fault on {operation} {name}")]
    Injected { operation: &'static str, name: String },
}

impl StoreError {
    pub(crate) fn io(name: impl Into<String>, source: std::io::Error) -> Self {
        StoreError::Io {
            name: name.into(),
            source,
        }
    }

    pub(crate) fn backend(name: impl Into<String>, message: impl ToString) -> Self {
        StoreError::Backend {
            name: name.into(),
            message: message.to_string(),
        }
    }
}

/// Artifact name that does not follow the model/evaluation convention
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamingError {
    #[error("{0} is not an evaluation artifact (expected model_evaluation_<algorithm>_<timestamp>.csv)")]
    NotAnEvaluationArtifact(String),

    #[error("{name} does not live under namespace {prefix}")]
    OutsideNamespace { name: String, prefix: String },
}

/// Evaluation table that cannot be parsed or violates its invariants
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("failed to parse evaluation table: {0}")]
    Csv(#[from] csv::Error),

    #[error("evaluation table has more than one record for class {0}")]
    DuplicateClass(u32),

    #[error("evaluation table has no record for class {0}")]
    MissingClass(u32),
}

/// Error raised by the training, prediction and publishing pipelines
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("storage fault: {0}")]
    Storage(#[from] StoreError),

    #[error("malformed evaluation table {artifact}: {source}")]
    MalformedTable {
        artifact: String,
        #[source]
        source: EvaluationError,
    },

    #[error(transparent)]
    Naming(#[from] NamingError),

    #[error("no CSV files found under {0}")]
    NoRawData(String),

    #[error("failed to parse CSV {artifact}: {source}")]
    Csv {
        artifact: String,
        #[source]
        source: csv::Error,
    },

    #[error("dataset is empty")]
    EmptyDataset,

    #[error("required column {0:?} is missing")]
    MissingColumn(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("unknown comparison metric: {0}")]
    UnknownMetric(String),

    #[error("no production model is available")]
    NoProductionModel,

    #[error("invalid {what} encoding: {source}")]
    Serialization {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl PipelineError {
    pub(crate) fn malformed(artifact: impl Into<String>, source: EvaluationError) -> Self {
        PipelineError::MalformedTable {
            artifact: artifact.into(),
            source,
        }
    }

    /// True when the failure came from the artifact store
    pub fn is_storage_fault(&self) -> bool {
        matches!(self, PipelineError::Storage(_))
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

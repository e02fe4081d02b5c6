//! Evaluation tables and the loader that finds the latest one in a namespace

mod loader;
mod table;

pub use loader::{find_latest_evaluation, LatestEvaluation};
pub use table::{EvaluationRecord, EvaluationTable, Metric, NEGATIVE_CLASS, POSITIVE_CLASS};

//! Artifact naming convention
//!
//! A training run produces two sibling artifacts that share an algorithm and
//! a timestamp:
//! - `model_{algorithm}_{timestamp}.joblib`
//! - `model_evaluation_{algorithm}_{timestamp}.csv`
//!
//! Names are derived from one another, never computed independently, so the
//! functions here are pure string transformations.

use crate::error::NamingError;
use chrono::{DateTime, Utc};

pub const MODEL_EXTENSION: &str = ".joblib";
pub const EVALUATION_EXTENSION: &str = ".csv";
pub const EVALUATION_MARKER: &str = "_evaluation_";

/// `YYYYMMDDHHMMSS`, which also sorts lexicographically by time
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

pub fn run_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub fn model_file_name(algorithm: &str, timestamp: &str) -> String {
    format!("model_{algorithm}_{timestamp}{MODEL_EXTENSION}")
}

pub fn evaluation_file_name(algorithm: &str, timestamp: &str) -> String {
    format!("model_evaluation_{algorithm}_{timestamp}{EVALUATION_EXTENSION}")
}

/// Join a namespace prefix and a file name
pub fn join(prefix: &str, file_name: &str) -> String {
    if prefix.is_empty() || prefix.ends_with('/') {
        format!("{prefix}{file_name}")
    } else {
        format!("{prefix}/{file_name}")
    }
}

pub fn is_evaluation_artifact(name: &str) -> bool {
    name.ends_with(EVALUATION_EXTENSION)
}

/// Model artifact name for an evaluation artifact in the same namespace
///
/// Only the file-name component is rewritten: the first evaluation marker
/// becomes `_` and the `.csv` extension becomes `.joblib`.
pub fn derive_model_name(evaluation_name: &str) -> Result<String, NamingError> {
    let (dir, file) = match evaluation_name.rfind('/') {
        Some(idx) => evaluation_name.split_at(idx + 1),
        None => ("", evaluation_name),
    };

    let stem = file
        .strip_suffix(EVALUATION_EXTENSION)
        .filter(|stem| stem.contains(EVALUATION_MARKER))
        .ok_or_else(|| NamingError::NotAnEvaluationArtifact(evaluation_name.to_string()))?;

    let model_stem = stem.replacen(EVALUATION_MARKER, "_", 1);
    Ok(format!("{dir}{model_stem}{MODEL_EXTENSION}"))
}

/// Move `name` from the `from` namespace into the `to` namespace
pub fn rebase(name: &str, from: &str, to: &str) -> Result<String, NamingError> {
    let rest = name
        .strip_prefix(from)
        .ok_or_else(|| NamingError::OutsideNamespace {
            name: name.to_string(),
            prefix: from.to_string(),
        })?;
    Ok(format!("{to}{rest}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_file_names_follow_convention() {
        assert_eq!(
            model_file_name("logistic_regression", "20250101120000"),
            "model_logistic_regression_20250101120000.joblib"
        );
        assert_eq!(
            evaluation_file_name("logistic_regression", "20250101120000"),
            "model_evaluation_logistic_regression_20250101120000.csv"
        );
    }

    #[test]
    fn test_run_timestamp_format() {
        let at = Utc.with_ymd_and_hms(2025, 3, 7, 9, 5, 1).unwrap();
        assert_eq!(run_timestamp(at), "20250307090501");
    }

    #[test]
    fn test_derive_model_name_from_evaluation() {
        let derived =
            derive_model_name("models/stage/model_evaluation_logistic_regression_20250101120000.csv")
                .unwrap();
        assert_eq!(
            derived,
            "models/stage/model_logistic_regression_20250101120000.joblib"
        );
    }

    #[test]
    fn test_derive_model_name_is_deterministic() {
        let name = "models/stage/model_evaluation_lr_20250101120000.csv";
        assert_eq!(derive_model_name(name), derive_model_name(name));
    }

    #[test]
    fn test_derive_model_name_leaves_directories_alone() {
        let derived = derive_model_name("runs_evaluation_/model_evaluation_lr_1.csv").unwrap();
        assert_eq!(derived, "runs_evaluation_/model_lr_1.joblib");
    }

    #[test]
    fn test_derive_model_name_rejects_other_artifacts() {
        assert!(derive_model_name("models/stage/model_lr_1.joblib").is_err());
        assert!(derive_model_name("data/raw/customers.csv").is_err());
    }

    #[test]
    fn test_derived_name_matches_generated_model_name() {
        let evaluation = join("models/stage/", &evaluation_file_name("lr", "20250101000000"));
        let model = join("models/stage/", &model_file_name("lr", "20250101000000"));
        assert_eq!(derive_model_name(&evaluation).unwrap(), model);
    }

    #[test]
    fn test_rebase_swaps_namespace_prefix_only() {
        let moved = rebase(
            "models/stage/model_stage_algo_1.joblib",
            "models/stage/",
            "models/prod/",
        )
        .unwrap();
        assert_eq!(moved, "models/prod/model_stage_algo_1.joblib");
    }

    #[test]
    fn test_rebase_outside_namespace() {
        let err = rebase("other/model_lr_1.joblib", "models/stage/", "models/prod/").unwrap_err();
        assert!(matches!(err, NamingError::OutsideNamespace { .. }));
    }

    #[test]
    fn test_join() {
        assert_eq!(join("a/", "b"), "a/b");
        assert_eq!(join("a", "b"), "a/b");
        assert_eq!(join("", "b"), "b");
    }
}

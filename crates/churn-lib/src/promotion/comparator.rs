//! Staged vs. production metric comparison
//!
//! Only the positive (churn) class is compared. For each metric, in order,
//! `delta = production - staged`; the comparison passes a metric when
//! `delta > 0` and stops at the first metric that does not pass.
//!
//! Note the polarity: promotion requires the *production* model to be
//! strictly better than the staged one on every metric. This mirrors the
//! behavior of the existing pipeline and is kept as-is until its owners
//! decide otherwise.

use crate::error::{PipelineError, PipelineResult};
use crate::evaluation::{EvaluationTable, Metric};
use serde::Serialize;
use tracing::{debug, info};

/// One evaluated metric
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricDelta {
    pub metric: Metric,
    pub production: f64,
    pub staged: f64,
    /// `production - staged`
    pub delta: f64,
}

impl MetricDelta {
    pub fn passed(&self) -> bool {
        self.delta > 0.0
    }
}

/// Comparator verdict
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonOutcome {
    pub promote: bool,
    pub message: String,
    /// Metrics actually evaluated; stops at the first failing one
    pub checked: Vec<MetricDelta>,
}

/// Compare positive-class metrics of the production and staged tables
///
/// Returns `MalformedTable` when either table lacks a positive-class record.
pub fn compare(
    production: &EvaluationTable,
    staged: &EvaluationTable,
    metrics: &[Metric],
) -> PipelineResult<ComparisonOutcome> {
    let prod_row = production
        .positive_class()
        .map_err(|e| PipelineError::malformed("production evaluation", e))?;
    let stage_row = staged
        .positive_class()
        .map_err(|e| PipelineError::malformed("stage evaluation", e))?;

    let mut checked = Vec::with_capacity(metrics.len());
    for metric in metrics {
        let production = metric.value(prod_row);
        let staged = metric.value(stage_row);
        let delta = MetricDelta {
            metric: *metric,
            production,
            staged,
            delta: production - staged,
        };
        let passed = delta.passed();
        debug!(
            metric = %metric,
            production = production,
            staged = staged,
            delta = delta.delta,
            passed = passed,
            "Compared metric"
        );
        checked.push(delta);

        if !passed {
            let message = format!(
                "for measure {metric}, Production model is NOT better than stage model. Not promoting the model."
            );
            info!(metric = %metric, "{}", message);
            return Ok(ComparisonOutcome {
                promote: false,
                message,
                checked,
            });
        }
        info!(metric = %metric, "for measure {}, Production model is better than stage model.", metric);
    }

    Ok(ComparisonOutcome {
        promote: true,
        message: "Production model performance is better than stage model performance.".to_string(),
        checked,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::EvaluationRecord;

    fn table(accuracy: f64, f1: f64) -> EvaluationTable {
        let row = |class_label, f1_score| EvaluationRecord {
            class_label,
            precision: 0.75,
            recall: 0.75,
            f1_score,
            support: 100,
            accuracy,
            algorithm: "logistic_regression".to_string(),
            timestamp: "20250101000000".to_string(),
        };
        // negative-class values are extreme so any mix-up shows up in the tests
        EvaluationTable::new(vec![row(0, 0.0), row(1, f1)]).unwrap()
    }

    #[test]
    fn test_staged_better_is_not_promoted() {
        let outcome = compare(&table(0.80, 0.70), &table(0.85, 0.75), &Metric::DEFAULT_COMPARISON)
            .unwrap();
        assert!(!outcome.promote);
        assert!(outcome.message.contains("Accuracy"));
        assert!((outcome.checked[0].delta - -0.05).abs() < 1e-9);
    }

    #[test]
    fn test_equal_metric_is_not_promoted() {
        let outcome = compare(&table(0.80, 0.70), &table(0.80, 0.60), &Metric::DEFAULT_COMPARISON)
            .unwrap();
        assert!(!outcome.promote);
        assert!(outcome.message.contains("Accuracy"));
    }

    #[test]
    fn test_short_circuits_on_first_failing_metric() {
        // F1 would pass, but accuracy fails first
        let outcome = compare(&table(0.70, 0.90), &table(0.80, 0.10), &Metric::DEFAULT_COMPARISON)
            .unwrap();
        assert!(!outcome.promote);
        assert_eq!(outcome.checked.len(), 1);
        assert_eq!(outcome.checked[0].metric, Metric::Accuracy);
        assert!(!outcome.message.contains("F1-Score"));
    }

    #[test]
    fn test_second_metric_failure_is_named() {
        let outcome = compare(&table(0.90, 0.70), &table(0.80, 0.75), &Metric::DEFAULT_COMPARISON)
            .unwrap();
        assert!(!outcome.promote);
        assert_eq!(outcome.checked.len(), 2);
        assert!(outcome.checked[0].passed());
        assert!(outcome.message.contains("F1-Score"));
    }

    #[test]
    fn test_promotes_when_production_better_on_all() {
        let outcome = compare(&table(0.90, 0.80), &table(0.80, 0.70), &Metric::DEFAULT_COMPARISON)
            .unwrap();
        assert!(outcome.promote);
        assert_eq!(outcome.checked.len(), 2);
        assert!(outcome.checked.iter().all(MetricDelta::passed));
    }

    #[test]
    fn test_nan_metric_does_not_promote() {
        let outcome = compare(&table(f64::NAN, 0.80), &table(0.80, 0.70), &Metric::DEFAULT_COMPARISON)
            .unwrap();
        assert!(!outcome.promote);
    }

    #[test]
    fn test_only_positive_class_is_compared() {
        let outcome = compare(&table(0.90, 0.80), &table(0.80, 0.70), &[Metric::F1Score]).unwrap();
        assert_eq!(outcome.checked[0].production, 0.80);
        assert_eq!(outcome.checked[0].staged, 0.70);
    }

    #[test]
    fn test_missing_positive_class_is_malformed() {
        let negative_only = EvaluationTable::new(vec![table(0.9, 0.9).records()[0].clone()]).unwrap();
        let err = compare(&negative_only, &table(0.8, 0.8), &Metric::DEFAULT_COMPARISON).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedTable { .. }));
    }

    #[test]
    fn test_empty_metric_list_promotes() {
        let outcome = compare(&table(0.1, 0.1), &table(0.9, 0.9), &[]).unwrap();
        assert!(outcome.promote);
        assert!(outcome.checked.is_empty());
    }
}

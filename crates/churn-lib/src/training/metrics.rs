//! Classification metrics for the evaluation table

use crate::error::EvaluationError;
use crate::evaluation::{EvaluationRecord, EvaluationTable, NEGATIVE_CLASS, POSITIVE_CLASS};

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Per-class precision, recall, F1 and support for labels 0 and 1, plus
/// overall accuracy; undefined ratios are 0
pub fn evaluate(
    actual: &[u8],
    predicted: &[u8],
    algorithm: &str,
    timestamp: &str,
) -> Result<EvaluationTable, EvaluationError> {
    let pairs: Vec<(u32, u32)> = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (u32::from(*a), u32::from(*p)))
        .collect();
    let correct = pairs.iter().filter(|(a, p)| a == p).count() as u64;
    let accuracy = ratio(correct, pairs.len() as u64);

    let records = [NEGATIVE_CLASS, POSITIVE_CLASS]
        .into_iter()
        .map(|class| {
            let tp = pairs.iter().filter(|(a, p)| *a == class && *p == class).count() as u64;
            let predicted_class = pairs.iter().filter(|(_, p)| *p == class).count() as u64;
            let support = pairs.iter().filter(|(a, _)| *a == class).count() as u64;

            let precision = ratio(tp, predicted_class);
            let recall = ratio(tp, support);
            let f1_score = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };

            EvaluationRecord {
                class_label: class,
                precision,
                recall,
                f1_score,
                support,
                accuracy,
                algorithm: algorithm.to_string(),
                timestamp: timestamp.to_string(),
            }
        })
        .collect();

    EvaluationTable::new(records)
}

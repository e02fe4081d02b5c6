//! Binary logistic regression trained with full-batch gradient descent

use super::Algorithm;
use crate::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Gradient descent options
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingOptions {
    pub learning_rate: f64,
    pub max_iterations: usize,
    /// Inverse regularization strength, as in the usual `C` parameter
    pub inverse_regularization: f64,
    /// Stop once the largest gradient component falls below this
    pub tolerance: f64,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            max_iterations: 2_000,
            inverse_regularization: 1.0,
            tolerance: 1e-6,
        }
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Fitted model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Feature order the weights were trained on
    pub feature_names: Vec<String>,
    pub weights: Vec<f64>,
    pub intercept: f64,
}

impl LogisticRegression {
    /// Fit on `features` (one row per sample) and 0/1 `labels`
    pub fn fit(
        feature_names: Vec<String>,
        features: &[Vec<f64>],
        labels: &[f64],
        options: &TrainingOptions,
    ) -> PipelineResult<Self> {
        if features.is_empty() {
            return Err(PipelineError::EmptyDataset);
        }
        if features.len() != labels.len() {
            return Err(PipelineError::InvalidData(format!(
                "{} feature rows for {} labels",
                features.len(),
                labels.len()
            )));
        }
        if let Some(label) = labels.iter().find(|l| **l != 0.0 && **l != 1.0) {
            return Err(PipelineError::InvalidData(format!(
                "target labels must be 0 or 1, found {label}"
            )));
        }
        let width = feature_names.len();
        if features.iter().any(|row| row.len() != width) {
            return Err(PipelineError::InvalidData(format!(
                "every feature row must have {width} values"
            )));
        }

        let n = features.len() as f64;
        let penalty = 1.0 / (options.inverse_regularization * n);
        let mut weights = vec![0.0; width];
        let mut intercept = 0.0;
        let mut iterations = 0;

        for _ in 0..options.max_iterations {
            iterations += 1;
            let mut grad_w = vec![0.0; width];
            let mut grad_b = 0.0;
            for (row, label) in features.iter().zip(labels) {
                let error = sigmoid(dot(&weights, row) + intercept) - label;
                for (g, x) in grad_w.iter_mut().zip(row) {
                    *g += error * x;
                }
                grad_b += error;
            }
            for (g, w) in grad_w.iter_mut().zip(&weights) {
                *g = *g / n + penalty * w;
            }
            grad_b /= n;

            for (w, g) in weights.iter_mut().zip(&grad_w) {
                *w -= options.learning_rate * g;
            }
            intercept -= options.learning_rate * grad_b;

            let largest = grad_w.iter().fold(grad_b.abs(), |acc, g| acc.max(g.abs()));
            if largest < options.tolerance {
                break;
            }
        }
        debug!(iterations = iterations, features = width, "Logistic regression converged");

        Ok(Self {
            feature_names,
            weights,
            intercept,
        })
    }

    /// Probability of the positive class
    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        sigmoid(dot(&self.weights, row) + self.intercept)
    }

    pub fn predict(&self, row: &[f64]) -> u8 {
        u8::from(self.predict_proba(row) >= 0.5)
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Serialized model stored under the `.joblib` artifact name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub algorithm: Algorithm,
    /// Run timestamp shared with the evaluation table
    pub timestamp: String,
    pub model: LogisticRegression,
}

impl ModelArtifact {
    pub fn to_bytes(&self) -> PipelineResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|source| PipelineError::Serialization {
            what: "model",
            source,
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> PipelineResult<Self> {
        serde_json::from_slice(bytes).map_err(|source| PipelineError::Serialization {
            what: "model",
            source,
        })
    }
}

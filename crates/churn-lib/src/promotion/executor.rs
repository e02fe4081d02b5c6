//! Copy a staged model and its evaluation table into production
//!
//! The two copies run in sequence: model first, then evaluation. They are not
//! transactional. If the evaluation copy fails, production holds a model with
//! no matching evaluation table; the error reports the failed step and nothing
//! is rolled back. Staged originals are always kept for audit.

use crate::error::{NamingError, StoreError};
use crate::naming::{derive_model_name, rebase};
use crate::store::{ArtifactHandle, ArtifactStore};
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::{error, info, warn};

/// Copy step of a promotion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionStep {
    CopyModel,
    CopyEvaluation,
}

impl fmt::Display for PromotionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromotionStep::CopyModel => f.write_str("model copy"),
            PromotionStep::CopyEvaluation => f.write_str("evaluation copy"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PromotionError {
    #[error("cannot derive promotion artifact names: {0}")]
    Naming(#[from] NamingError),

    #[error("failed to move model and evaluation file from {source_artifact} ({step} failed): {source}")]
    Storage {
        step: PromotionStep,
        source_artifact: String,
        #[source]
        source: StoreError,
    },
}

impl PromotionError {
    /// True when the model reached production but its evaluation did not
    pub fn is_partial(&self) -> bool {
        matches!(
            self,
            PromotionError::Storage {
                step: PromotionStep::CopyEvaluation,
                ..
            }
        )
    }
}

/// Names involved in a completed promotion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromotionReceipt {
    pub staged_model: String,
    pub staged_evaluation: String,
    pub production_model: String,
    pub production_evaluation: String,
    pub message: String,
}

/// Promote the staged model belonging to `stage_evaluation`
pub async fn promote(
    store: &dyn ArtifactStore,
    stage_namespace: &str,
    stage_evaluation: &ArtifactHandle,
    prod_namespace: &str,
) -> Result<PromotionReceipt, PromotionError> {
    let staged_evaluation = stage_evaluation.name.clone();
    let staged_model = derive_model_name(&staged_evaluation)?;
    let production_model = rebase(&staged_model, stage_namespace, prod_namespace)?;
    let production_evaluation = rebase(&staged_evaluation, stage_namespace, prod_namespace)?;

    info!(
        staged_model = %staged_model,
        production_model = %production_model,
        production_evaluation = %production_evaluation,
        "Promoting staged model"
    );

    store
        .copy(&staged_model, &production_model)
        .await
        .map_err(|source| {
            error!(error = %source, "Model copy failed, production unchanged");
            PromotionError::Storage {
                step: PromotionStep::CopyModel,
                source_artifact: staged_evaluation.clone(),
                source,
            }
        })?;
    info!("Moved model file from {} to {}", staged_model, production_model);

    store
        .copy(&staged_evaluation, &production_evaluation)
        .await
        .map_err(|source| {
            warn!(
                event = "partial_promotion",
                production_model = %production_model,
                error = %source,
                "Evaluation copy failed after model copy, production model has no evaluation table"
            );
            PromotionError::Storage {
                step: PromotionStep::CopyEvaluation,
                source_artifact: staged_evaluation.clone(),
                source,
            }
        })?;
    info!(
        "Moved evaluation file from {} to {}",
        staged_evaluation, production_evaluation
    );

    Ok(PromotionReceipt {
        staged_model,
        staged_evaluation,
        production_model,
        production_evaluation,
        message: "Model and evaluation files moved successfully.".to_string(),
    })
}

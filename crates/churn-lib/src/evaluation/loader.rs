//! Locate and parse the most recent evaluation table under a namespace

use super::EvaluationTable;
use crate::error::{PipelineError, PipelineResult};
use crate::naming::EVALUATION_EXTENSION;
use crate::store::{latest_with_suffix, ArtifactHandle, ArtifactStore};
use tracing::{debug, info};

/// Latest evaluation table in a namespace plus the artifact it came from
#[derive(Debug, Clone)]
pub struct LatestEvaluation {
    pub table: EvaluationTable,
    /// Needed later to derive the sibling model artifact name
    pub handle: ArtifactHandle,
}

/// Find the evaluation table with the newest store creation time under `namespace`
///
/// Recency comes from the store's metadata, not the timestamp embedded in the
/// file name. Returns `Ok(None)` when the namespace holds no evaluation
/// table. Storage errors are returned as-is and not retried.
pub async fn find_latest_evaluation(
    store: &dyn ArtifactStore,
    namespace: &str,
) -> PipelineResult<Option<LatestEvaluation>> {
    let Some(handle) = latest_with_suffix(store, namespace, EVALUATION_EXTENSION).await? else {
        info!(namespace = %namespace, "No model evaluation CSV files found");
        return Ok(None);
    };

    let bytes = store.read(&handle.name).await?;
    let table = EvaluationTable::from_csv(&bytes)
        .map_err(|e| PipelineError::malformed(&handle.name, e))?;

    debug!(
        artifact = %handle.name,
        created_at = %handle.created_at,
        rows = table.records().len(),
        "Loaded model evaluation data"
    );

    Ok(Some(LatestEvaluation { table, handle }))
}

//! Publish workflow: load both evaluations, compare, promote, report
//!
//! ```text
//! Start -> EvaluationsLoaded -> NoProdBaseline   -> Promoted    -> Reported
//!                            -> BaselineCompared -> Promoted    -> Reported
//!                                                -> NotPromoted -> Reported
//! ```
//!
//! Every step appends a message to the report. A failing step ends the run
//! early; no failure escapes [`PromotionOrchestrator::run`].

use super::comparator::{compare, ComparisonOutcome};
use super::executor::{promote, PromotionError};
use crate::error::PipelineError;
use crate::evaluation::{find_latest_evaluation, LatestEvaluation};
use crate::naming::derive_model_name;
use crate::observability::{pipelines, PipelineMetrics, StructuredLogger};
use crate::settings::PipelineSettings;
use crate::store::{ArtifactHandle, ArtifactStore};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

/// Workflow states, in the order they were visited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishState {
    Start,
    EvaluationsLoaded,
    NoProdBaseline,
    BaselineCompared,
    Promoted,
    NotPromoted,
    Reported,
}

/// How a publish run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishOutcome {
    /// Staged model beat the comparison and was copied to production
    Promoted,
    /// No production baseline existed, staged model copied unconditionally
    Bootstrapped,
    /// Comparison rejected the staged model
    NotPromoted,
    /// Stage namespace holds no evaluation table
    NothingStaged,
    Failed,
}

impl PublishOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishOutcome::Promoted => "promoted",
            PublishOutcome::Bootstrapped => "bootstrapped",
            PublishOutcome::NotPromoted => "not_promoted",
            PublishOutcome::NothingStaged => "nothing_staged",
            PublishOutcome::Failed => "failed",
        }
    }
}

/// Category of a failed run, used for health reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishFault {
    Storage,
    MalformedTable,
    Naming,
    PartialPromotion,
}

/// Result of one publish run
#[derive(Debug, Clone, Serialize)]
pub struct PublishReport {
    pub messages: Vec<String>,
    pub outcome: PublishOutcome,
    pub promoted: bool,
    /// Production model considered live once the run finished
    pub live_model: Option<String>,
    pub states: Vec<PublishState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison: Option<ComparisonOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<PublishFault>,
}

/// Accumulates messages and visited states for one run
struct Run {
    messages: Vec<String>,
    states: Vec<PublishState>,
    comparison: Option<ComparisonOutcome>,
}

impl Run {
    fn new() -> Self {
        Self {
            messages: Vec::new(),
            states: vec![PublishState::Start],
            comparison: None,
        }
    }

    fn enter(&mut self, state: PublishState) {
        debug!(state = ?state, "Publish state transition");
        self.states.push(state);
    }

    fn say(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    fn finish(
        mut self,
        outcome: PublishOutcome,
        live_model: Option<String>,
        fault: Option<PublishFault>,
    ) -> PublishReport {
        self.enter(PublishState::Reported);
        let promoted = matches!(outcome, PublishOutcome::Promoted | PublishOutcome::Bootstrapped);
        PublishReport {
            messages: self.messages,
            outcome,
            promoted,
            live_model,
            states: self.states,
            comparison: self.comparison,
            fault,
        }
    }

    /// `live_model` is whatever production held before the failing step
    fn fail(mut self, message: String, fault: PublishFault, live_model: Option<String>) -> PublishReport {
        error!(fault = ?fault, "{}", message);
        self.say(message);
        self.finish(PublishOutcome::Failed, live_model, Some(fault))
    }
}

fn fault_of(err: &PipelineError) -> PublishFault {
    match err {
        PipelineError::MalformedTable { .. } => PublishFault::MalformedTable,
        PipelineError::Naming(_) => PublishFault::Naming,
        _ => PublishFault::Storage,
    }
}

/// Live production model implied by a production evaluation artifact
fn live_model_for(evaluation: &ArtifactHandle) -> Option<String> {
    derive_model_name(&evaluation.name).ok()
}

/// Runs the publish workflow against an injected store
#[derive(Clone)]
pub struct PromotionOrchestrator {
    store: Arc<dyn ArtifactStore>,
    settings: PipelineSettings,
    metrics: PipelineMetrics,
    logger: StructuredLogger,
}

impl PromotionOrchestrator {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        settings: PipelineSettings,
        metrics: PipelineMetrics,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            store,
            settings,
            metrics,
            logger,
        }
    }

    /// Execute one publish run to completion
    pub async fn run(&self) -> PublishReport {
        let started = Instant::now();
        let report = self.execute().await;

        self.metrics
            .observe_run(pipelines::PUBLISH, report.outcome.as_str(), started.elapsed().as_secs_f64());
        match report.fault {
            Some(PublishFault::Storage) => self.metrics.inc_storage_errors(),
            Some(PublishFault::PartialPromotion) => {
                self.metrics.inc_storage_errors();
                self.metrics.inc_partial_promotions();
            }
            _ => {}
        }
        if report.promoted {
            self.metrics.inc_promotions();
        }
        if let Some(model) = &report.live_model {
            self.metrics.set_live_model(model);
        }
        self.logger
            .log_publish(report.outcome.as_str(), report.live_model.as_deref(), report.promoted);

        report
    }

    async fn execute(&self) -> PublishReport {
        let store = self.store.as_ref();
        let stage_prefix = self.settings.stage_prefix.as_str();
        let prod_prefix = self.settings.prod_prefix.as_str();
        let mut run = Run::new();

        // the two loads are independent; a failure in one is still reported
        // alongside the result of the other
        let prod = find_latest_evaluation(store, prod_prefix).await;
        let stage = find_latest_evaluation(store, stage_prefix).await;

        let mut load_fault = None;
        for (label, prefix, result) in [
            ("production", prod_prefix, &prod),
            ("stage", stage_prefix, &stage),
        ] {
            match result {
                Ok(Some(latest)) => run.say(format!(
                    "Loaded {label} model evaluation data from {}.",
                    latest.handle.name
                )),
                Ok(None) => {}
                Err(e) => {
                    run.say(format!(
                        "ERROR: Failed to load {label} model evaluation data from {prefix}. Details: {e}"
                    ));
                    load_fault.get_or_insert(fault_of(e));
                }
            }
        }

        let (prod, stage) = match (prod, stage) {
            (Ok(prod), Ok(stage)) => (prod, stage),
            (prod, _) => {
                let fault = load_fault.unwrap_or(PublishFault::Storage);
                error!(fault = ?fault, "Publish halted, evaluation data could not be loaded");
                let live = match prod {
                    Ok(Some(p)) => live_model_for(&p.handle),
                    _ => None,
                };
                return run.finish(PublishOutcome::Failed, live, Some(fault));
            }
        };
        run.enter(PublishState::EvaluationsLoaded);

        let Some(stage) = stage else {
            run.say(format!(
                "No stage model evaluation data found in {stage_prefix}. Nothing to publish."
            ));
            let live = prod.as_ref().and_then(|p| live_model_for(&p.handle));
            return run.finish(PublishOutcome::NothingStaged, live, None);
        };

        // a header-only production table carries no baseline
        let prod = prod.filter(|p| !p.table.is_empty());
        let prior_live = prod.as_ref().and_then(|p| live_model_for(&p.handle));

        let outcome = match prod {
            None => {
                run.enter(PublishState::NoProdBaseline);
                run.say(format!(
                    "No production model evaluation data found. Promoting stage model evaluated in {} to production.",
                    stage.handle.name
                ));
                PublishOutcome::Bootstrapped
            }
            Some(prod) => {
                run.enter(PublishState::BaselineCompared);
                let comparison = match compare(&prod.table, &stage.table, &self.settings.comparison_metrics) {
                    Ok(comparison) => comparison,
                    Err(e) => {
                        let fault = fault_of(&e);
                        return run.fail(
                            format!("ERROR: Failed to compare model performances. Details: {e}"),
                            fault,
                            prior_live,
                        );
                    }
                };
                run.say(comparison.message.clone());
                let promote_staged = comparison.promote;
                run.comparison = Some(comparison);

                if !promote_staged {
                    run.enter(PublishState::NotPromoted);
                    let live = live_model_for(&prod.handle);
                    run.say(match &live {
                        Some(model) => format!("Stage model not promoted. Production model {model} remains live."),
                        None => "Stage model not promoted. Production model is unchanged.".to_string(),
                    });
                    return run.finish(PublishOutcome::NotPromoted, live, None);
                }
                PublishOutcome::Promoted
            }
        };

        self.promote_staged(run, &stage, outcome, prior_live).await
    }

    async fn promote_staged(
        &self,
        mut run: Run,
        stage: &LatestEvaluation,
        outcome: PublishOutcome,
        prior_live: Option<String>,
    ) -> PublishReport {
        match promote(
            self.store.as_ref(),
            &self.settings.stage_prefix,
            &stage.handle,
            &self.settings.prod_prefix,
        )
        .await
        {
            Ok(receipt) => {
                run.enter(PublishState::Promoted);
                run.say(receipt.message);
                run.say(format!("Model published to production: {}", receipt.production_model));
                run.finish(outcome, Some(receipt.production_model), None)
            }
            Err(e) => {
                let fault = match &e {
                    PromotionError::Naming(_) => PublishFault::Naming,
                    e if e.is_partial() => PublishFault::PartialPromotion,
                    _ => PublishFault::Storage,
                };
                // prod evaluation is copied last, so the prior model stays live
                run.fail(format!("ERROR: {e}"), fault, prior_live)
            }
        }
    }
}

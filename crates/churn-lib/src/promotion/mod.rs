//! Model promotion: compare a staged model against production and copy it over
//!
//! - `comparator`: positive-class metric comparison
//! - `executor`: the two-step copy into production
//! - `orchestrator`: the publish workflow tying both together

mod comparator;
mod executor;
mod orchestrator;

pub use comparator::{compare, ComparisonOutcome, MetricDelta};
pub use executor::{promote, PromotionError, PromotionReceipt, PromotionStep};
pub use orchestrator::{PromotionOrchestrator, PublishFault, PublishOutcome, PublishReport, PublishState};

//! tca-planner library interface
//!
//! Aggregates engagement, sentiment, trend and pageview signals for a
//! trailer, ranks target regions and plans a phased rollout. Every derived
//! number is traceable to evidence in a per-run ledger.

pub mod advisory;
pub mod analysis;
pub mod collectors;
pub mod config;
pub mod error;
pub mod ledger;
pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod rollout;
pub mod scorer;
pub mod storage;

pub use crate::error::{PlannerError, PlannerResult};
pub use crate::orchestrator::{CampaignPipeline, CampaignRequest, StageOutcome};

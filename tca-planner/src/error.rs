//! Error types for tca-planner
//!
//! Structural failures (bad input, bad policy, broken invariants) surface as
//! `PlannerError`. Collector failures are not fatal on their own; the
//! orchestrator turns them into skipped stages and only the mandatory
//! stages escalate them into a failed run.

use chrono::NaiveDate;
use thiserror::Error;

use crate::collectors::CollectorError;
use crate::models::Stage;

/// Result alias for planner operations
pub type PlannerResult<T> = Result<T, PlannerError>;

/// Planner error type
#[derive(Debug, Error)]
pub enum PlannerError {
    /// An external source could not be reached or returned garbage
    #[error("Source unavailable for {stage} stage: {reason}")]
    SourceUnavailable { stage: Stage, reason: String },

    /// An external source kept rejecting requests after the retry
    #[error("Rate limited in {stage} stage")]
    RateLimited { stage: Stage },

    /// Release date is not after the campaign start
    #[error("Invalid campaign window: release date {release_date} must be after campaign start {campaign_start}")]
    InvalidWindow {
        campaign_start: NaiveDate,
        release_date: NaiveDate,
    },

    /// A computed result broke one of its own guarantees
    #[error("Internal invariant violated in {component}: {detail}")]
    InternalInvariantViolation {
        component: &'static str,
        detail: String,
    },

    /// Caller supplied input that cannot be planned
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Policy configuration failed validation
    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    /// tca-common error
    #[error("Common error: {0}")]
    Common(#[from] tca_common::Error),
}

impl PlannerError {
    /// Attribute a collector failure to the stage that issued the call
    pub fn from_collector(stage: Stage, err: CollectorError) -> Self {
        match err {
            CollectorError::RateLimited { .. } => Self::RateLimited { stage },
            other => Self::SourceUnavailable {
                stage,
                reason: other.detail(),
            },
        }
    }

    pub(crate) fn invariant(component: &'static str, detail: impl Into<String>) -> Self {
        Self::InternalInvariantViolation {
            component,
            detail: detail.into(),
        }
    }
}

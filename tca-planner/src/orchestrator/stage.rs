//! Stage execution
//!
//! Every external call runs under a guard that races it against the stage
//! deadline, the remaining run deadline and the run's cancellation token,
//! and converts whatever happens into a `StageOutcome`. A rate-limited call
//! is retried once, inside the same stage deadline.

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tca_common::events::{EventBus, PipelineEvent};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::collectors::CollectorError;
use crate::error::PlannerError;
use crate::ledger::EvidenceLedger;
use crate::models::{SkipReason, Stage, StageReport, StageStatus};
use crate::progress::ProgressTracker;

const MAX_ATTEMPTS: u32 = 2;

/// Result of one stage
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome<T> {
    Completed(T),
    /// Optional stage produced nothing; the run continues degraded
    Skipped(SkipReason),
    /// Mandatory stage did not complete
    Failed(String),
}

impl<T> StageOutcome<T> {
    pub fn status(&self) -> StageStatus {
        match self {
            StageOutcome::Completed(_) => StageStatus::Completed,
            StageOutcome::Skipped(_) => StageStatus::Skipped,
            StageOutcome::Failed(_) => StageStatus::Failed,
        }
    }

    pub fn reason(&self) -> Option<String> {
        match self {
            StageOutcome::Completed(_) => None,
            StageOutcome::Skipped(reason) => Some(reason.to_string()),
            StageOutcome::Failed(reason) => Some(reason.clone()),
        }
    }

    pub fn skip_reason(&self) -> Option<&SkipReason> {
        match self {
            StageOutcome::Skipped(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn completed(&self) -> Option<&T> {
        match self {
            StageOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> StageOutcome<U> {
        match self {
            StageOutcome::Completed(value) => StageOutcome::Completed(f(value)),
            StageOutcome::Skipped(reason) => StageOutcome::Skipped(reason),
            StageOutcome::Failed(reason) => StageOutcome::Failed(reason),
        }
    }

    /// Escalate a skip of a mandatory stage into a failure
    pub fn require(self) -> Self {
        match self {
            StageOutcome::Skipped(reason) => StageOutcome::Failed(reason.to_string()),
            other => other,
        }
    }
}

/// Outcome plus wall time
#[derive(Debug)]
pub(crate) struct Timed<T> {
    pub outcome: StageOutcome<T>,
    pub elapsed_ms: u64,
}

impl<T> Timed<T> {
    pub fn instant(outcome: StageOutcome<T>) -> Self {
        Self {
            outcome,
            elapsed_ms: 0,
        }
    }

    pub fn map_outcome<U>(self, f: impl FnOnce(T) -> U) -> Timed<U> {
        Timed {
            outcome: self.outcome.map(f),
            elapsed_ms: self.elapsed_ms,
        }
    }
}

/// Per-run state shared by every stage
pub(crate) struct RunContext {
    pub run_id: Uuid,
    pub ledger: Arc<EvidenceLedger>,
    pub progress: ProgressTracker,
    bus: Option<EventBus>,
    deadline: Instant,
    cancel: CancellationToken,
}

impl RunContext {
    pub fn new(
        run_id: Uuid,
        progress: ProgressTracker,
        bus: Option<EventBus>,
        run_budget: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            run_id,
            ledger: Arc::new(EvidenceLedger::new(run_id)),
            progress,
            bus,
            deadline: Instant::now() + run_budget,
            cancel,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn emit(&self, event: PipelineEvent) {
        if let Some(bus) = &self.bus {
            bus.emit_lossy(event);
        }
    }

    /// Run an external call under the stage guard
    pub async fn guard<T, F, Fut>(&self, stage: Stage, stage_deadline: Duration, mut call: F) -> Timed<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, CollectorError>>,
    {
        let started = Instant::now();
        let elapsed_ms = || started.elapsed().as_millis() as u64;

        self.emit(PipelineEvent::StageStarted {
            run_id: self.run_id,
            stage: stage.name().to_string(),
            timestamp: Utc::now(),
        });
        debug!(stage = %stage, deadline_ms = stage_deadline.as_millis() as u64, "Stage started");

        let mut attempt = 0;
        let outcome = loop {
            attempt += 1;

            if self.cancel.is_cancelled() {
                break StageOutcome::Skipped(SkipReason::Cancelled);
            }
            let stage_left = stage_deadline.saturating_sub(started.elapsed());
            let run_left = self.remaining();
            if run_left.is_zero() {
                break StageOutcome::Skipped(SkipReason::RunDeadline);
            }
            if stage_left.is_zero() {
                break StageOutcome::Skipped(SkipReason::Timeout {
                    after_ms: elapsed_ms(),
                });
            }
            let run_bound = run_left < stage_left;

            let result = tokio::select! {
                _ = self.cancel.cancelled() => break StageOutcome::Skipped(SkipReason::Cancelled),
                result = tokio::time::timeout(stage_left.min(run_left), call()) => result,
            };

            match result {
                Err(_) if run_bound => break StageOutcome::Skipped(SkipReason::RunDeadline),
                Err(_) => {
                    break StageOutcome::Skipped(SkipReason::Timeout {
                        after_ms: elapsed_ms(),
                    })
                }
                Ok(Ok(Some(value))) => break StageOutcome::Completed(value),
                Ok(Ok(None)) => break StageOutcome::Skipped(SkipReason::Empty),
                Ok(Err(err @ CollectorError::RateLimited { .. })) if attempt < MAX_ATTEMPTS => {
                    warn!(
                        stage = %stage,
                        error = %PlannerError::from_collector(stage, err),
                        "Retrying rate-limited call once"
                    );
                }
                Ok(Err(CollectorError::RateLimited { .. })) => {
                    break StageOutcome::Skipped(SkipReason::RateLimited { attempts: attempt })
                }
                Ok(Err(err)) => {
                    let detail = err.detail();
                    warn!(
                        stage = %stage,
                        error = %PlannerError::from_collector(stage, err),
                        "Collector failed"
                    );
                    break StageOutcome::Skipped(SkipReason::SourceUnavailable { detail });
                }
            }
        };

        Timed {
            outcome,
            elapsed_ms: elapsed_ms(),
        }
    }

    /// Log and broadcast a stage's terminal state
    pub fn finish<T>(&self, stage: Stage, timed: &Timed<T>) -> StageReport {
        let report = StageReport {
            stage,
            status: timed.outcome.status(),
            reason: timed.outcome.reason(),
            elapsed_ms: timed.elapsed_ms,
        };

        match &timed.outcome {
            StageOutcome::Completed(_) => {
                info!(stage = %stage, elapsed_ms = timed.elapsed_ms, "Stage completed")
            }
            StageOutcome::Skipped(reason) => warn!(
                stage = %stage,
                elapsed_ms = timed.elapsed_ms,
                reason = %reason,
                "Stage skipped, continuing in degraded mode"
            ),
            StageOutcome::Failed(reason) => tracing::error!(
                stage = %stage,
                elapsed_ms = timed.elapsed_ms,
                reason = %reason,
                "Mandatory stage failed"
            ),
        }

        self.emit(PipelineEvent::StageFinished {
            run_id: self.run_id,
            stage: stage.name().to_string(),
            status: report.status.as_str().to_string(),
            reason: report.reason.clone(),
            elapsed_ms: report.elapsed_ms,
            timestamp: Utc::now(),
        });
        report
    }
}

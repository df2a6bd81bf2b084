//! Progress reporting
//!
//! Callers observe a run through `ProgressReporter` callbacks and, when an
//! `EventBus` is attached, through broadcast `PipelineEvent::Progress`
//! events. Within a run the reported percentage never decreases, even when
//! concurrent stages finish out of order.

use chrono::Utc;
use std::sync::{Arc, Mutex};
use tca_common::events::{EventBus, PipelineEvent};
use tracing::info;
use uuid::Uuid;

/// Progress callback
pub trait ProgressReporter: Send + Sync {
    /// `percent` is 0-100 and never lower than a previous call in the same run
    fn on_progress(&self, percent: u8, stage: &str, message: &str);
}

impl<F> ProgressReporter for F
where
    F: Fn(u8, &str, &str) + Send + Sync,
{
    fn on_progress(&self, percent: u8, stage: &str, message: &str) {
        self(percent, stage, message)
    }
}

/// Reporter that writes progress to the tracing log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn on_progress(&self, percent: u8, stage: &str, message: &str) {
        info!(percent, stage, "{}", message);
    }
}

/// Per-run monotonic progress fan-out
pub(crate) struct ProgressTracker {
    run_id: Uuid,
    reporters: Vec<Arc<dyn ProgressReporter>>,
    bus: Option<EventBus>,
    // Held while reporting so concurrent updates are delivered in order
    last: Mutex<u8>,
}

impl ProgressTracker {
    pub(crate) fn new(
        run_id: Uuid,
        reporters: Vec<Arc<dyn ProgressReporter>>,
        bus: Option<EventBus>,
    ) -> Self {
        Self {
            run_id,
            reporters,
            bus,
            last: Mutex::new(0),
        }
    }

    /// Report progress, raised to the highest value already reported
    pub(crate) fn advance(&self, percent: u8, stage: &str, message: &str) -> u8 {
        let mut last = self.last.lock().unwrap_or_else(|p| p.into_inner());
        let effective = percent.min(100).max(*last);
        *last = effective;

        for reporter in &self.reporters {
            reporter.on_progress(effective, stage, message);
        }
        if let Some(bus) = &self.bus {
            bus.emit_lossy(PipelineEvent::Progress {
                run_id: self.run_id,
                percent: effective,
                stage: stage.to_string(),
                message: message.to_string(),
                timestamp: Utc::now(),
            });
        }
        effective
    }
}

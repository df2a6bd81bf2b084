//! Event types for the TCA pipeline
//!
//! Provides pipeline event definitions and the `EventBus` used to fan
//! progress out to any number of listeners (CLI log, UI stream, tests).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Pipeline event types
///
/// Stage and status names are plain strings so consumers do not need the
/// planner crate to decode events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// A pipeline run started
    RunStarted {
        run_id: Uuid,
        movie_reference: String,
        target_regions: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// A stage began executing
    StageStarted {
        run_id: Uuid,
        stage: String,
        timestamp: DateTime<Utc>,
    },

    /// A stage reached a terminal state
    StageFinished {
        run_id: Uuid,
        stage: String,
        /// "completed", "skipped" or "failed"
        status: String,
        /// Skip or failure reason
        reason: Option<String>,
        elapsed_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Progress update (0-100, never decreasing within a run)
    Progress {
        run_id: Uuid,
        percent: u8,
        stage: String,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// A pipeline run reached a terminal state
    RunFinished {
        run_id: Uuid,
        /// "completed", "completed_degraded" or "failed"
        status: String,
        skipped_stages: Vec<String>,
        timestamp: DateTime<Utc>,
    },
}

impl PipelineEvent {
    /// Run the event belongs to
    pub fn run_id(&self) -> Uuid {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::StageStarted { run_id, .. }
            | Self::StageFinished { run_id, .. }
            | Self::Progress { run_id, .. }
            | Self::RunFinished { run_id, .. } => *run_id,
        }
    }
}

/// Broadcast bus for pipeline events
///
/// Cloning is cheap; all clones share one channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before slow receivers lag
    ///
    /// # Examples
    ///
    /// ```
    /// use tca_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PipelineEvent,
    ) -> Result<usize, broadcast::error::SendError<PipelineEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(run_id: Uuid, percent: u8) -> PipelineEvent {
        PipelineEvent::Progress {
            run_id,
            percent,
            stage: "metadata".to_string(),
            message: "Movie metadata resolved".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        let run_id = Uuid::new_v4();

        assert_eq!(bus.emit(progress(run_id, 10)).unwrap(), 1);

        match rx.recv().await.unwrap() {
            PipelineEvent::Progress { percent, stage, .. } => {
                assert_eq!(percent, 10);
                assert_eq!(stage, "metadata");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(progress(Uuid::new_v4(), 5)).is_err());
        // Lossy emit must not panic
        bus.emit_lossy(progress(Uuid::new_v4(), 5));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let run_id = Uuid::new_v4();
        let json = serde_json::to_value(PipelineEvent::RunFinished {
            run_id,
            status: "completed_degraded".to_string(),
            skipped_stages: vec!["trend".to_string()],
            timestamp: Utc::now(),
        })
        .unwrap();

        assert_eq!(json["type"], "RunFinished");
        assert_eq!(json["status"], "completed_degraded");
        assert_eq!(json["skipped_stages"][0], "trend");
    }

    #[test]
    fn test_run_id_accessor() {
        let run_id = Uuid::new_v4();
        assert_eq!(progress(run_id, 50).run_id(), run_id);
    }
}

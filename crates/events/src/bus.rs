//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the central publish/subscribe hub for [`JobEvent`]s.
//! It is designed to be shared via `Arc<EventBus>` across the application.

use atelier_core::job::{Job, JobErrorInfo, JobStatus};
use atelier_core::types::{DbId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// JobEvent
// ---------------------------------------------------------------------------

/// Message type tag carried in every serialized event.
pub const MSG_TYPE_JOB_UPDATE: &str = "job.update";

/// A change to a job, as seen by live-feed subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub job_id: DbId,
    pub owner_scope: DbId,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<i16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Vec<DbId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobErrorInfo>,
    pub timestamp: Timestamp,
}

impl JobEvent {
    /// Snapshot a job's current state as an event.
    pub fn from_job(job: &Job) -> Self {
        Self {
            msg_type: MSG_TYPE_JOB_UPDATE.to_string(),
            job_id: job.id,
            owner_scope: job.owner_scope,
            status: job.status(),
            progress: job.state.progress(),
            result: job.state.result().map(<[DbId]>::to_vec),
            error: job.state.error().cloned(),
            timestamp: Utc::now(),
        }
    }

    /// A progress tick for a processing job.
    pub fn progress(job_id: DbId, owner_scope: DbId, percent: i16) -> Self {
        Self {
            msg_type: MSG_TYPE_JOB_UPDATE.to_string(),
            job_id,
            owner_scope,
            status: JobStatus::Processing,
            progress: Some(percent),
            result: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`JobEvent`].
pub struct EventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: JobEvent) {
        // Ignore the SendError — it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(JobEvent::progress(4, 1, 30));

        let e1 = rx1.recv().await.expect("subscriber 1 should receive");
        let e2 = rx2.recv().await.expect("subscriber 2 should receive");

        assert_eq!(e1.job_id, 4);
        assert_eq!(e2.progress, Some(30));
        assert!(!e1.is_terminal());
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish(JobEvent::progress(1, 1, 0));
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let event = JobEvent::progress(9, 2, 55);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], MSG_TYPE_JOB_UPDATE);
        assert_eq!(json["status"], "processing");
        assert!(json.get("error").is_none());

        let back: JobEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}

//! Event recording against master objects.
//!
//! Recording is best effort: `record` cannot fail, so a broken recorder never
//! changes the outcome of a pass.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use seed_sync_store::{Resource, Uid};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Severity of a recorded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Normal,
    Warning,
}

/// An event attached to an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedEvent {
    pub object_name: String,
    pub uid: Uid,
    pub event_type: EventType,
    /// Short machine-readable reason, e.g. `ReconcilingError`.
    pub reason: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl RecordedEvent {
    /// Create an event about `object`.
    pub fn new(
        object: &Resource,
        event_type: EventType,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            object_name: object.name().to_string(),
            uid: object.uid().clone(),
            event_type,
            reason: reason.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a warning about `object`.
    pub fn warning(object: &Resource, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(object, EventType::Warning, reason, message)
    }
}

/// Sink for object events.
#[async_trait]
pub trait EventRecorder: Send + Sync {
    async fn record(&self, event: RecordedEvent);
}

/// Recorder that emits every event as a tracing record.
#[derive(Debug, Clone)]
pub struct TracingRecorder {
    component: String,
}

impl TracingRecorder {
    /// Create a recorder reporting as `component`.
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }
}

#[async_trait]
impl EventRecorder for TracingRecorder {
    async fn record(&self, event: RecordedEvent) {
        match event.event_type {
            EventType::Warning => warn!(
                component = %self.component,
                object = %event.object_name,
                uid = %event.uid,
                reason = %event.reason,
                message = %event.message,
                "Recorded event"
            ),
            EventType::Normal => info!(
                component = %self.component,
                object = %event.object_name,
                uid = %event.uid,
                reason = %event.reason,
                message = %event.message,
                "Recorded event"
            ),
        }
    }
}

/// Recorder that keeps every event in memory.
#[derive(Debug, Default)]
pub struct InMemoryRecorder {
    events: RwLock<Vec<RecordedEvent>>,
}

impl InMemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events, oldest first.
    pub async fn events(&self) -> Vec<RecordedEvent> {
        self.events.read().await.clone()
    }

    /// Warnings recorded against `name`.
    pub async fn warnings_for(&self, name: &str) -> Vec<RecordedEvent> {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| e.event_type == EventType::Warning && e.object_name == name)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventRecorder for InMemoryRecorder {
    async fn record(&self, event: RecordedEvent) {
        self.events.write().await.push(event);
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_recorder_filters_warnings() {
        let recorder = InMemoryRecorder::new();
        let alpha = Resource::new("alpha");
        let beta = Resource::new("beta");

        recorder
            .record(RecordedEvent::warning(&alpha, "ReconcilingError", "seed-b unreachable"))
            .await;
        recorder
            .record(RecordedEvent::new(&alpha, EventType::Normal, "Synced", "ok"))
            .await;
        recorder
            .record(RecordedEvent::warning(&beta, "ReconcilingError", "boom"))
            .await;

        assert_eq!(recorder.events().await.len(), 3);
        let warnings = recorder.warnings_for("alpha").await;
        assert_eq!(warnings.len(), 1);
        let warning = warnings.first().unwrap();
        assert_eq!(warning.reason, "ReconcilingError");
        assert_eq!(warning.message, "seed-b unreachable");
    }

    #[tokio::test]
    async fn test_tracing_recorder_accepts_both_severities() {
        let recorder = TracingRecorder::new("master-sync-controller");
        let alpha = Resource::new("alpha");

        recorder
            .record(RecordedEvent::warning(&alpha, "ReconcilingError", "boom"))
            .await;
        recorder
            .record(RecordedEvent::new(&alpha, EventType::Normal, "Synced", "ok"))
            .await;
    }
}

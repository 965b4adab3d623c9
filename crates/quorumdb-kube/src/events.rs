//! Kubernetes Event recording
//!
//! Events are fire-and-forget: failures are logged as warnings and never
//! propagate errors. A failed event must never break reconciliation.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::Client;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use tracing::warn;

use crate::config::SyncerConfig;

/// Event type shown in `kubectl get events`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Normal,
    Warning,
}

impl From<Severity> for EventType {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Normal => EventType::Normal,
            Severity::Warning => EventType::Warning,
        }
    }
}

/// Publishes events about an object
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event on `resource_ref`, logging failures
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        severity: Severity,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Publisher wrapping `kube::runtime::events::Recorder`
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// The reporter's controller is the event's `reportingComponent`
    pub fn new(client: Client, reporter: Reporter) -> Self {
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }

    /// Publisher reporting as the syncer's controller name
    pub fn from_config(client: Client, config: &SyncerConfig) -> Self {
        Self::new(client, config.reporter())
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        severity: Severity,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_: severity.into(),
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(reason, action, error = %e, "Failed to publish Kubernetes event");
        }
    }
}

/// Publisher that drops every event
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _severity: Severity,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// An event kept by [`MemoryEventPublisher`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub object: Option<String>,
    pub severity: Severity,
    pub reason: String,
    pub action: String,
    pub note: Option<String>,
}

/// Publisher that keeps events in memory, for assertions
#[derive(Clone, Default)]
pub struct MemoryEventPublisher {
    events: Arc<Mutex<Vec<RecordedEvent>>>,
}

impl MemoryEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl EventPublisher for MemoryEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        severity: Severity,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedEvent {
                object: resource_ref.name.clone(),
                severity,
                reason: reason.to_string(),
                action: action.to_string(),
                note,
            });
    }
}

/// Event reasons, shown under REASON
pub mod reasons {
    pub const STATEFULSET_SUCCEEDED: &str = "StatefulSetSucceeded";
    pub const STATEFULSET_FAILED: &str = "StatefulSetFailed";
}

/// Event actions, shown under ACTION
pub mod actions {
    pub const SYNC: &str = "Sync";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publishers_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NoopEventPublisher>();
        assert_send_sync::<MemoryEventPublisher>();
        assert_send_sync::<KubeEventPublisher>();
    }

    #[test]
    fn test_severity_maps_to_event_type() {
        assert!(matches!(EventType::from(Severity::Normal), EventType::Normal));
        assert!(matches!(EventType::from(Severity::Warning), EventType::Warning));
    }

    #[tokio::test]
    async fn test_noop_publisher_does_not_panic() {
        NoopEventPublisher
            .publish(
                &ObjectReference::default(),
                Severity::Normal,
                reasons::STATEFULSET_SUCCEEDED,
                actions::SYNC,
                None,
            )
            .await;
    }

    #[tokio::test]
    async fn test_memory_publisher_records_in_order() {
        let publisher = MemoryEventPublisher::new();
        let object = ObjectReference {
            name: Some("sample".to_string()),
            ..Default::default()
        };

        publisher
            .publish(&object, Severity::Normal, reasons::STATEFULSET_SUCCEEDED, actions::SYNC, Some("ok".to_string()))
            .await;
        publisher
            .publish(&object, Severity::Warning, reasons::STATEFULSET_FAILED, actions::SYNC, None)
            .await;

        let events = publisher.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].object.as_deref(), Some("sample"));
        assert_eq!(events[0].note.as_deref(), Some("ok"));
        assert_eq!(events[1].severity, Severity::Warning);
        assert_eq!(events[1].reason, "StatefulSetFailed");
    }
}

//! Event recording.
//!
//! Reconcilers report what they did as Kubernetes events attached to the
//! object they act on. A lost event never fails a pass: publishing errors are
//! logged and dropped.

use k8s_openapi::api::core::v1::ObjectReference;
use kube::Client;
use kube::runtime::events::{self as kube_events, Recorder, Reporter};
use parking_lot::RwLock;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Future returned by [`EventRecorder::record`].
pub type RecordFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Severity of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Expected operation.
    Normal,
    /// Something needs attention.
    Warning,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => f.write_str("Normal"),
            Self::Warning => f.write_str("Warning"),
        }
    }
}

impl From<EventType> for kube_events::EventType {
    fn from(type_: EventType) -> Self {
        match type_ {
            EventType::Normal => Self::Normal,
            EventType::Warning => Self::Warning,
        }
    }
}

/// An event about an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Severity.
    pub type_: EventType,
    /// CamelCase reason, e.g. `SecretSyncSuccessful`.
    pub reason: String,
    /// Human-readable message.
    pub message: String,
}

impl Event {
    /// A `Normal` event.
    pub fn normal(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_: EventType::Normal,
            reason: reason.into(),
            message: message.into(),
        }
    }

    /// A `Warning` event.
    pub fn warning(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_: EventType::Warning,
            reason: reason.into(),
            message: message.into(),
        }
    }

    fn into_kube(self) -> kube_events::Event {
        kube_events::Event {
            type_: self.type_.into(),
            reason: self.reason,
            note: Some(self.message),
            action: "Reconcile".to_string(),
            secondary: None,
        }
    }
}

/// Sink for events.
pub trait EventRecorder: Send + Sync {
    /// Record `event` about the object referenced by `regarding`.
    fn record<'a>(&'a self, regarding: &'a ObjectReference, event: Event) -> RecordFuture<'a>;
}

/// Recorder publishing `events.k8s.io/v1` Events through kube's [`Recorder`],
/// which also folds repeats into an event series.
#[derive(Clone)]
pub struct KubeEventRecorder {
    inner: Recorder,
}

impl KubeEventRecorder {
    /// Create a recorder reporting as `controller`, optionally from a
    /// specific `instance` (usually the pod name).
    pub fn new(client: Client, controller: impl Into<String>, instance: Option<String>) -> Self {
        let reporter = Reporter {
            controller: controller.into(),
            instance,
        };
        Self {
            inner: Recorder::new(client, reporter),
        }
    }
}

impl EventRecorder for KubeEventRecorder {
    fn record<'a>(&'a self, regarding: &'a ObjectReference, event: Event) -> RecordFuture<'a> {
        Box::pin(async move {
            let reason = event.reason.clone();
            if let Err(e) = self.inner.publish(&event.into_kube(), regarding).await {
                tracing::warn!(
                    kind = regarding.kind.as_deref().unwrap_or_default(),
                    name = regarding.name.as_deref().unwrap_or_default(),
                    reason = %reason,
                    error = %e,
                    "Failed to publish event"
                );
            }
        })
    }
}

/// Recorded event, as kept by [`MemoryRecorder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    /// Kind of the object the event is about.
    pub kind: String,
    /// `namespace/name` (or `name`) of the object the event is about.
    pub object: String,
    /// The event.
    pub event: Event,
}

/// In-memory recorder for tests.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    events: RwLock<Vec<RecordedEvent>>,
}

impl MemoryRecorder {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded events, oldest first.
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.read().clone()
    }

    /// Recorded reasons, oldest first.
    pub fn reasons(&self) -> Vec<String> {
        self.events
            .read()
            .iter()
            .map(|e| e.event.reason.clone())
            .collect()
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Check if no events were recorded.
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// First event with `reason`.
    pub fn find(&self, reason: &str) -> Option<RecordedEvent> {
        self.events
            .read()
            .iter()
            .find(|e| e.event.reason == reason)
            .cloned()
    }

    /// Forget every recorded event.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

impl EventRecorder for MemoryRecorder {
    fn record<'a>(&'a self, regarding: &'a ObjectReference, event: Event) -> RecordFuture<'a> {
        self.push(regarding, event);
        Box::pin(std::future::ready(()))
    }
}

impl MemoryRecorder {
    fn push(&self, regarding: &ObjectReference, event: Event) {
        let name = regarding.name.clone().unwrap_or_default();
        let object = match &regarding.namespace {
            Some(ns) => format!("{}/{}", ns, name),
            None => name,
        };

        self.events.write().push(RecordedEvent {
            kind: regarding.kind.clone().unwrap_or_default(),
            object,
            event,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site_ref() -> ObjectReference {
        ObjectReference {
            kind: Some("Wordpress".to_string()),
            name: Some("blog".to_string()),
            namespace: Some("sites".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn memory_recorder_keeps_order() {
        let recorder = MemoryRecorder::new();
        recorder
            .record(&site_ref(), Event::normal("SecretSyncSuccessful", "created"))
            .await;
        recorder
            .record(&site_ref(), Event::warning("DeploymentSyncFailed", "boom"))
            .await;

        assert_eq!(recorder.len(), 2);
        assert_eq!(
            recorder.reasons(),
            vec!["SecretSyncSuccessful", "DeploymentSyncFailed"]
        );

        let failed = recorder.find("DeploymentSyncFailed").unwrap();
        assert_eq!(failed.kind, "Wordpress");
        assert_eq!(failed.object, "sites/blog");
        assert_eq!(failed.event.type_, EventType::Warning);

        recorder.clear();
        assert!(recorder.is_empty());
    }

    #[test]
    fn event_type_display() {
        assert_eq!(EventType::Normal.to_string(), "Normal");
        assert_eq!(EventType::Warning.to_string(), "Warning");
    }

    #[test]
    fn converts_to_a_kube_event() {
        let event = Event::warning("InvalidSelector", "unknown operator Near").into_kube();

        assert_eq!(event.type_, kube_events::EventType::Warning);
        assert_eq!(event.reason, "InvalidSelector");
        assert_eq!(event.note.as_deref(), Some("unknown operator Near"));
        assert_eq!(event.action, "Reconcile");
        assert!(event.secondary.is_none());
    }
}

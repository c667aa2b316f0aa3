//! Structured event emission addressed to Submarine parents.

use async_trait::async_trait;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource};

use crate::crd::Submarine;

/// Event reason recorded when a Submarine syncs successfully.
pub const REASON_SYNCED: &str = "Synced";

/// Event reason recorded when a child name is squatted by a foreign object.
pub const REASON_ERR_RESOURCE_EXISTS: &str = "ErrResourceExists";

/// Message recorded with [`REASON_SYNCED`].
pub const MESSAGE_SYNCED: &str = "Submarine synced successfully";

/// Message recorded with [`REASON_ERR_RESOURCE_EXISTS`].
pub fn message_resource_exists(name: &str) -> String {
    format!("Resource \"{name}\" already exists and is not managed by Submarine")
}

/// Severity of an emitted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSeverity {
    /// Informational.
    Normal,
    /// Something needs operator attention.
    Warning,
}

/// Sink for reconciliation events.
///
/// Emission is best-effort: implementations log failures and never block or
/// fail the reconcile that produced the event.
#[async_trait]
pub trait EventRecorder: Send + Sync {
    /// Record one event against a Submarine.
    async fn event(
        &self,
        submarine: &Submarine,
        severity: EventSeverity,
        reason: &str,
        message: &str,
    );
}

/// Recorder publishing Kubernetes Events through the API server.
pub struct KubeEventRecorder {
    recorder: Recorder,
}

impl KubeEventRecorder {
    /// Create a recorder reporting as the `submarine-operator` controller.
    pub fn new(client: Client) -> Self {
        let reporter = Reporter {
            controller: "submarine-operator".to_string(),
            instance: None,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventRecorder for KubeEventRecorder {
    async fn event(
        &self,
        submarine: &Submarine,
        severity: EventSeverity,
        reason: &str,
        message: &str,
    ) {
        let event = Event {
            type_: match severity {
                EventSeverity::Normal => EventType::Normal,
                EventSeverity::Warning => EventType::Warning,
            },
            reason: reason.to_string(),
            note: Some(message.to_string()),
            action: "Reconcile".to_string(),
            secondary: None,
        };
        let reference = submarine.object_ref(&());
        if let Err(e) = self.recorder.publish(&event, &reference).await {
            tracing::warn!(error = %e, reason, "failed to publish event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_exists_message_matches_wire_format() {
        assert_eq!(
            message_resource_exists("submarine-server"),
            "Resource \"submarine-server\" already exists and is not managed by Submarine"
        );
    }
}

//! Kubernetes Event recording for the NATS controller
//!
//! Events are a side channel next to the status: they show up in
//! `kubectl describe nats` and `kubectl get events`. Publishing is
//! fire-and-forget; a failed event is logged and never fails a reconcile pass.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Trait for publishing Kubernetes Events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an Event about `resource_ref`
    ///
    /// * `type_` - Normal or Warning
    /// * `reason` - Machine-readable reason (see [`reasons`])
    /// * `action` - What the controller was doing (see [`actions`])
    /// * `note` - Optional human-readable message
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Production implementation wrapping `kube::runtime::events::Recorder`
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a publisher reporting as `controller_name`
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = kube::runtime::events::Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(reason, action, error = %e, "failed to publish Kubernetes event");
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
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Event reasons
///
/// These appear in `kubectl get events` under the REASON column.
pub mod reasons {
    /// A reconcile pass started
    pub const PROCESSING: &str = "Processing";
    /// Resources applied, waiting for the StatefulSet
    pub const DEPLOYING: &str = "Deploying";
    /// NATS is deployed
    pub const DEPLOYED: &str = "Deployed";
    /// A pass failed
    pub const FAILED_PROCESSING: &str = "FailedProcessing";
    /// The resource is not the allowed instance
    pub const FORBIDDEN: &str = "Forbidden";
    /// Pods are not spread over enough availability zones
    pub const NOT_CONFIGURED: &str = "NotConfigured";
    /// Deletion started
    pub const DELETING: &str = "Deleting";
}

/// Event actions
///
/// These appear in `kubectl get events` under the ACTION column.
pub mod actions {
    /// Standard reconciliation loop
    pub const RECONCILE: &str = "Reconcile";
    /// Applying rendered resources
    pub const DEPLOY: &str = "Deploy";
    /// Checking the single-instance policy
    pub const ADMIT: &str = "Admit";
    /// Deleting rendered resources
    pub const DELETE: &str = "Delete";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_publisher_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NoopEventPublisher>();
    }

    #[test]
    fn reasons_match_condition_vocabulary() {
        assert_eq!(reasons::FAILED_PROCESSING, "FailedProcessing");
        assert_eq!(reasons::DEPLOYED, "Deployed");
        assert_eq!(actions::RECONCILE, "Reconcile");
    }

    #[tokio::test]
    async fn noop_publisher_does_not_panic() {
        NoopEventPublisher
            .publish(
                &ObjectReference::default(),
                EventType::Warning,
                reasons::FORBIDDEN,
                actions::ADMIT,
                Some("test".to_string()),
            )
            .await;
    }
}

//! Supporting types for the NATS status

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Overall state of a NATS resource
///
/// The state only changes through the transition operations on
/// [`NatsStatus`](super::NatsStatus).
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum NatsState {
    /// Resources are being rendered, applied, or are converging
    #[default]
    Processing,
    /// The StatefulSet is ready and NATS is deployed
    Ready,
    /// The last pass failed or the resource is not allowed
    Error,
    /// Deletion is in progress
    Deleting,
    /// Deployed, but not spread across enough availability zones
    Warning,
}

impl std::fmt::Display for NatsState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Processing => write!(f, "Processing"),
            Self::Ready => write!(f, "Ready"),
            Self::Error => write!(f, "Error"),
            Self::Deleting => write!(f, "Deleting"),
            Self::Warning => write!(f, "Warning"),
        }
    }
}

/// Status of a condition
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Kubernetes-style condition for status reporting
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Condition {
    /// Type of condition (e.g., Available, StatefulSet)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    pub reason: String,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    /// Last time the condition status changed
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }

    /// Whether two conditions describe the same observation, ignoring the timestamp
    pub fn same_observation(&self, other: &Condition) -> bool {
        self.type_ == other.type_
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }
}

/// Condition types tracked on a NATS resource
pub mod condition_types {
    /// Whether NATS as a whole is available
    pub const AVAILABLE: &str = "Available";
    /// Whether the NATS StatefulSet is ready
    pub const STATEFUL_SET: &str = "StatefulSet";
    /// Whether the NATS pods are spread over availability zones
    pub const AVAILABILITY_ZONES: &str = "AvailabilityZones";
}

/// Condition reasons used on a NATS resource
pub mod condition_reasons {
    /// Reconciliation is in progress
    pub const PROCESSING: &str = "Processing";
    /// Resources are applied, waiting for the StatefulSet
    pub const DEPLOYING: &str = "Deploying";
    /// NATS is deployed
    pub const DEPLOYED: &str = "Deployed";
    /// A pass failed
    pub const PROCESSING_ERROR: &str = "FailedProcessing";
    /// The StatefulSet is available
    pub const STATEFUL_SET_AVAILABLE: &str = "Available";
    /// The StatefulSet is not ready yet
    pub const STATEFUL_SET_PENDING: &str = "Pending";
    /// Resources could not be synced
    pub const SYNC_FAIL_ERROR: &str = "FailedToSyncResources";
    /// The resource identity is not the allowed one
    pub const FORBIDDEN: &str = "Forbidden";
    /// The check does not apply to this configuration
    pub const NOT_CONFIGURED: &str = "NotConfigured";
}

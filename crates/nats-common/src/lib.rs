//! Common types for the NATS manager
//!
//! This crate holds everything the controller and the binary share: the
//! `NATS` custom resource and its status state machine, the error type,
//! Kubernetes event publishing, telemetry setup and metrics instruments.

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod events;
pub mod kube_utils;
pub mod labels;
pub mod metrics;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Name of the controller, used as field manager and event reporter
pub const CONTROLLER_NAME: &str = "nats-manager";

/// Finalizer gating deletion of a NATS resource until its resources are cleaned up
pub const NATS_FINALIZER: &str = "nats.operator.kyma-project.io/finalizer";

/// Minimum cluster size for NATS to run in clustered mode
pub const MIN_CLUSTER_SIZE: i32 = 3;

/// Number of distinct availability zones recommended for a clustered NATS
pub const RECOMMENDED_ZONE_COUNT: usize = 3;

/// Client port exposed by the NATS service
pub const NATS_CLIENT_PORT: u16 = 4222;

/// Name of the Istio DestinationRule CRD, probed to decide whether Istio is present
pub const DESTINATION_RULE_CRD_NAME: &str = "destinationrules.networking.istio.io";

/// Kind of the Istio DestinationRule resource
pub const DESTINATION_RULE_KIND: &str = "DestinationRule";

/// API version of the Istio DestinationRule resource
pub const DESTINATION_RULE_API_VERSION: &str = "networking.istio.io/v1alpha3";

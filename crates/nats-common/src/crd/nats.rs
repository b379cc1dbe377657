//! NATS Custom Resource Definition
//!
//! A NATS resource declares the desired shape of a clustered NATS deployment:
//! cluster size, JetStream storage, logging and container resources. The
//! controller renders and applies the matching StatefulSet, Service,
//! ConfigMap, Secret and PodDisruptionBudget, and reports progress on the
//! status subresource.

use std::collections::BTreeMap;

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::status::NatsStatus;
use crate::{Error, NATS_FINALIZER};

fn default_cluster_size() -> i32 {
    3
}

fn default_mem_storage_size() -> String {
    "20Mi".to_string()
}

fn default_storage_class_name() -> String {
    "default".to_string()
}

fn default_file_storage_size() -> String {
    "1Gi".to_string()
}

/// Specification for a NATS cluster
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "operator.kyma-project.io",
    version = "v1alpha1",
    kind = "NATS",
    root = "Nats",
    plural = "nats",
    namespaced,
    status = "NatsStatus",
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NatsSpec {
    /// Cluster topology
    #[serde(default)]
    pub cluster: ClusterSpec,

    /// JetStream storage configuration
    #[serde(default)]
    pub jet_stream: JetStreamSpec,

    /// Server logging flags
    #[serde(default)]
    pub logging: LoggingSpec,

    /// Container resource requests and limits for the NATS server
    #[serde(default)]
    pub resources: ResourcesSpec,

    /// Labels added to every generated resource
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Annotations added to every generated resource
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// Cluster topology
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Number of NATS replicas; must be odd
    #[serde(default = "default_cluster_size")]
    pub size: i32,
}

impl Default for ClusterSpec {
    fn default() -> Self {
        Self {
            size: default_cluster_size(),
        }
    }
}

/// JetStream storage configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JetStreamSpec {
    /// In-memory stream storage
    #[serde(default)]
    pub mem_storage: MemStorageSpec,

    /// File-backed stream storage
    #[serde(default)]
    pub file_storage: FileStorageSpec,
}

/// In-memory JetStream storage
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MemStorageSpec {
    /// Whether memory storage is enabled
    #[serde(default)]
    pub enabled: bool,

    /// Size of the memory storage (quantity)
    #[serde(default = "default_mem_storage_size")]
    pub size: String,
}

impl Default for MemStorageSpec {
    fn default() -> Self {
        Self {
            enabled: false,
            size: default_mem_storage_size(),
        }
    }
}

/// File-backed JetStream storage
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileStorageSpec {
    /// Storage class of the persistent volume claims
    #[serde(default = "default_storage_class_name")]
    pub storage_class_name: String,

    /// Size of each persistent volume claim (quantity)
    #[serde(default = "default_file_storage_size")]
    pub size: String,
}

impl Default for FileStorageSpec {
    fn default() -> Self {
        Self {
            storage_class_name: default_storage_class_name(),
            size: default_file_storage_size(),
        }
    }
}

/// Server logging flags
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoggingSpec {
    /// Enable debug logging
    #[serde(default)]
    pub debug: bool,

    /// Enable trace logging
    #[serde(default)]
    pub trace: bool,
}

/// CPU and memory quantities
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceQuantities {
    /// CPU quantity (e.g. "5m")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,

    /// Memory quantity (e.g. "16Mi")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

/// Container resource requests and limits
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourcesSpec {
    /// Resource requests
    #[serde(default)]
    pub requests: ResourceQuantities,

    /// Resource limits
    #[serde(default)]
    pub limits: ResourceQuantities,
}

impl Default for ResourcesSpec {
    fn default() -> Self {
        Self {
            requests: ResourceQuantities {
                cpu: Some("5m".to_string()),
                memory: Some("16Mi".to_string()),
            },
            limits: ResourceQuantities {
                cpu: Some("20m".to_string()),
                memory: Some("64Mi".to_string()),
            },
        }
    }
}

/// Whether a quantity string carries a usable, non-zero value
///
/// Empty strings and zero quantities ("0", "0Mi", "0.0") are treated as unset.
pub fn is_valid_quantity(quantity: &str) -> bool {
    let trimmed = quantity.trim();
    if trimmed.is_empty() {
        return false;
    }
    let numeric: String = trimmed
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if numeric.is_empty() {
        return false;
    }
    numeric.parse::<f64>().map(|v| v > 0.0).unwrap_or(false)
}

impl NatsSpec {
    /// Validate the spec
    ///
    /// The cluster size must be odd and at least 1.
    pub fn validate(&self) -> Result<(), Error> {
        if self.cluster.size < 1 {
            return Err(Error::validation_for_field(
                "NATS",
                "spec.cluster.size",
                "spec.cluster.size must be at least 1",
            ));
        }
        if self.cluster.size % 2 == 0 {
            return Err(Error::validation_for_field(
                "NATS",
                "spec.cluster.size",
                "spec.cluster.size only accepts odd numbers",
            ));
        }
        Ok(())
    }
}

impl Nats {
    /// Whether this resource carries the NATS manager finalizer
    pub fn has_finalizer(&self) -> bool {
        self.finalizers().iter().any(|f| f == NATS_FINALIZER)
    }

    /// Whether deletion of this resource has been requested
    pub fn is_in_deletion(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}

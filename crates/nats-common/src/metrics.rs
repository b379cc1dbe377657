//! Metrics instruments for the NATS manager
//!
//! Instruments are created on the global OpenTelemetry meter. Without an
//! installed meter provider they are no-ops, so recording is always safe.

use once_cell::sync::Lazy;
use opentelemetry::metrics::{Gauge, Meter};
use opentelemetry::{global, KeyValue};

static METER: Lazy<Meter> = Lazy::new(|| global::meter(crate::CONTROLLER_NAME));

/// Gauge of availability zones used by the NATS pods
///
/// Labels:
/// - `name`, `namespace`: the NATS resource
pub static AVAILABILITY_ZONES_USED: Lazy<Gauge<i64>> = Lazy::new(|| {
    METER
        .i64_gauge("nats_manager_availability_zones_used")
        .with_description("Number of availability zones used by NATS pods")
        .with_unit("{zones}")
        .build()
});

/// Gauge of the configured NATS cluster size
///
/// Labels:
/// - `name`, `namespace`: the NATS resource
pub static CLUSTER_SIZE: Lazy<Gauge<i64>> = Lazy::new(|| {
    METER
        .i64_gauge("nats_manager_cr_cluster_size")
        .with_description("Cluster size configured on the NATS resource")
        .with_unit("{replicas}")
        .build()
});

fn resource_labels(name: &str, namespace: &str) -> [KeyValue; 2] {
    [
        KeyValue::new("name", name.to_string()),
        KeyValue::new("namespace", namespace.to_string()),
    ]
}

/// Record the number of zones used by a NATS resource's pods
pub fn record_availability_zones_used(name: &str, namespace: &str, zones: usize) {
    let zones = i64::try_from(zones).unwrap_or(i64::MAX);
    AVAILABILITY_ZONES_USED.record(zones, &resource_labels(name, namespace));
}

/// Record the cluster size of a NATS resource
pub fn record_cluster_size(name: &str, namespace: &str, size: i32) {
    CLUSTER_SIZE.record(i64::from(size), &resource_labels(name, namespace));
}

//! Chart overrides derived from a NATS spec
//!
//! Overrides are flat dot-path keys; the chart module nests them and merges
//! them over the chart defaults.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use nats_common::crd::{is_valid_quantity, NatsSpec};
use nats_common::MIN_CLUSTER_SIZE;

/// Override key: render the Istio DestinationRule
pub const ISTIO_ENABLED_KEY: &str = "istio.enabled";
/// Override key: generate a fresh password
pub const ROTATE_PASSWORD_KEY: &str = "auth.rotatePassword";
/// Override key: reuse an existing password
pub const PASSWORD_KEY: &str = "auth.password";
/// Override key: run NATS in clustered mode
pub const CLUSTER_ENABLED_KEY: &str = "cluster.enabled";
/// Override key: number of replicas
pub const CLUSTER_SIZE_KEY: &str = "cluster.replicas";
/// Override key: storage class of the JetStream volumes
pub const FILE_STORAGE_CLASS_KEY: &str = "nats.jetstream.fileStorage.storageClassName";
/// Override key: size of the JetStream volumes
pub const FILE_STORAGE_SIZE_KEY: &str = "global.jetstream.fileStorage.size";
/// Override key: enable JetStream memory storage
pub const MEM_STORAGE_ENABLED_KEY: &str = "nats.jetstream.memStorage.enabled";
/// Override key: size of JetStream memory storage
pub const MEM_STORAGE_SIZE_KEY: &str = "nats.jetstream.memStorage.size";
/// Override key: server debug logging
pub const DEBUG_ENABLED_KEY: &str = "nats.logging.debug";
/// Override key: server trace logging
pub const TRACE_ENABLED_KEY: &str = "nats.logging.trace";
/// Override key: CPU request
pub const REQUESTS_CPU_KEY: &str = "nats.resources.requests.cpu";
/// Override key: memory request
pub const REQUESTS_MEMORY_KEY: &str = "nats.resources.requests.memory";
/// Override key: CPU limit
pub const LIMITS_CPU_KEY: &str = "nats.resources.limits.cpu";
/// Override key: memory limit
pub const LIMITS_MEMORY_KEY: &str = "nats.resources.limits.memory";
/// Override key: labels on every object
pub const COMMON_LABELS_KEY: &str = "commonLabels";
/// Override key: annotations on every object
pub const COMMON_ANNOTATIONS_KEY: &str = "commonAnnotations";

/// Container images used by the chart
///
/// Empty entries leave the chart's default image in place.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContainerImages {
    /// NATS server
    pub nats: String,
    /// Config reloader sidecar
    pub reloader: String,
    /// Prometheus exporter sidecar
    pub exporter: String,
    /// Alpine init image
    pub alpine: String,
}

/// Build the overrides for one release
///
/// `existing_password` is the password of the credentials Secret when it
/// already exists; without it the chart generates a new one.
pub fn generate_overrides(
    spec: &NatsSpec,
    istio_enabled: bool,
    existing_password: Option<&str>,
    images: &ContainerImages,
) -> BTreeMap<String, Value> {
    let mut overrides = BTreeMap::new();
    let mut set = |key: &str, value: Value| {
        overrides.insert(key.to_string(), value);
    };

    set(ISTIO_ENABLED_KEY, json!(istio_enabled));
    set(ROTATE_PASSWORD_KEY, json!(existing_password.is_none()));
    if let Some(password) = existing_password {
        set(PASSWORD_KEY, json!(password));
    }

    set(CLUSTER_SIZE_KEY, json!(spec.cluster.size));
    set(
        CLUSTER_ENABLED_KEY,
        json!(spec.cluster.size >= MIN_CLUSTER_SIZE),
    );

    let file_storage = &spec.jet_stream.file_storage;
    if !file_storage.storage_class_name.is_empty() {
        set(FILE_STORAGE_CLASS_KEY, json!(file_storage.storage_class_name));
    }
    if is_valid_quantity(&file_storage.size) {
        set(FILE_STORAGE_SIZE_KEY, json!(file_storage.size));
    }

    let mem_storage = &spec.jet_stream.mem_storage;
    set(MEM_STORAGE_ENABLED_KEY, json!(mem_storage.enabled));
    if mem_storage.enabled && is_valid_quantity(&mem_storage.size) {
        set(MEM_STORAGE_SIZE_KEY, json!(mem_storage.size));
    }

    set(DEBUG_ENABLED_KEY, json!(spec.logging.debug));
    set(TRACE_ENABLED_KEY, json!(spec.logging.trace));

    let quantities = [
        (REQUESTS_CPU_KEY, &spec.resources.requests.cpu),
        (REQUESTS_MEMORY_KEY, &spec.resources.requests.memory),
        (LIMITS_CPU_KEY, &spec.resources.limits.cpu),
        (LIMITS_MEMORY_KEY, &spec.resources.limits.memory),
    ];
    for (key, quantity) in quantities {
        if let Some(q) = quantity.as_deref().filter(|q| is_valid_quantity(q)) {
            set(key, json!(q));
        }
    }

    if !spec.labels.is_empty() {
        set(COMMON_LABELS_KEY, json!(spec.labels));
    }
    if !spec.annotations.is_empty() {
        set(COMMON_ANNOTATIONS_KEY, json!(spec.annotations));
    }

    let image_keys = [
        ("images.nats", &images.nats),
        ("images.reloader", &images.reloader),
        ("images.exporter", &images.exporter),
        ("images.alpine", &images.alpine),
    ];
    for (key, image) in image_keys {
        if !image.is_empty() {
            set(key, json!(image));
        }
    }

    overrides
}

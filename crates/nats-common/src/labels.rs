//! Well-known label keys and selectors
//!
//! Every object the manager renders carries the managed-by label; watches
//! and cleanup select on it.

/// Label key naming the tool that manages an object
pub const MANAGED_BY_LABEL_KEY: &str = "app.kubernetes.io/managed-by";

/// Managed-by value stamped on every rendered object
pub const MANAGED_BY_LABEL_VALUE: &str = "nats-manager";

/// Label key carrying the NATS resource name on generated objects
pub const INSTANCE_LABEL_KEY: &str = "app.kubernetes.io/instance";

/// Label key carrying the application name on NATS pods
pub const NAME_LABEL_KEY: &str = "app.kubernetes.io/name";

/// Application name of the NATS pods
pub const NAME_LABEL_VALUE: &str = "nats";

/// Node label holding the availability zone
pub const ZONE_LABEL_KEY: &str = "topology.kubernetes.io/zone";

/// Selector matching every object managed by this operator
pub fn managed_by_selector() -> String {
    format!("{}={}", MANAGED_BY_LABEL_KEY, MANAGED_BY_LABEL_VALUE)
}

/// Selector matching the NATS server pods of one resource
pub fn pod_selector(instance: &str) -> String {
    format!(
        "{}={},{}={}",
        NAME_LABEL_KEY, NAME_LABEL_VALUE, INSTANCE_LABEL_KEY, instance
    )
}

/// Selector matching every object generated for one resource
pub fn instance_selector(instance: &str) -> String {
    format!("{}={}", INSTANCE_LABEL_KEY, instance)
}

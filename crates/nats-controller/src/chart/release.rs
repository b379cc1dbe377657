//! Release instance and override merging
//!
//! Overrides are flat `"a.b.c" -> value` pairs. Before rendering they are
//! expanded into a nested tree and merged over the chart defaults.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use nats_common::Error;

use super::manifest::ManifestSet;

/// One rendering of the chart for a NATS resource
///
/// Lives for a single reconcile pass and is never persisted.
#[derive(Clone, Debug)]
pub struct ReleaseInstance {
    /// Name of the NATS resource, used as the release name
    pub name: String,
    /// Namespace the resources are rendered into
    pub namespace: String,
    /// Whether Istio is installed in the cluster
    pub istio_enabled: bool,
    overrides: BTreeMap<String, Value>,
    rendered: ManifestSet,
}

impl ReleaseInstance {
    /// Create a release with dot-path overrides
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        istio_enabled: bool,
        overrides: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            istio_enabled,
            overrides,
            rendered: ManifestSet::default(),
        }
    }

    /// The flat overrides this release was created with
    pub fn overrides(&self) -> &BTreeMap<String, Value> {
        &self.overrides
    }

    /// Overrides expanded into one nested tree
    pub fn configuration(&self) -> Result<Value, Error> {
        let mut merged = Value::Object(Map::new());
        for (key, value) in &self.overrides {
            deep_merge(&mut merged, nest_dot_path(key, value.clone())?);
        }
        Ok(merged)
    }

    /// Record the manifest set rendered for this release
    pub fn set_rendered(&mut self, rendered: ManifestSet) {
        self.rendered = rendered;
    }

    /// The manifest set rendered for this release
    pub fn rendered(&self) -> &ManifestSet {
        &self.rendered
    }
}

/// Expand `"a.b.c"` and a value into `{"a": {"b": {"c": value}}}`
pub fn nest_dot_path(key: &str, value: Value) -> Result<Value, Error> {
    let segments: Vec<&str> = key.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(Error::template(
            key,
            "override key contains an empty path segment",
        ));
    }

    Ok(segments.iter().rev().fold(value, |nested, segment| {
        let mut map = Map::new();
        map.insert((*segment).to_string(), nested);
        Value::Object(map)
    }))
}

/// Merge `overlay` into `base`
///
/// Objects merge key by key; any other value in `overlay` replaces the one
/// in `base`.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

//! Multi-document manifest parsing

use kube::api::DynamicObject;
use serde_json::Value;
use tracing::debug;

use nats_common::Error;

/// Objects rendered from the chart
///
/// `items` are Kubernetes objects in render order. `blobs` are documents that
/// are not Kubernetes objects, kept verbatim.
#[derive(Clone, Debug, Default)]
pub struct ManifestSet {
    /// Kubernetes objects, in render order
    pub items: Vec<DynamicObject>,
    /// Documents that could not be read as Kubernetes objects
    pub blobs: Vec<String>,
}

impl ManifestSet {
    /// Items of the given kind
    pub fn items_of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a DynamicObject> {
        self.items
            .iter()
            .filter(move |obj| obj.types.as_ref().is_some_and(|t| t.kind == kind))
    }

    /// StatefulSets among the items
    pub fn statefulsets(&self) -> impl Iterator<Item = &DynamicObject> {
        self.items_of_kind("StatefulSet")
    }
}

/// Split a rendered multi-document stream into objects and blobs
///
/// Empty and `null` documents, as well as empty mappings, are dropped.
/// Anything that does not read as a Kubernetes object is kept as a blob.
pub fn parse_manifests(rendered: &str) -> Result<ManifestSet, Error> {
    let mut set = ManifestSet::default();

    for doc in split_documents(rendered) {
        let doc = doc.trim();
        if doc.is_empty() || doc == "null" {
            continue;
        }

        let value = match serde_yaml::from_str::<Value>(doc) {
            Ok(value) => value,
            Err(_) => {
                set.blobs.push(format!("{}\n", doc));
                continue;
            }
        };

        match &value {
            Value::Object(map) if map.is_empty() => {}
            Value::Object(map) if is_kubernetes_object(map) => {
                match serde_json::from_value::<DynamicObject>(value) {
                    Ok(obj) => set.items.push(obj),
                    Err(e) => {
                        debug!(error = %e, "document is not a valid object, keeping it as a blob");
                        set.blobs.push(format!("{}\n", doc));
                    }
                }
            }
            _ => set.blobs.push(format!("{}\n", doc)),
        }
    }

    Ok(set)
}

fn is_kubernetes_object(map: &serde_json::Map<String, Value>) -> bool {
    map.get("apiVersion").is_some_and(Value::is_string)
        && map.get("kind").is_some_and(Value::is_string)
}

fn split_documents(rendered: &str) -> Vec<String> {
    let mut docs = Vec::new();
    let mut current = String::new();

    for line in rendered.lines() {
        if line.trim_end() == "---" {
            docs.push(std::mem::take(&mut current));
        } else {
            current.push_str(line);
            current.push('\n');
        }
    }
    docs.push(current);

    docs
}

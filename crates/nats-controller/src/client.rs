//! Kubernetes API access for the NATS controller
//!
//! Everything the reconciler reads or writes goes through [`KubeClient`], so
//! reconcile passes can be exercised against mocks.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{Node, PersistentVolumeClaim, Pod, Secret};
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams};
use kube::{Client, ResourceExt};
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use nats_common::crd::Nats;
use nats_common::kube_utils::{api_resource_for, crd_exists, display_name};
use nats_common::labels::ZONE_LABEL_KEY;
use nats_common::{Error, CONTROLLER_NAME};

/// How long a node's zone is trusted before it is read again
pub const NODE_ZONE_TTL: Duration = Duration::from_secs(10 * 60 * 60);

/// Trait abstracting Kubernetes client operations for the NATS controller
///
/// This trait allows mocking the Kubernetes client in tests while using
/// the real client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Get a NATS resource; `None` if it does not exist
    async fn get_nats(&self, name: &str, namespace: &str) -> Result<Option<Nats>, Error>;

    /// Add a finalizer to a NATS resource
    async fn add_finalizer(&self, name: &str, namespace: &str, finalizer: &str)
        -> Result<(), Error>;

    /// Remove a finalizer from a NATS resource
    async fn remove_finalizer(
        &self,
        name: &str,
        namespace: &str,
        finalizer: &str,
    ) -> Result<(), Error>;

    /// Write the status of `nats`
    ///
    /// The write carries the object's resourceVersion, so a concurrent change
    /// surfaces as a conflict.
    async fn replace_status(&self, nats: &Nats) -> Result<(), Error>;

    /// Server-side apply an object, forcing field ownership
    async fn apply(&self, obj: &DynamicObject) -> Result<(), Error>;

    /// Delete an object; a missing object counts as deleted
    async fn delete(&self, obj: &DynamicObject) -> Result<(), Error>;

    /// Get a StatefulSet; `None` if it does not exist
    async fn get_statefulset(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<StatefulSet>, Error>;

    /// Get a Secret; `None` if it does not exist
    async fn get_secret(&self, name: &str, namespace: &str) -> Result<Option<Secret>, Error>;

    /// Check whether a CustomResourceDefinition is installed
    async fn crd_exists(&self, name: &str) -> Result<bool, Error>;

    /// Delete every PersistentVolumeClaim matching `selector`
    async fn delete_pvcs_with_label(&self, namespace: &str, selector: &str) -> Result<(), Error>;

    /// Names of the nodes that pods matching `selector` are scheduled on
    ///
    /// Pods that are not scheduled yet are skipped.
    async fn list_pod_node_names(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<String>, Error>;

    /// Availability zone of a node
    ///
    /// Fails with [`Error::ZoneLabelMissing`] when the node has no zone label.
    async fn get_node_zone(&self, node: &str) -> Result<String, Error>;
}

/// Node zone lookups, kept for [`NODE_ZONE_TTL`]
///
/// Entries are not refreshed on read, so a relabelled node is picked up once
/// its entry expires.
pub struct ZoneCache {
    ttl: Duration,
    entries: DashMap<String, (String, Instant)>,
}

impl ZoneCache {
    /// Create an empty cache with the given time to live
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    /// Cached zone of `node`, if present and not expired at `now`
    pub fn get(&self, node: &str, now: Instant) -> Option<String> {
        let expired = match self.entries.get(node) {
            Some(entry) => {
                let (zone, stored_at) = entry.value();
                if now.duration_since(*stored_at) < self.ttl {
                    return Some(zone.clone());
                }
                true
            }
            None => false,
        };
        if expired {
            self.entries.remove(node);
        }
        None
    }

    /// Remember the zone of `node` as of `now`
    pub fn insert(&self, node: &str, zone: &str, now: Instant) {
        self.entries
            .insert(node.to_string(), (zone.to_string(), now));
    }
}

impl Default for ZoneCache {
    fn default() -> Self {
        Self::new(NODE_ZONE_TTL)
    }
}

/// Real Kubernetes client implementation
pub struct KubeClientImpl {
    client: Client,
    zones: ZoneCache,
}

impl KubeClientImpl {
    /// Create a new KubeClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self {
            client,
            zones: ZoneCache::default(),
        }
    }

    fn dynamic_api(&self, obj: &DynamicObject) -> Result<Api<DynamicObject>, Error> {
        let ar = api_resource_for(obj)?;
        Ok(match obj.metadata.namespace.as_deref() {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        })
    }

    async fn patch_finalizers(
        &self,
        name: &str,
        namespace: &str,
        finalizers: Vec<String>,
    ) -> Result<(), Error> {
        let api: Api<Nats> = Api::namespaced(self.client.clone(), namespace);
        let patch = serde_json::json!({
            "metadata": {
                "finalizers": finalizers
            }
        });
        api.patch(
            name,
            &PatchParams::apply(CONTROLLER_NAME),
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }
}

fn object_name(obj: &DynamicObject, op: &str) -> Result<String, Error> {
    obj.metadata.name.clone().ok_or_else(|| {
        Error::internal_with_context(op, format!("object {} has no name", display_name(obj)))
    })
}

#[async_trait]
impl KubeClient for KubeClientImpl {
    async fn get_nats(&self, name: &str, namespace: &str) -> Result<Option<Nats>, Error> {
        let api: Api<Nats> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn add_finalizer(
        &self,
        name: &str,
        namespace: &str,
        finalizer: &str,
    ) -> Result<(), Error> {
        let api: Api<Nats> = Api::namespaced(self.client.clone(), namespace);

        let nats = api.get(name).await?;
        let mut finalizers = nats.metadata.finalizers.unwrap_or_default();
        if finalizers.iter().any(|f| f == finalizer) {
            return Ok(());
        }
        finalizers.push(finalizer.to_string());

        self.patch_finalizers(name, namespace, finalizers).await
    }

    async fn remove_finalizer(
        &self,
        name: &str,
        namespace: &str,
        finalizer: &str,
    ) -> Result<(), Error> {
        let api: Api<Nats> = Api::namespaced(self.client.clone(), namespace);

        let nats = match api.get_opt(name).await? {
            Some(nats) => nats,
            None => return Ok(()),
        };
        let finalizers: Vec<String> = nats
            .finalizers()
            .iter()
            .filter(|f| *f != finalizer)
            .cloned()
            .collect();

        self.patch_finalizers(name, namespace, finalizers).await
    }

    async fn replace_status(&self, nats: &Nats) -> Result<(), Error> {
        let namespace = nats.namespace().unwrap_or_default();
        let api: Api<Nats> = Api::namespaced(self.client.clone(), &namespace);

        let mut status = serde_json::to_value(&nats.status)
            .map_err(|e| Error::serialization_for_kind("NATS", e.to_string()))?;
        // A merge patch only drops a withdrawn URL when it is sent as null
        if let Some(fields) = status.as_object_mut() {
            fields
                .entry("url")
                .or_insert(serde_json::Value::Null);
        }

        let patch = serde_json::json!({
            "metadata": {
                "resourceVersion": nats.resource_version(),
            },
            "status": status,
        });

        api.patch_status(
            &nats.name_any(),
            &PatchParams::apply(CONTROLLER_NAME),
            &Patch::Merge(&patch),
        )
        .await?;

        Ok(())
    }

    async fn apply(&self, obj: &DynamicObject) -> Result<(), Error> {
        let name = object_name(obj, "apply")?;
        let api = self.dynamic_api(obj)?;

        api.patch(
            &name,
            &PatchParams::apply(CONTROLLER_NAME).force(),
            &Patch::Apply(obj),
        )
        .await?;

        debug!(object = %display_name(obj), "applied object");
        Ok(())
    }

    async fn delete(&self, obj: &DynamicObject) -> Result<(), Error> {
        let name = object_name(obj, "delete")?;
        let api = self.dynamic_api(obj)?;

        match api
            .delete(&name, &DeleteParams::default())
            .await
            .map_err(Error::from)
        {
            Ok(_) => {
                debug!(object = %display_name(obj), "deleted object");
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn get_statefulset(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<StatefulSet>, Error> {
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_secret(&self, name: &str, namespace: &str) -> Result<Option<Secret>, Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn crd_exists(&self, name: &str) -> Result<bool, Error> {
        crd_exists(&self.client, name).await
    }

    async fn delete_pvcs_with_label(&self, namespace: &str, selector: &str) -> Result<(), Error> {
        let api: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), namespace);
        let pvcs = api.list(&ListParams::default().labels(selector)).await?;

        for pvc in pvcs.items {
            let name = pvc.name_any();
            match api
                .delete(&name, &DeleteParams::default())
                .await
                .map_err(Error::from)
            {
                Ok(_) => info!(pvc = %name, namespace, "deleted persistent volume claim"),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    async fn list_pod_node_names(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<String>, Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pods = api.list(&ListParams::default().labels(selector)).await?;

        Ok(pods
            .items
            .into_iter()
            .filter_map(|pod| pod.spec.and_then(|spec| spec.node_name))
            .filter(|node| !node.is_empty())
            .collect())
    }

    async fn get_node_zone(&self, node: &str) -> Result<String, Error> {
        if let Some(zone) = self.zones.get(node, Instant::now()) {
            return Ok(zone);
        }

        let api: Api<Node> = Api::all(self.client.clone());
        let live = api.get(node).await?;
        let zone = live
            .labels()
            .get(ZONE_LABEL_KEY)
            .filter(|z| !z.is_empty())
            .cloned()
            .ok_or_else(|| Error::zone_label_missing(node))?;

        self.zones.insert(node, &zone, Instant::now());
        Ok(zone)
    }
}

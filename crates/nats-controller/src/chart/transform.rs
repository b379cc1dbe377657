//! Ordered transformation steps over rendered objects
//!
//! Every rendered item passes through the same list of steps before it is
//! applied. Steps are pure: they take an object and return the changed one.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::DynamicObject;
use kube::{Resource, ResourceExt};

use nats_common::crd::Nats;
use nats_common::labels::{MANAGED_BY_LABEL_KEY, MANAGED_BY_LABEL_VALUE};
use nats_common::Error;

use super::manifest::ManifestSet;

/// A named transformation of a rendered object
#[derive(Clone, Debug, PartialEq)]
pub enum ManifestTransform {
    /// Make the NATS resource the controlling owner
    OwnerReference(OwnerReference),
    /// Set a label, replacing any existing value
    Label {
        /// Label key
        key: String,
        /// Label value
        value: String,
    },
}

impl ManifestTransform {
    /// Name of the step, for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::OwnerReference(_) => "OwnerReference",
            Self::Label { .. } => "Label",
        }
    }

    /// Apply this step to one object
    pub fn apply(&self, mut obj: DynamicObject) -> DynamicObject {
        match self {
            Self::OwnerReference(owner) => {
                let refs = obj.metadata.owner_references.get_or_insert_with(Vec::new);
                refs.retain(|r| r.uid != owner.uid);
                refs.push(owner.clone());
            }
            Self::Label { key, value } => {
                obj.labels_mut().insert(key.clone(), value.clone());
            }
        }
        obj
    }
}

/// The steps run on every object rendered for `nats`: owner reference, then managed-by label
pub fn default_transforms(nats: &Nats) -> Result<Vec<ManifestTransform>, Error> {
    let mut owner = nats.controller_owner_ref(&()).ok_or_else(|| {
        Error::internal_with_context(
            "transform",
            format!("NATS {} has no uid yet", nats.name_any()),
        )
    })?;
    owner.controller = Some(true);
    owner.block_owner_deletion = Some(true);

    Ok(vec![
        ManifestTransform::OwnerReference(owner),
        ManifestTransform::Label {
            key: MANAGED_BY_LABEL_KEY.to_string(),
            value: MANAGED_BY_LABEL_VALUE.to_string(),
        },
    ])
}

/// Run `steps` in order over every item; blobs pass through untouched
pub fn apply_transforms(set: ManifestSet, steps: &[ManifestTransform]) -> ManifestSet {
    ManifestSet {
        items: set
            .items
            .into_iter()
            .map(|obj| steps.iter().fold(obj, |obj, step| step.apply(obj)))
            .collect(),
        blobs: set.blobs,
    }
}

//! Chart rendering for NATS releases
//!
//! Overrides are merged into the chart defaults, the templates are rendered
//! into a manifest set, and the transformation steps stamp ownership and
//! labels onto every object.

mod filters;
pub mod manifest;
pub mod release;
pub mod renderer;
pub mod transform;

pub use manifest::{parse_manifests, ManifestSet};
pub use release::{deep_merge, nest_dot_path, ReleaseInstance};
pub use renderer::{ChartRenderer, ManifestRenderer};
pub use transform::{apply_transforms, default_transforms, ManifestTransform};

#[cfg(test)]
pub use renderer::MockManifestRenderer;

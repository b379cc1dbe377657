//! Reconciliation engine for the NATS custom resource
//!
//! A reconcile pass renders the bundled chart for a NATS resource, applies
//! the result with server-side apply, waits for the StatefulSet to converge,
//! checks how the pods are spread over availability zones and reports all of
//! it on the resource's status. Deletion is gated by a finalizer so the
//! rendered objects and volumes are cleaned up first.

#![deny(missing_docs)]

pub mod cache;
pub mod chart;
pub mod client;
pub mod controller;
pub mod overrides;
pub mod readiness;
pub mod url;
pub mod watch;

pub use controller::{error_policy, reconcile, AllowedIdentity, Context, ContextBuilder};

//! Error types for the NATS manager
//!
//! Errors are structured with fields to aid debugging in production. Each
//! variant carries the context it happened in (the resource, template, node
//! or operation) next to the underlying cause.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for NATS manager operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Validation error for a NATS spec
    #[error("validation error for {resource}: {message}")]
    Validation {
        /// Name of the NATS resource with invalid configuration
        resource: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.cluster.size")
        field: Option<String>,
    },

    /// Chart loading or rendering error
    #[error("template error [{template}]: {message}")]
    Template {
        /// Description of what failed
        message: String,
        /// Template file or value path involved
        template: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// A node backing a NATS pod carries no zone label
    #[error("zone label is missing on node {node}")]
    ZoneLabelMissing {
        /// Name of the node without a zone label
        node: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "apply", "readiness", "watch")
        context: String,
    },
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            resource: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with resource context and field path
    pub fn validation_for_field(
        resource: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            resource: resource.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a template error for a named template
    pub fn template(template: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Template {
            message: msg.into(),
            template: template.into(),
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create a zone-label-missing error for a node
    pub fn zone_label_missing(node: impl Into<String>) -> Self {
        Self::ZoneLabelMissing { node: node.into() }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Validation, template and serialization errors need a spec or chart fix.
    /// Kubernetes errors are retried unless the API answered with a 4xx.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code)
            ),
            Error::Validation { .. } => false,
            Error::Template { .. } => false,
            Error::Serialization { .. } => false,
            Error::ZoneLabelMissing { .. } => true,
            Error::Internal { .. } => true,
        }
    }

    /// Whether the Kubernetes API reported the object as missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Kube { source: kube::Error::Api(ae) } if ae.code == 404)
    }

    /// Whether a node behind a NATS pod lacks its zone label
    pub fn is_zone_label_missing(&self) -> bool {
        matches!(self, Error::ZoneLabelMissing { .. })
    }

    /// Get the context if this error has one
    pub fn context(&self) -> Option<&str> {
        match self {
            Error::Internal { context, .. } => Some(context),
            Error::Template { template, .. } => Some(template),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16) -> Error {
        Error::from(kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "boom".to_string(),
            reason: "Test".to_string(),
            code,
        }))
    }

    // ==========================================================================
    // Story Tests: How failures surface during a reconcile pass
    // ==========================================================================

    /// Story: an even cluster size is rejected and never retried
    ///
    /// The user must edit the resource; requeueing would only repeat the failure.
    #[test]
    fn story_validation_errors_wait_for_user_edit() {
        let err = Error::validation_for_field(
            "eventing-nats",
            "spec.cluster.size",
            "size only accepts odd numbers",
        );
        assert!(err.to_string().contains("eventing-nats"));
        assert!(err.to_string().contains("odd numbers"));
        assert!(!err.is_retryable());

        match err {
            Error::Validation { field, .. } => {
                assert_eq!(field.as_deref(), Some("spec.cluster.size"))
            }
            _ => panic!("Expected Validation variant"),
        }
    }

    /// Story: a broken chart is a configuration bug, not a transient failure
    #[test]
    fn story_template_errors_are_not_retryable() {
        let err = Error::template("statefulset.yaml", "unexpected end of input");
        assert!(err.to_string().contains("statefulset.yaml"));
        assert_eq!(err.context(), Some("statefulset.yaml"));
        assert!(!err.is_retryable());
    }

    /// Story: API server hiccups are retried, client errors are not
    #[test]
    fn story_kube_errors_retry_only_on_server_side_failures() {
        assert!(api_error(500).is_retryable());
        assert!(api_error(503).is_retryable());
        assert!(!api_error(409).is_retryable());
        assert!(!api_error(404).is_retryable());
    }

    /// Story: NotFound is recognised so deletes and optional reads can swallow it
    #[test]
    fn story_not_found_is_detected() {
        assert!(api_error(404).is_not_found());
        assert!(!api_error(500).is_not_found());
        assert!(!Error::internal("nope").is_not_found());
    }

    /// Story: missing zone labels are singled out as non-fatal for zone checks
    #[test]
    fn story_zone_label_missing_is_distinguished() {
        let err = Error::zone_label_missing("worker-1");
        assert!(err.is_zone_label_missing());
        assert!(err.to_string().contains("worker-1"));
        assert!(!Error::internal_with_context("zones", "x").is_zone_label_missing());
    }

    #[test]
    fn internal_errors_carry_context() {
        let err = Error::internal_with_context("apply", "conflict on StatefulSet/nats");
        assert_eq!(err.context(), Some("apply"));
        assert!(err.to_string().contains("[apply]"));
        assert_eq!(Error::internal("x").context(), Some(UNKNOWN_CONTEXT));
    }

    #[test]
    fn serialization_errors_record_kind() {
        match Error::serialization_for_kind("Secret", "invalid base64") {
            Error::Serialization { kind, .. } => assert_eq!(kind.as_deref(), Some("Secret")),
            _ => panic!("Expected Serialization variant"),
        }
        assert!(!Error::serialization_for_kind("NATS", "bad").is_retryable());
    }
}

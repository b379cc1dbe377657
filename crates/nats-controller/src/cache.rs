//! Watch scoping for the kinds the operator manages
//!
//! Only objects carrying `app.kubernetes.io/managed-by=nats-manager` are
//! watched. Secrets, Services and ConfigMaps are always read straight from
//! the API server and never from a cache.
//!
//! Nothing here builds a reflector store. The watchers configured by
//! [`CacheScope`] only feed reconcile triggers, and every read made by
//! `KubeClientImpl` is a direct API call. `DIRECT_READ_KINDS` lists the
//! kinds that must keep that property if a cached reader is ever added.

use kube::runtime::watcher;

use nats_common::labels::managed_by_selector;

/// Kinds whose watches are limited to managed objects
pub const SCOPED_KINDS: &[&str] = &[
    "StatefulSet",
    "Deployment",
    "ServiceAccount",
    "Secret",
    "Service",
    "ConfigMap",
    "ClusterRole",
    "ClusterRoleBinding",
    "HorizontalPodAutoscaler",
    "PodDisruptionBudget",
    "Pod",
];

/// Kinds that bypass any cache on read
pub const DIRECT_READ_KINDS: &[&str] = &["Secret", "Service", "ConfigMap"];

/// Watch scope of one kind
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KindScope {
    /// Kubernetes kind
    pub kind: &'static str,
    /// Label selector applied to list and watch calls
    pub label_selector: String,
    /// Whether reads of this kind bypass any cache
    pub direct_read: bool,
}

/// Per-kind watch scope of the operator
#[derive(Clone, Debug)]
pub struct CacheScope {
    kinds: Vec<KindScope>,
}

impl CacheScope {
    /// Scope every managed kind to objects managed by this operator
    pub fn managed_by_nats() -> Self {
        let selector = managed_by_selector();
        Self {
            kinds: SCOPED_KINDS
                .iter()
                .map(|kind| KindScope {
                    kind,
                    label_selector: selector.clone(),
                    direct_read: DIRECT_READ_KINDS.contains(kind),
                })
                .collect(),
        }
    }

    /// All scoped kinds
    pub fn kinds(&self) -> &[KindScope] {
        &self.kinds
    }

    /// Scope of one kind, if it is scoped
    pub fn get(&self, kind: &str) -> Option<&KindScope> {
        self.kinds.iter().find(|k| k.kind == kind)
    }

    /// Whether reads of `kind` bypass any cache
    pub fn is_direct_read(&self, kind: &str) -> bool {
        self.get(kind).is_some_and(|k| k.direct_read)
    }

    /// Watcher configuration for `kind`
    ///
    /// Unscoped kinds get an unfiltered configuration.
    pub fn watcher_config(&self, kind: &str, timeout_secs: u32) -> watcher::Config {
        let config = watcher::Config::default().timeout(timeout_secs);
        match self.get(kind) {
            Some(scope) => config.labels(&scope.label_selector),
            None => config,
        }
    }
}

impl Default for CacheScope {
    fn default() -> Self {
        Self::managed_by_nats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn every_kind_carries_the_managed_by_selector() {
        let scope = CacheScope::managed_by_nats();
        assert_eq!(scope.kinds().len(), SCOPED_KINDS.len());
        for kind in scope.kinds() {
            assert_eq!(
                kind.label_selector,
                "app.kubernetes.io/managed-by=nats-manager"
            );
        }
    }

    #[rstest]
    #[case::secret("Secret", true)]
    #[case::service("Service", true)]
    #[case::configmap("ConfigMap", true)]
    #[case::statefulset("StatefulSet", false)]
    #[case::pdb("PodDisruptionBudget", false)]
    #[case::unscoped("Namespace", false)]
    fn direct_read_kinds(#[case] kind: &str, #[case] direct: bool) {
        assert_eq!(CacheScope::default().is_direct_read(kind), direct);
    }

    #[test]
    fn direct_read_kinds_are_all_scoped() {
        let scope = CacheScope::default();
        for kind in DIRECT_READ_KINDS {
            assert!(scope.get(kind).is_some(), "{kind} should be scoped");
            assert!(scope.is_direct_read(kind));
        }
    }

    #[test]
    fn watcher_config_filters_scoped_kinds() {
        let scope = CacheScope::default();
        let config = scope.watcher_config("StatefulSet", 25);
        assert_eq!(
            config.label_selector.as_deref(),
            Some("app.kubernetes.io/managed-by=nats-manager")
        );
        assert_eq!(config.timeout, Some(25));
        assert!(scope
            .watcher_config("Namespace", 25)
            .label_selector
            .is_none());
    }
}

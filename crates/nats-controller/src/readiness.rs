//! Readiness of the NATS StatefulSet and availability-zone spread

use std::collections::BTreeSet;

use k8s_openapi::api::apps::v1::StatefulSet;
use tracing::debug;

use nats_common::crd::ZoneSpread;
use nats_common::labels::pod_selector;
use nats_common::{Error, MIN_CLUSTER_SIZE, RECOMMENDED_ZONE_COUNT};

use crate::chart::ReleaseInstance;
use crate::client::KubeClient;

/// Whether a StatefulSet's current, ready and updated replicas all match its desired count
pub fn replicas_converged(sts: &StatefulSet) -> bool {
    let desired = sts.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
    let Some(status) = sts.status.as_ref() else {
        return false;
    };
    status.current_replicas.unwrap_or(0) == desired
        && status.ready_replicas.unwrap_or(0) == desired
        && status.updated_replicas.unwrap_or(0) == desired
}

/// Whether every StatefulSet rendered for `release` has converged
///
/// A StatefulSet that does not exist yet is not ready. A release that
/// renders no StatefulSet at all is an error.
pub async fn is_statefulset_ready(
    client: &dyn KubeClient,
    release: &ReleaseInstance,
) -> Result<bool, Error> {
    let rendered: Vec<_> = release.rendered().statefulsets().collect();
    if rendered.is_empty() {
        return Err(Error::internal_with_context(
            "readiness",
            "NATS StatefulSet not found in rendered manifests",
        ));
    }

    for sts in rendered {
        let name = sts.metadata.name.as_deref().unwrap_or(&release.name);
        let namespace = sts
            .metadata
            .namespace
            .as_deref()
            .unwrap_or(&release.namespace);

        match client.get_statefulset(name, namespace).await? {
            Some(live) if replicas_converged(&live) => {}
            Some(_) => {
                debug!(statefulset = %name, "StatefulSet has not converged");
                return Ok(false);
            }
            None => {
                debug!(statefulset = %name, "StatefulSet does not exist yet");
                return Ok(false);
            }
        }
    }

    Ok(true)
}

/// Verdict for a cluster of `cluster_size` replicas spread over `zones` zones
pub fn evaluate_zone_spread(cluster_size: i32, zones: usize) -> ZoneSpread {
    if cluster_size < MIN_CLUSTER_SIZE {
        ZoneSpread::NotApplicable
    } else if zones >= RECOMMENDED_ZONE_COUNT {
        ZoneSpread::Spread { zones }
    } else {
        ZoneSpread::Insufficient { zones }
    }
}

/// Number of distinct zones hosting the NATS pods of `name`
pub async fn zones_used(client: &dyn KubeClient, name: &str, namespace: &str) -> Result<usize, Error> {
    let nodes = client
        .list_pod_node_names(namespace, &pod_selector(name))
        .await?;

    let mut zones = BTreeSet::new();
    for node in nodes {
        zones.insert(client.get_node_zone(&node).await?);
    }
    Ok(zones.len())
}

/// Check the zone spread of a NATS cluster
///
/// Clusters below the minimum size are not looked up at all.
pub async fn check_zone_spread(
    client: &dyn KubeClient,
    name: &str,
    namespace: &str,
    cluster_size: i32,
) -> Result<ZoneSpread, Error> {
    if cluster_size < MIN_CLUSTER_SIZE {
        return Ok(ZoneSpread::NotApplicable);
    }
    let zones = zones_used(client, name, namespace).await?;
    Ok(evaluate_zone_spread(cluster_size, zones))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::{parse_manifests, ReleaseInstance};
    use crate::client::MockKubeClient;
    use k8s_openapi::api::apps::v1::{StatefulSetSpec, StatefulSetStatus};
    use rstest::rstest;
    use std::collections::BTreeMap;

    fn sts(desired: i32, current: i32, ready: i32, updated: i32) -> StatefulSet {
        StatefulSet {
            spec: Some(StatefulSetSpec {
                replicas: Some(desired),
                ..Default::default()
            }),
            status: Some(StatefulSetStatus {
                replicas: current,
                current_replicas: Some(current),
                ready_replicas: Some(ready),
                updated_replicas: Some(updated),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn rendered_release(manifests: &str) -> ReleaseInstance {
        let mut release =
            ReleaseInstance::new("eventing-nats", "kyma-system", false, BTreeMap::new());
        release.set_rendered(parse_manifests(manifests).expect("manifests should parse"));
        release
    }

    const STS_MANIFEST: &str = "apiVersion: apps/v1\nkind: StatefulSet\nmetadata:\n  name: eventing-nats\n  namespace: kyma-system\n";

    #[rstest]
    #[case::converged(sts(3, 3, 3, 3), true)]
    #[case::current_behind(sts(3, 1, 3, 3), false)]
    #[case::ready_behind(sts(3, 3, 1, 3), false)]
    #[case::updated_behind(sts(3, 3, 3, 1), false)]
    fn convergence_needs_all_counts(#[case] sts: StatefulSet, #[case] ready: bool) {
        assert_eq!(replicas_converged(&sts), ready);
    }

    #[test]
    fn desired_replicas_default_to_one() {
        let mut s = sts(1, 1, 1, 1);
        s.spec = Some(StatefulSetSpec::default());
        assert!(replicas_converged(&s));
        s.status = None;
        assert!(!replicas_converged(&s));
    }

    #[rstest]
    #[case::single_node(1, 1, ZoneSpread::NotApplicable)]
    #[case::three_zones(3, 3, ZoneSpread::Spread { zones: 3 })]
    #[case::more_zones_than_needed(5, 4, ZoneSpread::Spread { zones: 4 })]
    #[case::two_zones(3, 2, ZoneSpread::Insufficient { zones: 2 })]
    fn zone_verdicts(#[case] size: i32, #[case] zones: usize, #[case] expected: ZoneSpread) {
        assert_eq!(evaluate_zone_spread(size, zones), expected);
    }

    #[tokio::test]
    async fn live_statefulset_decides_readiness() {
        let mut mock = MockKubeClient::new();
        mock.expect_get_statefulset()
            .returning(|_, _| Ok(Some(sts(3, 3, 3, 3))));

        let release = rendered_release(STS_MANIFEST);
        assert!(is_statefulset_ready(&mock, &release)
            .await
            .expect("readiness should be determined"));
    }

    #[tokio::test]
    async fn missing_statefulset_is_not_ready() {
        let mut mock = MockKubeClient::new();
        mock.expect_get_statefulset().returning(|_, _| Ok(None));

        let release = rendered_release(STS_MANIFEST);
        assert!(!is_statefulset_ready(&mock, &release)
            .await
            .expect("readiness should be determined"));
    }

    #[tokio::test]
    async fn release_without_statefulset_is_an_error() {
        let mock = MockKubeClient::new();
        let release =
            rendered_release("apiVersion: v1\nkind: Service\nmetadata:\n  name: eventing-nats-svc\n");
        assert!(is_statefulset_ready(&mock, &release).await.is_err());
    }

    #[tokio::test]
    async fn zones_are_counted_once_per_zone() {
        let mut mock = MockKubeClient::new();
        mock.expect_list_pod_node_names()
            .returning(|_, _| Ok(vec!["n1".into(), "n2".into(), "n3".into()]));
        mock.expect_get_node_zone().returning(|node| {
            Ok(match node {
                "n1" => "A".to_string(),
                _ => "B".to_string(),
            })
        });

        let spread = check_zone_spread(&mock, "eventing-nats", "kyma-system", 3)
            .await
            .expect("zones should be looked up");
        assert_eq!(spread, ZoneSpread::Insufficient { zones: 2 });
    }

    #[tokio::test]
    async fn small_clusters_skip_zone_lookups() {
        let mock = MockKubeClient::new();
        let spread = check_zone_spread(&mock, "eventing-nats", "kyma-system", 1)
            .await
            .expect("no lookup needed");
        assert_eq!(spread, ZoneSpread::NotApplicable);
    }

    #[tokio::test]
    async fn missing_zone_label_propagates() {
        let mut mock = MockKubeClient::new();
        mock.expect_list_pod_node_names()
            .returning(|_, _| Ok(vec!["n1".into()]));
        mock.expect_get_node_zone()
            .returning(|node| Err(Error::zone_label_missing(node)));

        let err = check_zone_spread(&mock, "eventing-nats", "kyma-system", 3)
            .await
            .expect_err("missing label should fail");
        assert!(err.is_zone_label_missing());
    }
}

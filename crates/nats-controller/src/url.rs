//! Client URL of a NATS service

use nats_common::NATS_CLIENT_PORT;

/// In-cluster client URL of the NATS service for a resource
pub fn format_url(name: &str, namespace: &str) -> String {
    format!(
        "nats://{}.{}.svc.cluster.local:{}",
        name, namespace, NATS_CLIENT_PORT
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_points_at_the_client_port() {
        assert_eq!(
            format_url("eventing-nats", "kyma-system"),
            "nats://eventing-nats.kyma-system.svc.cluster.local:4222"
        );
    }
}

//! Controller runner - builds the NATS controller future
//!
//! The controller watches NATS resources plus the namespaced kinds rendered
//! from the chart. DestinationRules are watched separately once Istio shows
//! up; their owners reach the controller through a channel.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};
use tokio::sync::mpsc;

use nats_common::crd::Nats;
use nats_controller::cache::CacheScope;
use nats_controller::chart::ChartRenderer;
use nats_controller::watch::DestinationRuleWatch;
use nats_controller::{error_policy, reconcile, Context};

use crate::config::OperatorConfig;

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Capacity of the channel carrying DestinationRule owners
const COMPANION_TRIGGER_CAPACITY: usize = 32;

/// Build the NATS controller futures
pub fn build_nats_controllers(
    client: Client,
    config: &OperatorConfig,
) -> anyhow::Result<Vec<Pin<Box<dyn Future<Output = ()> + Send>>>> {
    let renderer = ChartRenderer::load(&config.chart_dir)
        .map_err(|e| anyhow::anyhow!("Failed to load chart {:?}: {}", config.chart_dir, e))?;

    let (trigger_tx, trigger_rx) = mpsc::channel::<ObjectRef<Nats>>(COMPANION_TRIGGER_CAPACITY);

    let ctx = Arc::new(
        Context::builder(client.clone())
            .renderer(Arc::new(renderer))
            .companion_watch(Arc::new(DestinationRuleWatch::new(
                client.clone(),
                trigger_tx,
            )))
            .allowed_identity(config.allowed_identity())
            .images(config.image_config())
            .build()?,
    );

    let scope = CacheScope::managed_by_nats();
    let watch_config = |kind: &str| scope.watcher_config(kind, WATCH_TIMEOUT_SECS);

    let companion_triggers = futures::stream::unfold(trigger_rx, |mut rx| async move {
        rx.recv().await.map(|owner| (owner, rx))
    });

    tracing::info!("- NATS controller");

    let nats: Api<Nats> = Api::all(client.clone());
    let controller = Controller::new(nats, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS))
        .owns(
            Api::<StatefulSet>::all(client.clone()),
            watch_config("StatefulSet"),
        )
        .owns(Api::<Service>::all(client.clone()), watch_config("Service"))
        .owns(
            Api::<ConfigMap>::all(client.clone()),
            watch_config("ConfigMap"),
        )
        .owns(Api::<Secret>::all(client.clone()), watch_config("Secret"))
        .owns(
            Api::<PodDisruptionBudget>::all(client),
            watch_config("PodDisruptionBudget"),
        )
        .reconcile_on(companion_triggers)
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(log_reconcile_result("NATS"));

    Ok(vec![Box::pin(controller)])
}

/// Create a closure that logs reconciliation results for a named controller
fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}

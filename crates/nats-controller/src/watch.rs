//! Companion watch on Istio DestinationRules
//!
//! The DestinationRule CRD may be installed after the operator starts, so its
//! watch cannot be set up with the controller. Once a pass sees Istio, the
//! controller starts this watch; changes to a managed DestinationRule trigger
//! a reconcile of the owning NATS resource.

use futures::TryStreamExt;
use kube::api::{Api, DynamicObject};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use kube::Client;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[cfg(test)]
use mockall::automock;

use nats_common::crd::Nats;
use nats_common::kube_utils::build_api_resource;
use nats_common::labels::managed_by_selector;
use nats_common::{Error, DESTINATION_RULE_API_VERSION, DESTINATION_RULE_KIND};

/// Starts the companion watch
#[cfg_attr(test, automock)]
pub trait CompanionWatch: Send + Sync {
    /// Start watching in the background
    fn start(&self) -> Result<(), Error>;
}

/// Watches managed DestinationRules and forwards their owners
pub struct DestinationRuleWatch {
    client: Client,
    trigger: mpsc::Sender<ObjectRef<Nats>>,
}

impl DestinationRuleWatch {
    /// Create a watch that sends owner references to `trigger`
    pub fn new(client: Client, trigger: mpsc::Sender<ObjectRef<Nats>>) -> Self {
        Self { client, trigger }
    }
}

impl CompanionWatch for DestinationRuleWatch {
    fn start(&self) -> Result<(), Error> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::internal_with_context("watch", e.to_string()))?;

        let ar = build_api_resource(DESTINATION_RULE_API_VERSION, DESTINATION_RULE_KIND);
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &ar);
        let config = watcher::Config::default().labels(&managed_by_selector());
        let trigger = self.trigger.clone();

        runtime.spawn(async move {
            info!("DestinationRule watch started");
            let mut stream = Box::pin(watcher::watcher(api, config).default_backoff());

            loop {
                match stream.try_next().await {
                    Ok(Some(Event::Apply(obj))) | Ok(Some(Event::Delete(obj))) => {
                        let Some(owner) = owning_nats(&obj) else {
                            continue;
                        };
                        debug!(owner = %owner, "DestinationRule changed");
                        if trigger.send(owner).await.is_err() {
                            debug!("trigger channel closed, stopping DestinationRule watch");
                            break;
                        }
                    }
                    Ok(Some(Event::Init | Event::InitApply(_) | Event::InitDone)) => {}
                    Ok(None) => break,
                    Err(e) => warn!(error = %e, "DestinationRule watch error"),
                }
            }

            info!("DestinationRule watch stopped");
        });

        Ok(())
    }
}

/// The NATS resource controlling `obj`, if any
pub fn owning_nats(obj: &DynamicObject) -> Option<ObjectRef<Nats>> {
    let namespace = obj.metadata.namespace.as_deref()?;
    obj.metadata
        .owner_references
        .as_ref()?
        .iter()
        .find(|r| r.kind == "NATS" && r.controller == Some(true))
        .map(|r| ObjectRef::new(&r.name).within(namespace))
}

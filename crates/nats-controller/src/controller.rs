//! NATS controller implementation
//!
//! This module implements the reconciliation logic for NATS resources. Each
//! pass re-reads the resource, classifies its lifecycle phase and either
//! provisions the rendered chart or cleans it up. Status is written once per
//! pass, and only when it changed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::Secret;
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use nats_common::crd::{Nats, NatsStatus, ZoneSpread};
use nats_common::events::{actions, reasons, EventPublisher, KubeEventPublisher};
use nats_common::labels::instance_selector;
use nats_common::{metrics, Error, CONTROLLER_NAME, DESTINATION_RULE_CRD_NAME, NATS_FINALIZER};

use crate::chart::{apply_transforms, default_transforms, ManifestRenderer, ReleaseInstance};
use crate::client::{KubeClient, KubeClientImpl};
use crate::overrides::{generate_overrides, ContainerImages};
use crate::readiness::{check_zone_spread, is_statefulset_ready};
use crate::url::format_url;
use crate::watch::CompanionWatch;

/// Requeue delay while the StatefulSet converges
pub const STATUS_CHECK_REQUEUE: Duration = Duration::from_secs(10);

/// Requeue delay after adding the finalizer
pub const FINALIZER_REQUEUE: Duration = Duration::from_secs(1);

/// Requeue delay after a retryable error
pub const RETRYABLE_ERROR_REQUEUE: Duration = Duration::from_secs(5);

/// Requeue delay after an error that needs a spec or chart fix
pub const PERMANENT_ERROR_REQUEUE: Duration = Duration::from_secs(60);

/// Key of the password in the credentials Secret
pub const PASSWORD_SECRET_KEY: &str = "password";

/// The one NATS resource allowed in the cluster
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllowedIdentity {
    /// Allowed name
    pub name: String,
    /// Allowed namespace
    pub namespace: String,
}

impl AllowedIdentity {
    /// Create an identity from name and namespace
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Whether `name`/`namespace` is the allowed resource
    pub fn permits(&self, name: &str, namespace: &str) -> bool {
        self.name == name && self.namespace == namespace
    }

    /// Status message for a resource that is not allowed
    pub fn forbidden_message(&self) -> String {
        format!(
            "Only a single NATS CR with name: {} and namespace: {} is allowed to be created in a Kyma cluster.",
            self.name, self.namespace
        )
    }
}

impl Default for AllowedIdentity {
    fn default() -> Self {
        Self::new("eventing-nats", "kyma-system")
    }
}

/// Where a NATS resource is in its lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecyclePhase {
    /// Live resource; provision it
    Active,
    /// Deletion requested but our finalizer is gone; nothing left to do
    PendingDeletion,
    /// Deletion requested and our finalizer is present; clean up
    Cleaning,
    /// The resource no longer exists
    Gone,
}

impl LifecyclePhase {
    /// Classify a fetched resource
    pub fn of(nats: Option<&Nats>) -> Self {
        match nats {
            None => Self::Gone,
            Some(n) if !n.is_in_deletion() => Self::Active,
            Some(n) if n.has_finalizer() => Self::Cleaning,
            Some(_) => Self::PendingDeletion,
        }
    }
}

/// Controller context shared by all reconcile passes
pub struct Context {
    /// Kubernetes client for API operations (trait object for testability)
    pub kube: Arc<dyn KubeClient>,
    /// Renders the chart for a release
    pub renderer: Arc<dyn ManifestRenderer>,
    /// Publishes Kubernetes Events
    pub events: Arc<dyn EventPublisher>,
    /// Watch started once Istio is detected
    pub companion_watch: Arc<dyn CompanionWatch>,
    /// The one NATS resource allowed in the cluster
    pub allowed: AllowedIdentity,
    /// Images passed to the chart
    pub images: ContainerImages,
    companion_watch_started: AtomicBool,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client) -> ContextBuilder {
        ContextBuilder::new(client)
    }

    /// Whether the companion watch has been started by this process
    pub fn companion_watch_started(&self) -> bool {
        self.companion_watch_started.load(Ordering::Acquire)
    }

    /// Create a context for testing with mock collaborators
    #[cfg(test)]
    pub fn for_testing(
        kube: Arc<dyn KubeClient>,
        renderer: Arc<dyn ManifestRenderer>,
        events: Arc<dyn EventPublisher>,
        companion_watch: Arc<dyn CompanionWatch>,
    ) -> Self {
        Self {
            kube,
            renderer,
            events,
            companion_watch,
            allowed: AllowedIdentity::default(),
            images: ContainerImages::default(),
            companion_watch_started: AtomicBool::new(false),
        }
    }
}

/// Builder for constructing [`Context`] instances
///
/// ```text
/// let ctx = Context::builder(client)
///     .renderer(Arc::new(ChartRenderer::load("charts/nats")?))
///     .companion_watch(Arc::new(DestinationRuleWatch::new(client.clone(), tx)))
///     .allowed_identity(AllowedIdentity::new("eventing-nats", "kyma-system"))
///     .build()?;
/// ```
pub struct ContextBuilder {
    client: Client,
    kube: Option<Arc<dyn KubeClient>>,
    renderer: Option<Arc<dyn ManifestRenderer>>,
    events: Option<Arc<dyn EventPublisher>>,
    companion_watch: Option<Arc<dyn CompanionWatch>>,
    allowed: AllowedIdentity,
    images: ContainerImages,
}

impl ContextBuilder {
    fn new(client: Client) -> Self {
        Self {
            client,
            kube: None,
            renderer: None,
            events: None,
            companion_watch: None,
            allowed: AllowedIdentity::default(),
            images: ContainerImages::default(),
        }
    }

    /// Override the Kubernetes client (primarily for testing)
    pub fn kube_client(mut self, kube: Arc<dyn KubeClient>) -> Self {
        self.kube = Some(kube);
        self
    }

    /// Set the chart renderer
    pub fn renderer(mut self, renderer: Arc<dyn ManifestRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Override the event publisher
    pub fn events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Set the companion watch
    pub fn companion_watch(mut self, watch: Arc<dyn CompanionWatch>) -> Self {
        self.companion_watch = Some(watch);
        self
    }

    /// Set the one NATS resource allowed in the cluster
    pub fn allowed_identity(mut self, allowed: AllowedIdentity) -> Self {
        self.allowed = allowed;
        self
    }

    /// Set the images passed to the chart
    pub fn images(mut self, images: ContainerImages) -> Self {
        self.images = images;
        self
    }

    /// Build the Context
    ///
    /// The renderer and companion watch are required.
    pub fn build(self) -> Result<Context, Error> {
        let renderer = self
            .renderer
            .ok_or_else(|| Error::internal_with_context("context", "renderer is required"))?;
        let companion_watch = self.companion_watch.ok_or_else(|| {
            Error::internal_with_context("context", "companion watch is required")
        })?;

        Ok(Context {
            kube: self
                .kube
                .unwrap_or_else(|| Arc::new(KubeClientImpl::new(self.client.clone()))),
            events: self.events.unwrap_or_else(|| {
                Arc::new(KubeEventPublisher::new(self.client.clone(), CONTROLLER_NAME))
            }),
            renderer,
            companion_watch,
            allowed: self.allowed,
            images: self.images,
            companion_watch_started: AtomicBool::new(false),
        })
    }
}

/// Reconcile a NATS resource
///
/// The watched object only identifies the resource; the pass works on a
/// fresh read.
#[instrument(skip(nats, ctx), fields(nats = %nats.name_any(), namespace = ?nats.namespace()))]
pub async fn reconcile(nats: Arc<Nats>, ctx: Arc<Context>) -> Result<Action, Error> {
    let name = nats.name_any();
    let namespace = nats.namespace().unwrap_or_default();
    reconcile_identity(&name, &namespace, &ctx).await
}

/// Reconcile the NATS resource `namespace/name`
pub async fn reconcile_identity(
    name: &str,
    namespace: &str,
    ctx: &Context,
) -> Result<Action, Error> {
    let nats = ctx.kube.get_nats(name, namespace).await?;

    match (LifecyclePhase::of(nats.as_ref()), nats) {
        (LifecyclePhase::Active, Some(nats)) => provision(nats, ctx).await,
        (LifecyclePhase::Cleaning, Some(nats)) => deprovision(nats, ctx).await,
        (LifecyclePhase::PendingDeletion, _) => {
            debug!("finalizer already removed, nothing to clean up");
            Ok(Action::await_change())
        }
        _ => {
            debug!("NATS resource not found");
            Ok(Action::await_change())
        }
    }
}

/// Error policy for the controller
///
/// Errors that only a spec or chart fix can resolve back off longer.
pub fn error_policy(nats: Arc<Nats>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        nats = %nats.name_any(),
        retryable = error.is_retryable(),
        "reconciliation failed"
    );

    if error.is_retryable() {
        Action::requeue(RETRYABLE_ERROR_REQUEUE)
    } else {
        Action::requeue(PERMANENT_ERROR_REQUEUE)
    }
}

/// Write `desired` to the resource unless its current status already matches
pub async fn sync_status(
    ctx: &Context,
    name: &str,
    namespace: &str,
    desired: &NatsStatus,
) -> Result<(), Error> {
    let Some(mut latest) = ctx.kube.get_nats(name, namespace).await? else {
        debug!("NATS resource gone, skipping status update");
        return Ok(());
    };

    if latest
        .status
        .as_ref()
        .is_some_and(|current| current.is_equal(desired))
    {
        return Ok(());
    }

    latest.status = Some(desired.clone());
    ctx.kube.replace_status(&latest).await
}

async fn publish(
    ctx: &Context,
    nats: &Nats,
    type_: EventType,
    reason: &str,
    action: &str,
    note: impl Into<String>,
) {
    ctx.events
        .publish(&nats.object_ref(&()), type_, reason, action, Some(note.into()))
        .await;
}

async fn provision(nats: Nats, ctx: &Context) -> Result<Action, Error> {
    let name = nats.name_any();
    let namespace = nats.namespace().unwrap_or_default();
    info!("reconciling NATS");

    let mut status = nats.status.clone().unwrap_or_default();
    status.initialize();
    publish(
        ctx,
        &nats,
        EventType::Normal,
        reasons::PROCESSING,
        actions::RECONCILE,
        "Initializing NATS resource.",
    )
    .await;

    if !nats.has_finalizer() {
        info!("adding finalizer");
        ctx.kube
            .add_finalizer(&name, &namespace, NATS_FINALIZER)
            .await?;
        return Ok(Action::requeue(FINALIZER_REQUEUE));
    }

    if let Err(e) = nats.spec.validate() {
        let message = match &e {
            Error::Validation { message, .. } => message.clone(),
            other => other.to_string(),
        };
        warn!(error = %message, "invalid NATS spec");
        status.set_error(message.clone());
        publish(
            ctx,
            &nats,
            EventType::Warning,
            reasons::FAILED_PROCESSING,
            actions::RECONCILE,
            message,
        )
        .await;
        sync_status(ctx, &name, &namespace, &status).await?;
        return Ok(Action::await_change());
    }

    if !ctx.allowed.permits(&name, &namespace) {
        let message = ctx.allowed.forbidden_message();
        warn!("NATS resource is not the allowed instance");
        status.set_forbidden(message.clone());
        publish(
            ctx,
            &nats,
            EventType::Warning,
            reasons::FORBIDDEN,
            actions::ADMIT,
            message,
        )
        .await;
        sync_status(ctx, &name, &namespace, &status).await?;
        return Ok(Action::await_change());
    }

    match converge(&nats, &mut status, ctx).await {
        Ok(action) => Ok(action),
        Err(e) => {
            status.set_error(e.to_string());
            publish(
                ctx,
                &nats,
                EventType::Warning,
                reasons::FAILED_PROCESSING,
                actions::DEPLOY,
                format!("Error while NATS resources were deployed: {}", e),
            )
            .await;
            if let Err(sync_err) = sync_status(ctx, &name, &namespace, &status).await {
                warn!(error = %sync_err, "failed to record error status");
            }
            Err(e)
        }
    }
}

async fn converge(nats: &Nats, status: &mut NatsStatus, ctx: &Context) -> Result<Action, Error> {
    let name = nats.name_any();
    let namespace = nats.namespace().unwrap_or_default();

    let release = build_release(nats, ctx).await?;

    for obj in &release.rendered().items {
        ctx.kube.apply(obj).await?;
    }
    debug!(objects = release.rendered().items.len(), "applied NATS resources");

    ensure_companion_watch(ctx, release.istio_enabled)?;

    status.clear_url();
    if !is_statefulset_ready(ctx.kube.as_ref(), &release).await? {
        status.set_waiting();
        publish(
            ctx,
            nats,
            EventType::Normal,
            reasons::DEPLOYING,
            actions::DEPLOY,
            "NATS is being deployed, waiting for StatefulSet to get ready.",
        )
        .await;
        sync_status(ctx, &name, &namespace, status).await?;
        info!("waiting for StatefulSet to get ready");
        return Ok(Action::requeue(STATUS_CHECK_REQUEUE));
    }

    status.set_ready();
    status.set_url(format_url(&name, &namespace));
    publish(
        ctx,
        nats,
        EventType::Normal,
        reasons::DEPLOYED,
        actions::DEPLOY,
        "StatefulSet is ready and NATS is deployed.",
    )
    .await;

    let cluster_size = nats.spec.cluster.size;
    match check_zone_spread(ctx.kube.as_ref(), &name, &namespace, cluster_size).await {
        Ok(spread) => {
            status.record_zone_spread(&spread);
            match spread {
                ZoneSpread::Spread { .. } => {
                    publish(
                        ctx,
                        nats,
                        EventType::Normal,
                        reasons::DEPLOYED,
                        actions::RECONCILE,
                        "NATS is deployed in different availability zones.",
                    )
                    .await
                }
                ZoneSpread::Insufficient { zones } => {
                    publish(
                        ctx,
                        nats,
                        EventType::Warning,
                        reasons::NOT_CONFIGURED,
                        actions::RECONCILE,
                        format!(
                            "NATS is not deployed in different availability zones (current: {}).",
                            zones
                        ),
                    )
                    .await
                }
                ZoneSpread::NotApplicable => {}
            }
        }
        Err(e) if e.is_zone_label_missing() => {
            warn!(error = %e, "cannot determine availability zones");
            status.record_zone_lookup_failure(e.to_string());
            publish(
                ctx,
                nats,
                EventType::Warning,
                reasons::FAILED_PROCESSING,
                actions::RECONCILE,
                e.to_string(),
            )
            .await;
        }
        Err(e) => return Err(e),
    }

    metrics::record_availability_zones_used(&name, &namespace, status.availability_zones_used());
    metrics::record_cluster_size(&name, &namespace, cluster_size);

    sync_status(ctx, &name, &namespace, status).await?;
    info!(state = %status.state(), "reconciliation successful");
    Ok(Action::await_change())
}

/// Render the release for `nats` with ownership and labels applied
async fn build_release(nats: &Nats, ctx: &Context) -> Result<ReleaseInstance, Error> {
    let name = nats.name_any();
    let namespace = nats.namespace().unwrap_or_default();

    let istio_enabled = ctx.kube.crd_exists(DESTINATION_RULE_CRD_NAME).await?;
    let existing_password = ctx
        .kube
        .get_secret(&format!("{}-secret", name), &namespace)
        .await?
        .as_ref()
        .and_then(secret_password);

    let overrides = generate_overrides(
        &nats.spec,
        istio_enabled,
        existing_password.as_deref(),
        &ctx.images,
    );
    debug!(
        istio_enabled,
        keys = ?overrides.keys().collect::<Vec<_>>(),
        "generated chart overrides"
    );

    let mut release = ReleaseInstance::new(&name, &namespace, istio_enabled, overrides);
    let rendered = ctx.renderer.render(&release)?;
    let steps = default_transforms(nats)?;
    release.set_rendered(apply_transforms(rendered, &steps));
    Ok(release)
}

fn secret_password(secret: &Secret) -> Option<String> {
    secret
        .data
        .as_ref()?
        .get(PASSWORD_SECRET_KEY)
        .and_then(|bytes| String::from_utf8(bytes.0.clone()).ok())
        .filter(|password| !password.is_empty())
}

/// Start the companion watch once Istio is present
///
/// The watch is started at most once per process; a failed start leaves the
/// latch open for the next pass.
fn ensure_companion_watch(ctx: &Context, istio_enabled: bool) -> Result<(), Error> {
    if !istio_enabled {
        return Ok(());
    }
    if ctx
        .companion_watch_started
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return Ok(());
    }
    if let Err(e) = ctx.companion_watch.start() {
        ctx.companion_watch_started.store(false, Ordering::Release);
        return Err(e);
    }
    info!("watch for DestinationRules started");
    Ok(())
}

async fn deprovision(nats: Nats, ctx: &Context) -> Result<Action, Error> {
    let name = nats.name_any();
    let namespace = nats.namespace().unwrap_or_default();
    info!("deleting NATS");

    let mut status = nats.status.clone().unwrap_or_default();
    status.set_deleting();
    publish(
        ctx,
        &nats,
        EventType::Normal,
        reasons::DELETING,
        actions::DELETE,
        "Deleting the NATS cluster.",
    )
    .await;

    match clean_up(&nats, ctx).await {
        Ok(()) => {
            info!("NATS resources deleted, finalizer removed");
            Ok(Action::await_change())
        }
        Err(e) => {
            status.set_error(e.to_string());
            publish(
                ctx,
                &nats,
                EventType::Warning,
                reasons::FAILED_PROCESSING,
                actions::DELETE,
                format!("Error while NATS resources were deleted: {}", e),
            )
            .await;
            if let Err(sync_err) = sync_status(ctx, &name, &namespace, &status).await {
                warn!(error = %sync_err, "failed to record error status");
            }
            Err(e)
        }
    }
}

async fn clean_up(nats: &Nats, ctx: &Context) -> Result<(), Error> {
    let name = nats.name_any();
    let namespace = nats.namespace().unwrap_or_default();

    let release = build_release(nats, ctx).await?;
    for obj in &release.rendered().items {
        ctx.kube.delete(obj).await?;
    }

    ctx.kube
        .delete_pvcs_with_label(&namespace, &instance_selector(&name))
        .await?;

    ctx.kube
        .remove_finalizer(&name, &namespace, NATS_FINALIZER)
        .await
}

//! Pass orchestrator
//!
//! Drives one reconcile pass for one CR: fetch, resolve, route pre-pass,
//! credential provisioning, image resolution, diff/apply, status. The
//! pass is single-threaded per CR; a cooperative cancel flag is checked
//! between phases so shutdown never tears a pass mid-mutation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::config::CoreConfig;
use crate::crd::{AppSuite, AppSuiteStatus, ObjRef};
use crate::error::{Error, Reason, Result};
use crate::reconcile::routes::RoutePhase;
use crate::reconcile::{credentials, images, routes, status, ReconcileOutcome};
use crate::resolver::DesiredStateResolver;
use crate::resources::{
    deployed, diff, flatten, ManagedResource, ResourceId, ResourceKind, ResourceSet,
};
use crate::store::{OwnerSelector, Store};

pub struct Reconciler {
    store: Arc<dyn Store>,
    resolver: Arc<dyn DesiredStateResolver>,
    config: CoreConfig,
    cancel: Arc<AtomicBool>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn Store>,
        resolver: Arc<dyn DesiredStateResolver>,
        config: CoreConfig,
    ) -> Self {
        Self {
            store,
            resolver,
            config,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared flag the surrounding process flips on shutdown
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn checkpoint(&self) -> Result<()> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Run one pass for the CR identified by namespace and name
    #[instrument(skip(self), fields(kind = "AppSuite"))]
    pub async fn reconcile(&self, namespace: &str, name: &str) -> Result<ReconcileOutcome> {
        self.checkpoint()?;
        let Some(mut app) = self.store.get_app(namespace, name).await? else {
            return self.cleanup(namespace, name).await;
        };

        match self.run_pass(&mut app).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                // Transient/Conflict failures are the caller's to retry
                // and never overwrite status; everything else surfaces.
                if matches!(
                    err.reason(),
                    Reason::ConfigurationError | Reason::MissingDependency | Reason::Unknown
                ) {
                    status::persist_failure(self.store.as_ref(), &mut app, &err).await;
                } else {
                    warn!("pass failed: {err}");
                }
                Err(err)
            }
        }
    }

    async fn run_pass(&self, app: &mut AppSuite) -> Result<ReconcileOutcome> {
        let namespace = app.metadata.namespace.clone().unwrap_or_default();
        let name = app.metadata.name.clone().unwrap_or_default();
        let store = self.store.as_ref();

        // The resolved spec is pinned for the whole pass
        app.status.get_or_insert_with(AppSuiteStatus::default).applied = Some(app.spec.clone());
        // Resolution failure is terminal for the pass, whatever its cause
        let mut env = self.resolver.resolve(app).map_err(|err| match err {
            err @ Error::Configuration(_) => err,
            other => Error::Configuration(other.to_string()),
        })?;
        self.verify_external_references(app).await?;
        self.checkpoint()?;

        // Routes first; credential CNs depend on their assigned hostnames
        let deployed_routes = match routes::ensure_routes(store, app, &env).await? {
            RoutePhase::AwaitingHostnames { requeue_after } => {
                status::set_provisioning(app);
                let cached = store.get_app_cached(&namespace, &name).await?;
                return status::update_status(
                    store,
                    app,
                    cached.as_ref(),
                    ReconcileOutcome::changed_after(requeue_after),
                )
                .await;
            }
            RoutePhase::Ready { deployed } => deployed,
        };
        self.checkpoint()?;

        let ca_bundle = if app.applied().common.platform_ca {
            let id = ResourceId::new(
                ResourceKind::ConfigMap,
                &namespace,
                format!("{}-ca-bundle", app.application_name()),
            );
            match store.get(&id).await? {
                Some(ManagedResource::ConfigMap(cm)) => Some(cm),
                _ => None,
            }
        } else {
            None
        };
        credentials::provision(
            store,
            &self.config,
            app,
            &mut env,
            &deployed_routes,
            ca_bundle.as_ref(),
        )
        .await?;
        self.checkpoint()?;

        images::resolve_images(store, &self.config, app, &mut env).await?;
        self.checkpoint()?;

        let requested = flatten::flatten(&env, &namespace);
        let deployed = deployed::load_deployed(store, &self.config, app).await?;
        status::set_deployment_summary(app, &deployed);
        let has_changes = diff::apply(store, app, &deployed, &requested).await?;

        let outcome = if has_changes {
            status::set_provisioning(app);
            ReconcileOutcome::changed()
        } else {
            status::set_deployed(app);
            ReconcileOutcome::settled()
        };
        let cached = store.get_app_cached(&namespace, &name).await?;
        status::update_status(store, app, cached.as_ref(), outcome).await
    }

    /// The CR is gone; remove whatever it still owns. Ownership is
    /// matched through owner references by CR kind and name, since the
    /// UID died with the CR.
    async fn cleanup(&self, namespace: &str, name: &str) -> Result<ReconcileOutcome> {
        info!("CR not found, removing remaining owned resources");
        let owner = OwnerSelector::named(name);
        let mut leftovers = ResourceSet::default();
        for kind in ResourceKind::listable() {
            for resource in self.store.list(*kind, namespace, &owner).await? {
                leftovers.push(resource);
            }
        }
        // Owned keystore secrets are only reachable through the workload
        // volumes, so they must be collected before the workloads go
        for secret in
            deployed::load_workload_secrets(self.store.as_ref(), namespace, &owner, &leftovers)
                .await?
        {
            leftovers.push(secret);
        }
        let mut removed = false;
        for resource in leftovers.iter() {
            self.store.delete(&resource.id()).await?;
            removed = true;
        }
        if self.config.supports_console_links() {
            let id = ResourceId::new(
                ResourceKind::ConsoleLink,
                "",
                deployed::console_link_name(namespace, name),
            );
            if self.store.get(&id).await?.is_some() {
                self.store.delete(&id).await?;
                removed = true;
            }
        }
        Ok(if removed {
            ReconcileOutcome::changed()
        } else {
            ReconcileOutcome::settled()
        })
    }

    /// Every externally referenced object must exist before anything is
    /// applied; the supported reference kinds are a closed set.
    async fn verify_external_references(&self, app: &AppSuite) -> Result<()> {
        let namespace = app.metadata.namespace.clone().unwrap_or_default();
        let applied = app.applied();

        let mut refs: Vec<&ObjRef> = Vec::new();
        if let Some(hooks) = applied
            .objects
            .console
            .as_ref()
            .and_then(|c| c.git_hooks.as_ref())
        {
            if let Some(from) = hooks.from.as_ref() {
                refs.push(from);
            }
        }
        if let Some(mapper) = applied.auth.as_ref().and_then(|a| a.role_mapper.as_ref()) {
            if let Some(from) = mapper.from.as_ref() {
                refs.push(from);
            }
        }

        for obj in refs {
            let kind = match obj.kind.as_str() {
                "ConfigMap" => ResourceKind::ConfigMap,
                "Secret" => ResourceKind::Secret,
                "PersistentVolumeClaim" => ResourceKind::PersistentVolumeClaim,
                other => {
                    return Err(Error::Configuration(format!(
                        "unsupported external reference kind {other}"
                    )))
                }
            };
            let id = ResourceId::new(kind, &namespace, &obj.name);
            if self.store.get(&id).await?.is_none() {
                return Err(Error::MissingDependency {
                    kind: obj.kind.clone(),
                    namespace: namespace.clone(),
                    name: obj.name.clone(),
                });
            }
        }
        Ok(())
    }
}

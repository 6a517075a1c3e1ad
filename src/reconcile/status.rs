//! Status state machine
//!
//! Phase is derived fresh each pass from what the pass observed, never
//! incremented from the previous value. Status writes are guarded by the
//! version token of the CR the pass started from; a stale token means a
//! newer spec is already queued, so the pass requeues instead of writing.

use chrono::Utc;
use tracing::{debug, warn};

use crate::crd::{AppSuite, AppSuiteStatus, Condition, Phase};
use crate::error::{Error, Reason, Result};
use crate::reconcile::ReconcileOutcome;
use crate::resources::{ManagedResource, ResourceKind, ResourceSet};
use crate::store::Store;

fn status_mut(app: &mut AppSuite) -> &mut AppSuiteStatus {
    app.status.get_or_insert_with(AppSuiteStatus::default)
}

fn set_phase(app: &mut AppSuite, phase: Phase, reason: &str, message: &str) {
    let status = status_mut(app);
    status.phase = phase;
    let type_ = format!("{:?}", phase);
    // Only transitions append; a repeat of the current condition is dropped
    if let Some(last) = status.conditions.last() {
        if last.type_ == type_ && last.message == message {
            return;
        }
    }
    status.conditions.push(Condition {
        type_,
        status: "True".to_string(),
        last_transition_time: Utc::now().to_rfc3339(),
        reason: reason.to_string(),
        message: message.to_string(),
    });
}

/// Mutations were applied this pass; the deployment is still converging
pub fn set_provisioning(app: &mut AppSuite) -> bool {
    set_phase(app, Phase::Provisioning, "ResourcesApplied", "");
    true
}

/// No drift was found; the deployed state matches the request
pub fn set_deployed(app: &mut AppSuite) -> bool {
    set_phase(app, Phase::Deployed, "InSync", "");
    false
}

/// Record a failed pass, classified through the error taxonomy
pub fn set_failed(app: &mut AppSuite, err: &Error) {
    let reason = err.reason();
    let phase = match reason {
        Reason::ConfigurationError => Phase::ConfigurationError,
        Reason::MissingDependency => Phase::MissingDependency,
        _ => Phase::Failed,
    };
    set_phase(app, phase, &format!("{:?}", reason), &err.to_string());
}

/// Summarize workload availability into the ready/starting/stopped buckets
pub fn set_deployment_summary(app: &mut AppSuite, deployed: &ResourceSet) {
    let mut summary = crate::crd::DeploymentsSummary::default();
    for resource in deployed.get(ResourceKind::Workload) {
        let ManagedResource::Workload(dc) = resource else {
            continue;
        };
        let name = dc.metadata.name.clone().unwrap_or_default();
        let available = dc.status.as_ref().map(|s| s.available_replicas).unwrap_or(0);
        if dc.spec.replicas == 0 {
            summary.stopped.push(name);
        } else if available < dc.spec.replicas {
            summary.starting.push(name);
        } else {
            summary.ready.push(name);
        }
    }
    summary.ready.sort();
    summary.starting.sort();
    summary.stopped.sort();
    status_mut(app).deployments = summary;
}

/// Write the derived status if it changed and the pass still holds the
/// freshest CR; otherwise requeue for immediate redelivery.
pub async fn update_status(
    store: &dyn Store,
    app: &AppSuite,
    cached: Option<&AppSuite>,
    outcome: ReconcileOutcome,
) -> Result<ReconcileOutcome> {
    let fresh = cached
        .map(|c| c.metadata.resource_version == app.metadata.resource_version)
        .unwrap_or(true);
    if !fresh {
        debug!("newer CR revision observed, deferring status write");
        return Ok(outcome.requeue_now());
    }
    let unchanged = cached
        .map(|c| c.status == app.status)
        .unwrap_or(false);
    if unchanged {
        return Ok(outcome);
    }
    match store.update_app_status(app).await {
        Ok(()) => Ok(outcome),
        Err(Error::StaleStatus { .. }) => Ok(outcome.requeue_now()),
        Err(err) => Err(err),
    }
}

/// Best-effort status write on the failure path; the original error must
/// survive, so a secondary write failure is only logged.
pub async fn persist_failure(store: &dyn Store, app: &mut AppSuite, err: &Error) {
    set_failed(app, err);
    if let Err(write_err) = store.update_app_status(app).await {
        warn!("failed to record failure status: {write_err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{DeploymentConfig, DeploymentConfigStatus};
    use crate::store::MemoryStore;
    use kube::api::ObjectMeta;

    fn app() -> AppSuite {
        AppSuite {
            metadata: ObjectMeta {
                name: Some("myapp".to_string()),
                namespace: Some("demo".to_string()),
                ..Default::default()
            },
            spec: Default::default(),
            status: None,
        }
    }

    fn workload(name: &str, replicas: i32, available: i32) -> ManagedResource {
        let mut dc = DeploymentConfig::default();
        dc.metadata.name = Some(name.to_string());
        dc.spec.replicas = replicas;
        dc.status = Some(DeploymentConfigStatus {
            available_replicas: available,
        });
        ManagedResource::Workload(dc)
    }

    #[test]
    fn failure_phase_follows_the_error_taxonomy() {
        let mut app = app();
        set_failed(&mut app, &Error::Configuration("bad env".into()));
        assert_eq!(app.status.as_ref().unwrap().phase, Phase::ConfigurationError);

        set_failed(
            &mut app,
            &Error::MissingDependency {
                kind: "ConfigMap".into(),
                namespace: "demo".into(),
                name: "git-hooks".into(),
            },
        );
        assert_eq!(app.status.as_ref().unwrap().phase, Phase::MissingDependency);

        set_failed(&mut app, &Error::Credential("keygen".into()));
        assert_eq!(app.status.as_ref().unwrap().phase, Phase::Failed);
    }

    #[test]
    fn repeated_conditions_do_not_accumulate() {
        let mut app = app();
        set_provisioning(&mut app);
        set_provisioning(&mut app);
        assert_eq!(app.status.as_ref().unwrap().conditions.len(), 1);

        set_deployed(&mut app);
        assert_eq!(app.status.as_ref().unwrap().conditions.len(), 2);
    }

    #[test]
    fn deployment_summary_buckets() {
        let mut app = app();
        let deployed: ResourceSet = vec![
            workload("console", 1, 1),
            workload("server", 2, 1),
            workload("dashboard", 0, 0),
        ]
        .into_iter()
        .collect();
        set_deployment_summary(&mut app, &deployed);

        let summary = &app.status.as_ref().unwrap().deployments;
        assert_eq!(summary.ready, vec!["console"]);
        assert_eq!(summary.starting, vec!["server"]);
        assert_eq!(summary.stopped, vec!["dashboard"]);
    }

    #[tokio::test]
    async fn stale_revision_defers_the_write_and_requeues() {
        let store = MemoryStore::new();
        let mut app = app();
        app.metadata.uid = Some("uid-1".to_string());
        store.put_app(app).await;

        let mut held = store.get_app("demo", "myapp").await.unwrap().unwrap();
        store.bump_app_version().await;
        let cached = store.get_app_cached("demo", "myapp").await.unwrap();

        set_provisioning(&mut held);
        let outcome = update_status(
            &store,
            &held,
            cached.as_ref(),
            ReconcileOutcome::changed(),
        )
        .await
        .unwrap();
        assert_eq!(outcome.requeue_after, Some(std::time::Duration::ZERO));
        assert_eq!(store.app_status().await, None, "stale pass must not write");
    }

    #[tokio::test]
    async fn unchanged_status_skips_the_write() {
        let store = MemoryStore::new();
        let mut seeded = app();
        set_deployed(&mut seeded);
        let written = seeded.status.clone();
        store.put_app(seeded).await;

        let held = store.get_app("demo", "myapp").await.unwrap().unwrap();
        let cached = store.get_app_cached("demo", "myapp").await.unwrap();
        let version_before = held.metadata.resource_version.clone();

        let outcome = update_status(&store, &held, cached.as_ref(), ReconcileOutcome::settled())
            .await
            .unwrap();
        assert_eq!(outcome.requeue_after, None);
        assert_eq!(store.app_status().await, written);
        let after = store.get_app("demo", "myapp").await.unwrap().unwrap();
        assert_eq!(after.metadata.resource_version, version_before);
    }
}

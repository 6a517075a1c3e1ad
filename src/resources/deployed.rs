//! Deployed-State Loader
//!
//! Collects everything currently deployed and owned by the CR. Secrets
//! cannot be listed generically by owner in every deployment of the store,
//! so they are discovered by walking the secret-backed volumes of deployed
//! workloads and keeping only those whose owner UID matches the CR.

use std::collections::BTreeSet;

use tracing::warn;

use crate::config::CoreConfig;
use crate::crd::AppSuite;
use crate::error::Result;
use crate::resources::{ManagedResource, ResourceId, ResourceKind, ResourceSet};
use crate::store::{OwnerSelector, Store};

/// Name of the CR-scoped dashboard link resource. Derivable without the
/// CR itself, so the cleanup pass can name it after the CR is gone.
pub fn console_link_name(namespace: &str, name: &str) -> String {
    format!("{namespace}-link-{name}")
}

/// Load the full deployed set owned by the CR
pub async fn load_deployed(
    store: &dyn Store,
    config: &CoreConfig,
    app: &AppSuite,
) -> Result<ResourceSet> {
    let namespace = app.metadata.namespace.clone().unwrap_or_default();
    let name = app.metadata.name.clone().unwrap_or_default();
    let owner = OwnerSelector::of(app);

    let mut set = ResourceSet::default();
    for kind in ResourceKind::listable() {
        for resource in store.list(*kind, &namespace, &owner).await? {
            set.push(resource);
        }
    }

    for secret in load_workload_secrets(store, &namespace, &owner, &set).await? {
        set.push(secret);
    }

    if config.supports_console_links() {
        let id = ResourceId::new(
            ResourceKind::ConsoleLink,
            "",
            console_link_name(&namespace, &name),
        );
        match store.get(&id).await {
            Ok(Some(link)) => set.push(link),
            Ok(None) => {}
            Err(err) => {
                warn!(name = %id.name, "failed to load console link: {err}");
                return Err(err);
            }
        }
    }

    Ok(set)
}

/// Best-effort secondary lookup: fetch every secret referenced by a
/// deployed workload volume and keep the CR-owned ones
pub(crate) async fn load_workload_secrets(
    store: &dyn Store,
    namespace: &str,
    owner: &OwnerSelector,
    deployed: &ResourceSet,
) -> Result<Vec<ManagedResource>> {
    let mut names = BTreeSet::new();
    for resource in deployed.get(ResourceKind::Workload) {
        let ManagedResource::Workload(dc) = resource else {
            continue;
        };
        let volumes = dc
            .spec
            .template
            .as_ref()
            .and_then(|t| t.spec.as_ref())
            .and_then(|s| s.volumes.as_ref());
        for volume in volumes.into_iter().flatten() {
            if let Some(source) = volume.secret.as_ref() {
                if let Some(name) = source.secret_name.clone() {
                    names.insert(name);
                }
            }
        }
    }

    let mut secrets = Vec::new();
    for name in names {
        let id = ResourceId::new(ResourceKind::Secret, namespace, name);
        if let Some(secret) = store.get(&id).await? {
            if owner.matches(&secret) {
                secrets.push(secret);
            }
        }
    }
    Ok(secrets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::DeploymentConfig;
    use crate::store::MemoryStore;
    use k8s_openapi::api::core::v1::{
        PodSpec, PodTemplateSpec, Secret, SecretVolumeSource, Volume,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
    use kube::api::ObjectMeta;

    fn app(uid: &str) -> AppSuite {
        AppSuite {
            metadata: ObjectMeta {
                name: Some("myapp".to_string()),
                namespace: Some("demo".to_string()),
                uid: Some(uid.to_string()),
                ..Default::default()
            },
            spec: Default::default(),
            status: None,
        }
    }

    fn owned_by(uid: &str) -> Vec<OwnerReference> {
        vec![OwnerReference {
            uid: uid.to_string(),
            ..Default::default()
        }]
    }

    fn workload_with_secret_volume(uid: &str, secret_name: &str) -> ManagedResource {
        let mut dc = DeploymentConfig::default();
        dc.metadata.name = Some("console".to_string());
        dc.metadata.namespace = Some("demo".to_string());
        dc.metadata.owner_references = Some(owned_by(uid));
        dc.spec.template = Some(PodTemplateSpec {
            spec: Some(PodSpec {
                volumes: Some(vec![Volume {
                    name: "keystore".to_string(),
                    secret: Some(SecretVolumeSource {
                        secret_name: Some(secret_name.to_string()),
                        ..Default::default()
                    }),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        });
        ManagedResource::Workload(dc)
    }

    fn secret(name: &str, owners: Option<Vec<OwnerReference>>) -> ManagedResource {
        let mut secret = Secret::default();
        secret.metadata.name = Some(name.to_string());
        secret.metadata.namespace = Some("demo".to_string());
        secret.metadata.owner_references = owners;
        ManagedResource::Secret(secret)
    }

    #[tokio::test]
    async fn secrets_are_discovered_through_workload_volumes() {
        let store = MemoryStore::new();
        store
            .seed(workload_with_secret_volume("uid-1", "console-keystore"))
            .await;
        store
            .seed(secret("console-keystore", Some(owned_by("uid-1"))))
            .await;
        // Referenced but owned by somebody else: filtered out
        store.seed(secret("external-secret", None)).await;

        let set = load_deployed(&store, &CoreConfig::default(), &app("uid-1"))
            .await
            .unwrap();
        let secrets = set.get(ResourceKind::Secret);
        assert_eq!(secrets.len(), 1);
        assert_eq!(secrets[0].name(), "console-keystore");
        assert_eq!(set.get(ResourceKind::Workload).len(), 1);
    }

    #[tokio::test]
    async fn console_link_is_skipped_on_old_platforms() {
        let store = MemoryStore::new();
        let app = app("uid-1");
        let mut link = crate::platform::ConsoleLink::default();
        link.metadata.name = Some(console_link_name("demo", "myapp"));
        store.seed(ManagedResource::ConsoleLink(link)).await;

        let old = CoreConfig {
            platform_version: Some(semver::Version::new(4, 1, 0)),
            ..Default::default()
        };
        let set = load_deployed(&store, &old, &app).await.unwrap();
        assert!(set.get(ResourceKind::ConsoleLink).is_empty());

        let unknown = CoreConfig::default();
        let set = load_deployed(&store, &unknown, &app).await.unwrap();
        assert_eq!(set.get(ResourceKind::ConsoleLink).len(), 1);
    }
}

//! Image Reference Resolver
//!
//! Rewrites every image-change trigger and source-build reference in the
//! environment so it points at an image stream tag that actually exists.
//! A reference is honored in its requested namespace when the tag is
//! there; otherwise a namespace-local tag is created in the CR namespace,
//! pointing at the product registry, and the reference is repointed.

use tracing::{debug, info};

use crate::config::{CoreConfig, DEFAULT_REGISTRY};
use crate::crd::{AppSuite, AppSuiteSpec};
use crate::error::{Error, Result};
use crate::platform::{
    FromRef, ImageStreamTag, TagImportPolicy, TagReference, TagReferencePolicy,
    LOCAL_TAG_REFERENCE_POLICY, SOURCE_BUILD_STRATEGY, TRIGGER_ON_IMAGE_CHANGE,
};
use crate::resolver::Environment;
use crate::resources::{ManagedResource, ResourceId, ResourceKind};
use crate::store::Store;

/// Resolve every image reference in the environment in place. Components
/// with build configs resolve through their source-build references, the
/// rest through their workload triggers.
pub async fn resolve_images(
    store: &dyn Store,
    config: &CoreConfig,
    app: &AppSuite,
    env: &mut Environment,
) -> Result<()> {
    let namespace = app.metadata.namespace.clone().unwrap_or_default();
    let applied = app.applied().clone();

    for component in env.components_mut() {
        if component.omit {
            continue;
        }
        if component.build_configs.is_empty() {
            for workload in &mut component.workloads {
                for trigger in &mut workload.spec.triggers {
                    if trigger.trigger_type != TRIGGER_ON_IMAGE_CHANGE {
                        continue;
                    }
                    if let Some(params) = trigger.image_change_params.as_mut() {
                        params.from.namespace =
                            ensure_image_stream(store, config, &applied, &namespace, &params.from)
                                .await?;
                    }
                }
            }
        } else {
            for build_config in &mut component.build_configs {
                if build_config.spec.strategy.strategy_type != SOURCE_BUILD_STRATEGY {
                    continue;
                }
                if let Some(source) = build_config.spec.strategy.source_strategy.as_mut() {
                    source.from.namespace =
                        ensure_image_stream(store, config, &applied, &namespace, &source.from)
                            .await?;
                }
            }
        }
    }
    Ok(())
}

/// Decide which namespace the reference should point at, creating a local
/// tag when no usable one exists. With a registry override in play the
/// requested namespace is ignored and the CR namespace always wins.
async fn ensure_image_stream(
    store: &dyn Store,
    config: &CoreConfig,
    applied: &AppSuiteSpec,
    cr_namespace: &str,
    from: &FromRef,
) -> Result<String> {
    let tag_name = normalized_tag(&from.name);

    if applied.image_registry.is_none() && !from.namespace.is_empty() {
        let id = ResourceId::new(ResourceKind::ImageTag, &from.namespace, &tag_name);
        if store.get(&id).await?.is_some() {
            return Ok(from.namespace.clone());
        }
        debug!(tag = %tag_name, namespace = %from.namespace, "tag not found in requested namespace");
    }

    let local = ResourceId::new(ResourceKind::ImageTag, cr_namespace, &tag_name);
    if store.get(&local).await?.is_none() {
        create_local_image_tag(store, config, applied, cr_namespace, &from.name).await?;
    }
    Ok(cr_namespace.to_string())
}

/// Create a tag in the CR namespace pointing at the external registry
/// image derived from the requested name and the suite's product settings
async fn create_local_image_tag(
    store: &dyn Store,
    config: &CoreConfig,
    applied: &AppSuiteSpec,
    namespace: &str,
    requested: &str,
) -> Result<()> {
    let tag_name = normalized_tag(requested);
    let (image, tag) = split_tag(&tag_name);
    let source = registry_image(config, applied, &image, &tag);
    let insecure = applied
        .image_registry
        .as_ref()
        .map(|r| r.insecure)
        .unwrap_or(config.insecure_registry);
    let scheduled = applied.use_image_tags && applied.scheduled_import_policy;

    info!(tag = %tag_name, source = %source, namespace, "creating local image tag");
    let mut ist = ImageStreamTag::default();
    ist.metadata.name = Some(tag_name.clone());
    ist.metadata.namespace = Some(namespace.to_string());
    ist.tag = Some(TagReference {
        name: tag,
        from: FromRef {
            kind: "DockerImage".to_string(),
            name: source,
            namespace: String::new(),
        },
        reference_policy: TagReferencePolicy {
            policy_type: LOCAL_TAG_REFERENCE_POLICY.to_string(),
        },
        import_policy: TagImportPolicy {
            insecure,
            scheduled,
        },
    });

    match store.create(ManagedResource::ImageTag(ist)).await {
        Ok(()) | Err(Error::AlreadyExists(_)) => Ok(()),
        Err(err) => Err(err),
    }
}

/// Full external image address for a requested `image:tag` pair
fn registry_image(config: &CoreConfig, applied: &AppSuiteSpec, image: &str, tag: &str) -> String {
    // Product families pinned to their own registry contexts
    if image.contains("datagrid") {
        return format!("{DEFAULT_REGISTRY}/jboss-datagrid-7/{image}:{tag}");
    }
    if image.contains("amq-broker-7") {
        let context = if image.contains("scaledown") {
            "amq-broker-7-tech-preview"
        } else {
            "amq-broker-7"
        };
        return format!("{DEFAULT_REGISTRY}/{context}/{image}:{tag}");
    }
    if image == "postgresql" || image == "mysql" {
        let major: String = tag.chars().filter(char::is_ascii_digit).collect();
        return format!("{DEFAULT_REGISTRY}/rhscl/{image}-{major}-rhel7:latest");
    }

    // A fully qualified reference carries its own registry and context
    let segments: Vec<&str> = image.split('/').collect();
    if segments.len() >= 3 {
        return format!("{}:{}", image, tag);
    }

    let registry = applied
        .image_registry
        .as_ref()
        .filter(|r| !r.registry.is_empty())
        .map(|r| r.registry.clone())
        .unwrap_or_else(|| config.default_registry.clone());
    let product = applied.environment.split('-').next().unwrap_or_default();
    let major = applied.version.split('.').next().unwrap_or_default();
    format!("{registry}/{product}-{major}/{image}:{tag}")
}

/// `name:tag`, defaulting the tag to `latest`
fn normalized_tag(name: &str) -> String {
    match name.rsplit_once(':') {
        Some(_) => name.to_string(),
        None => format!("{name}:latest"),
    }
}

fn split_tag(normalized: &str) -> (String, String) {
    match normalized.rsplit_once(':') {
        Some((image, tag)) => (image.to_string(), tag.to_string()),
        None => (normalized.to_string(), "latest".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::RegistrySettings;
    use crate::platform::{DeploymentConfig, DeploymentTrigger, ImageChangeParams};
    use crate::store::MemoryStore;
    use kube::api::ObjectMeta;

    fn app(environment: &str, version: &str) -> AppSuite {
        AppSuite {
            metadata: ObjectMeta {
                name: Some("myapp".to_string()),
                namespace: Some("demo".to_string()),
                uid: Some("uid-1".to_string()),
                ..Default::default()
            },
            spec: AppSuiteSpec {
                environment: environment.to_string(),
                version: version.to_string(),
                ..Default::default()
            },
            status: None,
        }
    }

    fn env_with_trigger(image: &str, namespace: &str) -> Environment {
        let mut dc = DeploymentConfig::default();
        dc.metadata.name = Some("console".to_string());
        dc.spec.triggers = vec![DeploymentTrigger {
            trigger_type: TRIGGER_ON_IMAGE_CHANGE.to_string(),
            image_change_params: Some(ImageChangeParams {
                automatic: true,
                container_names: vec!["console".to_string()],
                from: FromRef {
                    kind: "ImageStreamTag".to_string(),
                    name: image.to_string(),
                    namespace: namespace.to_string(),
                },
            }),
        }];
        let mut env = Environment::default();
        env.console.workloads.push(dc);
        env
    }

    async fn stored_source(store: &MemoryStore, namespace: &str, tag: &str) -> String {
        let id = ResourceId::new(ResourceKind::ImageTag, namespace, tag);
        match store.get(&id).await.unwrap() {
            Some(ManagedResource::ImageTag(ist)) => ist.tag.unwrap().from.name,
            other => panic!("expected image tag, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_tag_is_created_locally_and_reference_repointed() {
        let store = MemoryStore::new();
        let app = app("myproduct-authoring", "7.11.0");
        let mut env = env_with_trigger("myproduct-console:7.11", "openshift");

        resolve_images(&store, &CoreConfig::default(), &app, &mut env)
            .await
            .unwrap();

        let params = env.console.workloads[0].spec.triggers[0]
            .image_change_params
            .as_ref()
            .unwrap();
        assert_eq!(params.from.namespace, "demo");
        assert_eq!(
            stored_source(&store, "demo", "myproduct-console:7.11").await,
            "registry.redhat.io/myproduct-7/myproduct-console:7.11"
        );
    }

    #[tokio::test]
    async fn existing_tag_in_requested_namespace_is_honored() {
        let store = MemoryStore::new();
        let mut ist = ImageStreamTag::default();
        ist.metadata.name = Some("myproduct-console:7.11".to_string());
        ist.metadata.namespace = Some("openshift".to_string());
        store.seed(ManagedResource::ImageTag(ist)).await;

        let app = app("myproduct-authoring", "7.11.0");
        let mut env = env_with_trigger("myproduct-console:7.11", "openshift");
        resolve_images(&store, &CoreConfig::default(), &app, &mut env)
            .await
            .unwrap();

        let params = env.console.workloads[0].spec.triggers[0]
            .image_change_params
            .as_ref()
            .unwrap();
        assert_eq!(params.from.namespace, "openshift");
        assert!(store.all_of_kind(ResourceKind::ImageTag).await.len() == 1);
    }

    #[tokio::test]
    async fn registry_override_forces_the_cr_namespace() {
        let store = MemoryStore::new();
        let mut ist = ImageStreamTag::default();
        ist.metadata.name = Some("myproduct-console:7.11".to_string());
        ist.metadata.namespace = Some("openshift".to_string());
        store.seed(ManagedResource::ImageTag(ist)).await;

        let mut app = app("myproduct-authoring", "7.11.0");
        app.spec.image_registry = Some(RegistrySettings {
            registry: "mirror.example.com".to_string(),
            insecure: true,
        });
        let mut env = env_with_trigger("myproduct-console:7.11", "openshift");
        resolve_images(&store, &CoreConfig::default(), &app, &mut env)
            .await
            .unwrap();

        let params = env.console.workloads[0].spec.triggers[0]
            .image_change_params
            .as_ref()
            .unwrap();
        assert_eq!(params.from.namespace, "demo");
        assert_eq!(
            stored_source(&store, "demo", "myproduct-console:7.11").await,
            "mirror.example.com/myproduct-7/myproduct-console:7.11"
        );
    }

    #[tokio::test]
    async fn database_images_map_to_the_rhscl_context() {
        let store = MemoryStore::new();
        let app = app("myproduct-authoring", "7.11.0");
        let mut env = env_with_trigger("postgresql:12", "");

        resolve_images(&store, &CoreConfig::default(), &app, &mut env)
            .await
            .unwrap();
        assert_eq!(
            stored_source(&store, "demo", "postgresql:12").await,
            "registry.redhat.io/rhscl/postgresql-12-rhel7:latest"
        );
    }

    #[test]
    fn broker_scaledown_images_use_the_tech_preview_context() {
        let source = registry_image(
            &CoreConfig::default(),
            &AppSuiteSpec::default(),
            "amq-broker-7-scaledown-controller-openshift",
            "7.5",
        );
        assert_eq!(
            source,
            "registry.redhat.io/amq-broker-7-tech-preview/amq-broker-7-scaledown-controller-openshift:7.5"
        );
    }

    #[test]
    fn fully_qualified_references_keep_their_registry() {
        let source = registry_image(
            &CoreConfig::default(),
            &AppSuiteSpec::default(),
            "quay.io/custom-context/console",
            "1.0",
        );
        assert_eq!(source, "quay.io/custom-context/console:1.0");
    }

    #[test]
    fn tags_default_to_latest() {
        assert_eq!(normalized_tag("console"), "console:latest");
        assert_eq!(normalized_tag("console:7.11"), "console:7.11");
    }
}

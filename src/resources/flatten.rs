//! Resource Flattener
//!
//! Pure transformation from the hierarchical environment description into
//! the flat, kind-indexed requested set. Omitted components contribute
//! nothing; every namespaced entry is stamped with the CR namespace.

use crate::resolver::{ComponentObjects, Environment};
use crate::resources::{ManagedResource, ResourceSet};

/// Flatten the full environment into the requested set
pub fn flatten(env: &Environment, namespace: &str) -> ResourceSet {
    let mut set = ResourceSet::default();
    for component in env.components().filter(|c| !c.omit) {
        for mut resource in component_resources(component) {
            if resource.is_namespaced() {
                resource.set_namespace(namespace);
            }
            set.push(resource);
        }
    }
    set
}

/// Flatten only the routes, for the early route-phase pass
pub fn flatten_routes(env: &Environment, namespace: &str) -> Vec<ManagedResource> {
    env.components()
        .filter(|c| !c.omit)
        .flat_map(|c| c.routes.iter().cloned())
        .map(|route| {
            let mut resource = ManagedResource::Route(route);
            resource.set_namespace(namespace);
            resource
        })
        .collect()
}

fn component_resources(component: &ComponentObjects) -> Vec<ManagedResource> {
    let mut resources = Vec::new();
    resources.extend(
        component
            .persistent_volume_claims
            .iter()
            .cloned()
            .map(ManagedResource::PersistentVolumeClaim),
    );
    resources.extend(
        component
            .service_accounts
            .iter()
            .cloned()
            .map(ManagedResource::ServiceAccount),
    );
    resources.extend(component.secrets.iter().cloned().map(ManagedResource::Secret));
    resources.extend(component.roles.iter().cloned().map(ManagedResource::Role));
    resources.extend(
        component
            .role_bindings
            .iter()
            .cloned()
            .map(ManagedResource::RoleBinding),
    );
    resources.extend(component.workloads.iter().cloned().map(ManagedResource::Workload));
    resources.extend(component.services.iter().cloned().map(ManagedResource::Service));
    resources.extend(component.routes.iter().cloned().map(ManagedResource::Route));
    resources.extend(
        component
            .image_streams
            .iter()
            .cloned()
            .map(ManagedResource::ImageStream),
    );
    resources.extend(
        component
            .build_configs
            .iter()
            .cloned()
            .map(ManagedResource::BuildConfig),
    );
    resources.extend(component.config_maps.iter().cloned().map(ManagedResource::ConfigMap));
    resources
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{DeploymentConfig, Route};
    use crate::resources::ResourceKind;
    use k8s_openapi::api::core::v1::Service;

    fn named_route(name: &str) -> Route {
        let mut route = Route::default();
        route.metadata.name = Some(name.to_string());
        route
    }

    #[test]
    fn omitted_components_are_filtered() {
        let mut env = Environment::default();
        env.console.routes.push(named_route("console"));
        env.router.omit = true;
        env.router.routes.push(named_route("router"));

        let set = flatten(&env, "demo");
        let routes = set.get(ResourceKind::Route);
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].name(), "console");
    }

    #[test]
    fn namespace_is_stamped_on_every_entry() {
        let mut env = Environment::default();
        env.console.workloads.push(DeploymentConfig::default());
        env.console.services.push(Service::default());
        env.servers.push(ComponentObjects {
            routes: vec![named_route("server")],
            ..Default::default()
        });

        let set = flatten(&env, "demo");
        assert_eq!(set.len(), 3);
        assert!(set.iter().all(|r| r.namespace() == "demo"));
    }

    #[test]
    fn route_subset_flatten_matches_full_flatten() {
        let mut env = Environment::default();
        env.console.routes.push(named_route("console"));
        env.servers.push(ComponentObjects {
            routes: vec![named_route("server")],
            workloads: vec![DeploymentConfig::default()],
            ..Default::default()
        });

        let routes = flatten_routes(&env, "demo");
        assert_eq!(routes.len(), 2);
        assert_eq!(
            routes.len(),
            flatten(&env, "demo").get(ResourceKind::Route).len()
        );
    }
}

//! Desired State Resolver boundary
//!
//! Rendering the desired-object graph from a named environment profile is
//! outside this core; the resolver hands back an [`Environment`] and the
//! core takes it from there. Resolution failure is a configuration error,
//! terminal for the pass.

use k8s_openapi::api::core::v1::{
    ConfigMap, PersistentVolumeClaim, Secret, Service, ServiceAccount,
};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use serde::{Deserialize, Serialize};

use crate::crd::AppSuite;
use crate::error::Result;
use crate::platform::{BuildConfig, DeploymentConfig, ImageStream, Route};

/// Resolved desired-state description for one pass
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    #[serde(default)]
    pub console: ComponentObjects,
    #[serde(default)]
    pub dashboard: ComponentObjects,
    #[serde(default)]
    pub servers: Vec<ComponentObjects>,
    #[serde(default)]
    pub router: ComponentObjects,
    #[serde(default)]
    pub databases: Vec<ComponentObjects>,
    #[serde(default)]
    pub others: Vec<ComponentObjects>,
}

impl Environment {
    /// All sub-components in flatten order
    pub fn components(&self) -> impl Iterator<Item = &ComponentObjects> {
        std::iter::once(&self.console)
            .chain(std::iter::once(&self.dashboard))
            .chain(self.servers.iter())
            .chain(std::iter::once(&self.router))
            .chain(self.databases.iter())
            .chain(self.others.iter())
    }

    pub fn components_mut(&mut self) -> impl Iterator<Item = &mut ComponentObjects> {
        std::iter::once(&mut self.console)
            .chain(std::iter::once(&mut self.dashboard))
            .chain(self.servers.iter_mut())
            .chain(std::iter::once(&mut self.router))
            .chain(self.databases.iter_mut())
            .chain(self.others.iter_mut())
    }
}

/// Per-component resource categories produced by the resolver
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentObjects {
    /// Omitted components contribute nothing to the requested set
    #[serde(default)]
    pub omit: bool,

    #[serde(default)]
    pub workloads: Vec<DeploymentConfig>,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub routes: Vec<Route>,
    #[serde(default)]
    pub secrets: Vec<Secret>,
    #[serde(default)]
    pub service_accounts: Vec<ServiceAccount>,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub role_bindings: Vec<RoleBinding>,
    #[serde(default)]
    pub persistent_volume_claims: Vec<PersistentVolumeClaim>,
    #[serde(default)]
    pub image_streams: Vec<ImageStream>,
    #[serde(default)]
    pub build_configs: Vec<BuildConfig>,
    #[serde(default)]
    pub config_maps: Vec<ConfigMap>,
}

impl ComponentObjects {
    /// True when the resolver produced no objects for this component.
    /// Such a component is no endpoint and gets no credentials.
    pub fn is_empty(&self) -> bool {
        self.workloads.is_empty()
            && self.services.is_empty()
            && self.routes.is_empty()
            && self.secrets.is_empty()
            && self.service_accounts.is_empty()
            && self.roles.is_empty()
            && self.role_bindings.is_empty()
            && self.persistent_volume_claims.is_empty()
            && self.image_streams.is_empty()
            && self.build_configs.is_empty()
            && self.config_maps.is_empty()
    }
}

/// External collaborator turning a CR into its environment description
pub trait DesiredStateResolver: Send + Sync {
    fn resolve(&self, app: &AppSuite) -> Result<Environment>;
}

/// Resolver returning a pre-rendered environment, used by tests and the
/// `simulate` subcommand
pub struct StaticResolver {
    environment: Environment,
}

impl StaticResolver {
    pub fn new(environment: Environment) -> Self {
        Self { environment }
    }
}

impl DesiredStateResolver for StaticResolver {
    fn resolve(&self, _app: &AppSuite) -> Result<Environment> {
        Ok(self.environment.clone())
    }
}

//! Typed model of the resources the operator manages
//!
//! The finite set of supported kinds is a closed enum; every managed
//! object carries its typed payload in [`ManagedResource`]. Comparisons
//! and store calls are always kind-scoped, so the (kind, namespace, name)
//! triple is the identity within one reconcile pass.

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Secret, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::Resource;

use crate::crd::AppSuite;
use crate::platform::{
    BuildConfig, ConsoleLink, DeploymentConfig, ImageStream, ImageStreamTag, Route,
    APPS_API_VERSION, BUILD_API_VERSION, CONSOLE_API_VERSION, IMAGE_API_VERSION, ROUTE_API_VERSION,
};

/// Closed set of kinds the core tracks
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    Workload,
    PersistentVolumeClaim,
    ServiceAccount,
    Role,
    RoleBinding,
    Service,
    Route,
    ImageStream,
    BuildConfig,
    ConfigMap,
    Secret,
    ConsoleLink,
    ImageTag,
}

impl ResourceKind {
    /// API group/version the kind belongs to
    pub fn api_version(&self) -> &'static str {
        match self {
            ResourceKind::Workload => APPS_API_VERSION,
            ResourceKind::Route => ROUTE_API_VERSION,
            ResourceKind::ImageStream | ResourceKind::ImageTag => IMAGE_API_VERSION,
            ResourceKind::BuildConfig => BUILD_API_VERSION,
            ResourceKind::ConsoleLink => CONSOLE_API_VERSION,
            ResourceKind::Role | ResourceKind::RoleBinding => "rbac.authorization.k8s.io/v1",
            _ => "v1",
        }
    }

    /// Kinds the store can list generically by owner. Secrets cannot be
    /// listed that way in all deployments, console links are cluster-scoped
    /// singletons and image tags are never owned.
    pub fn listable() -> &'static [ResourceKind] {
        &[
            ResourceKind::Workload,
            ResourceKind::PersistentVolumeClaim,
            ResourceKind::ServiceAccount,
            ResourceKind::Role,
            ResourceKind::RoleBinding,
            ResourceKind::Service,
            ResourceKind::Route,
            ResourceKind::ImageStream,
            ResourceKind::BuildConfig,
            ResourceKind::ConfigMap,
        ]
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Identity of a managed resource within one pass
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId {
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
}

impl ResourceId {
    pub fn new(kind: ResourceKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{} {}", self.kind, self.name)
        } else {
            write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
        }
    }
}

/// One managed object with its typed payload
#[derive(Clone, Debug, PartialEq)]
pub enum ManagedResource {
    Workload(DeploymentConfig),
    PersistentVolumeClaim(PersistentVolumeClaim),
    ServiceAccount(ServiceAccount),
    Role(Role),
    RoleBinding(RoleBinding),
    Service(Service),
    Route(Route),
    ImageStream(ImageStream),
    BuildConfig(BuildConfig),
    ConfigMap(ConfigMap),
    Secret(Secret),
    ConsoleLink(ConsoleLink),
    ImageTag(ImageStreamTag),
}

macro_rules! each_variant {
    ($self:expr, $r:ident => $body:expr) => {
        match $self {
            ManagedResource::Workload($r) => $body,
            ManagedResource::PersistentVolumeClaim($r) => $body,
            ManagedResource::ServiceAccount($r) => $body,
            ManagedResource::Role($r) => $body,
            ManagedResource::RoleBinding($r) => $body,
            ManagedResource::Service($r) => $body,
            ManagedResource::Route($r) => $body,
            ManagedResource::ImageStream($r) => $body,
            ManagedResource::BuildConfig($r) => $body,
            ManagedResource::ConfigMap($r) => $body,
            ManagedResource::Secret($r) => $body,
            ManagedResource::ConsoleLink($r) => $body,
            ManagedResource::ImageTag($r) => $body,
        }
    };
}

impl ManagedResource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ManagedResource::Workload(_) => ResourceKind::Workload,
            ManagedResource::PersistentVolumeClaim(_) => ResourceKind::PersistentVolumeClaim,
            ManagedResource::ServiceAccount(_) => ResourceKind::ServiceAccount,
            ManagedResource::Role(_) => ResourceKind::Role,
            ManagedResource::RoleBinding(_) => ResourceKind::RoleBinding,
            ManagedResource::Service(_) => ResourceKind::Service,
            ManagedResource::Route(_) => ResourceKind::Route,
            ManagedResource::ImageStream(_) => ResourceKind::ImageStream,
            ManagedResource::BuildConfig(_) => ResourceKind::BuildConfig,
            ManagedResource::ConfigMap(_) => ResourceKind::ConfigMap,
            ManagedResource::Secret(_) => ResourceKind::Secret,
            ManagedResource::ConsoleLink(_) => ResourceKind::ConsoleLink,
            ManagedResource::ImageTag(_) => ResourceKind::ImageTag,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        each_variant!(self, r => &r.metadata)
    }

    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        each_variant!(self, r => &mut r.metadata)
    }

    pub fn name(&self) -> String {
        self.metadata().name.clone().unwrap_or_default()
    }

    pub fn namespace(&self) -> String {
        self.metadata().namespace.clone().unwrap_or_default()
    }

    pub fn id(&self) -> ResourceId {
        ResourceId::new(self.kind(), self.namespace(), self.name())
    }

    /// Cluster-scoped kinds are exempt from namespace stamping
    pub fn is_namespaced(&self) -> bool {
        !matches!(self, ManagedResource::ConsoleLink(_))
    }

    pub fn set_namespace(&mut self, namespace: &str) {
        self.metadata_mut().namespace = Some(namespace.to_string());
    }

    /// Whether this resource records the given CR UID as an owner
    pub fn is_owned_by(&self, uid: &str) -> bool {
        self.metadata()
            .owner_references
            .as_ref()
            .map(|refs| refs.iter().any(|r| r.uid == uid))
            .unwrap_or(false)
    }

    pub fn set_owner(&mut self, owner: OwnerReference) {
        self.metadata_mut().owner_references = Some(vec![owner]);
    }
}

/// Controller owner reference recorded on every created resource
pub fn owner_reference(app: &AppSuite) -> OwnerReference {
    OwnerReference {
        api_version: AppSuite::api_version(&()).to_string(),
        kind: AppSuite::kind(&()).to_string(),
        name: app.metadata.name.clone().unwrap_or_default(),
        uid: app.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Kind-indexed collection of managed resources, built once for the
/// requested and once for the deployed state per pass
#[derive(Clone, Debug, Default)]
pub struct ResourceSet {
    by_kind: BTreeMap<ResourceKind, Vec<ManagedResource>>,
}

impl ResourceSet {
    pub fn push(&mut self, resource: ManagedResource) {
        self.by_kind.entry(resource.kind()).or_default().push(resource);
    }

    pub fn get(&self, kind: ResourceKind) -> &[ManagedResource] {
        self.by_kind.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn kinds(&self) -> impl Iterator<Item = ResourceKind> + '_ {
        self.by_kind.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ManagedResource> {
        self.by_kind.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.by_kind.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<ManagedResource> for ResourceSet {
    fn from_iter<I: IntoIterator<Item = ManagedResource>>(iter: I) -> Self {
        let mut set = ResourceSet::default();
        for resource in iter {
            set.push(resource);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_links_are_cluster_scoped() {
        let link = ManagedResource::ConsoleLink(ConsoleLink::default());
        assert!(!link.is_namespaced());
        let route = ManagedResource::Route(Route::default());
        assert!(route.is_namespaced());
    }

    #[test]
    fn resource_set_groups_by_kind() {
        let mut set = ResourceSet::default();
        for name in ["a", "b"] {
            let mut route = Route::default();
            route.metadata.name = Some(name.to_string());
            set.push(ManagedResource::Route(route));
        }
        set.push(ManagedResource::Secret(Secret::default()));
        assert_eq!(set.get(ResourceKind::Route).len(), 2);
        assert_eq!(set.get(ResourceKind::Secret).len(), 1);
        assert_eq!(set.len(), 3);
        assert!(set.get(ResourceKind::Workload).is_empty());
    }

    #[test]
    fn ownership_is_matched_by_uid() {
        let mut secret = Secret::default();
        secret.metadata.owner_references = Some(vec![OwnerReference {
            uid: "uid-1".to_string(),
            ..Default::default()
        }]);
        let resource = ManagedResource::Secret(secret);
        assert!(resource.is_owned_by("uid-1"));
        assert!(!resource.is_owned_by("uid-2"));
    }
}

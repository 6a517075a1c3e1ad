//! Store boundary
//!
//! The core never talks to the cluster API directly; every round-trip goes
//! through the [`Store`] trait. All calls are namespace- and owner-scoped
//! where applicable, and every call is a suspension point of the pass.
//!
//! [`MemoryStore`] is the in-process implementation backing unit tests and
//! the `simulate` subcommand.

use std::collections::BTreeMap;

use async_trait::async_trait;
use kube::Resource;
use tokio::sync::Mutex;

use crate::crd::{AppSuite, AppSuiteStatus};
use crate::error::{Error, Result};
use crate::resources::{ManagedResource, ResourceId, ResourceKind};

/// Owner scope for list calls. Matching prefers the CR UID; once the CR
/// is deleted only its name survives, and ownership is then matched
/// through the owner-reference kind and name.
#[derive(Clone, Debug, Default)]
pub struct OwnerSelector {
    pub uid: String,
    pub name: String,
}

impl OwnerSelector {
    pub fn of(app: &AppSuite) -> Self {
        Self {
            uid: app.metadata.uid.clone().unwrap_or_default(),
            name: app.metadata.name.clone().unwrap_or_default(),
        }
    }

    /// Selector for a CR that no longer exists
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            uid: String::new(),
            name: name.into(),
        }
    }

    pub fn matches(&self, resource: &ManagedResource) -> bool {
        if !self.uid.is_empty() {
            return resource.is_owned_by(&self.uid);
        }
        resource
            .metadata()
            .owner_references
            .as_ref()
            .map(|refs| {
                refs.iter()
                    .any(|r| r.kind == AppSuite::kind(&()) && r.name == self.name)
            })
            .unwrap_or(false)
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch one resource by identity; `Ok(None)` on NotFound
    async fn get(&self, id: &ResourceId) -> Result<Option<ManagedResource>>;

    /// List resources of one kind in a namespace, owned by the selected CR
    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        owner: &OwnerSelector,
    ) -> Result<Vec<ManagedResource>>;

    async fn create(&self, resource: ManagedResource) -> Result<()>;

    async fn update(&self, resource: ManagedResource) -> Result<()>;

    async fn delete(&self, id: &ResourceId) -> Result<()>;

    /// CR boundary: fetch the live CR
    async fn get_app(&self, namespace: &str, name: &str) -> Result<Option<AppSuite>>;

    /// CR boundary: fetch the last-cached CR snapshot used for the
    /// optimistic-concurrency status write
    async fn get_app_cached(&self, namespace: &str, name: &str) -> Result<Option<AppSuite>>;

    /// CR boundary: write the status subresource; the spec is never mutated
    async fn update_app_status(&self, app: &AppSuite) -> Result<()>;
}

#[derive(Default)]
struct MemoryState {
    resources: BTreeMap<ResourceId, ManagedResource>,
    app: Option<AppSuite>,
    cached_app: Option<AppSuite>,
    next_version: u64,
}

/// In-memory store for tests and dry-run simulation
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with a CR; the cached snapshot starts identical
    pub async fn put_app(&self, mut app: AppSuite) {
        let mut state = self.state.lock().await;
        state.next_version += 1;
        app.metadata.resource_version = Some(state.next_version.to_string());
        state.cached_app = Some(app.clone());
        state.app = Some(app);
    }

    /// Seed a deployed resource without going through `create`
    pub async fn seed(&self, resource: ManagedResource) {
        let mut state = self.state.lock().await;
        state.resources.insert(resource.id(), resource);
    }

    /// Emulate the platform assigning a hostname to an admitted route
    pub async fn assign_route_host(&self, namespace: &str, name: &str, host: &str) {
        let mut state = self.state.lock().await;
        let id = ResourceId::new(ResourceKind::Route, namespace, name);
        if let Some(ManagedResource::Route(route)) = state.resources.get_mut(&id) {
            route.spec.host = host.to_string();
        }
    }

    /// Emulate a concurrent external writer bumping the live CR version,
    /// leaving the cached snapshot behind
    pub async fn bump_app_version(&self) {
        let mut state = self.state.lock().await;
        state.next_version += 1;
        let version = state.next_version.to_string();
        if let Some(app) = state.app.as_mut() {
            app.metadata.resource_version = Some(version);
        }
    }

    pub async fn contains(&self, id: &ResourceId) -> bool {
        self.state.lock().await.resources.contains_key(id)
    }

    pub async fn all_of_kind(&self, kind: ResourceKind) -> Vec<ManagedResource> {
        self.state
            .lock()
            .await
            .resources
            .values()
            .filter(|r| r.kind() == kind)
            .cloned()
            .collect()
    }

    /// Status of the stored CR, as last written
    pub async fn app_status(&self) -> Option<AppSuiteStatus> {
        self.state.lock().await.app.as_ref().and_then(|a| a.status.clone())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, id: &ResourceId) -> Result<Option<ManagedResource>> {
        Ok(self.state.lock().await.resources.get(id).cloned())
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        owner: &OwnerSelector,
    ) -> Result<Vec<ManagedResource>> {
        Ok(self
            .state
            .lock()
            .await
            .resources
            .values()
            .filter(|r| r.kind() == kind && r.namespace() == namespace && owner.matches(r))
            .cloned()
            .collect())
    }

    async fn create(&self, mut resource: ManagedResource) -> Result<()> {
        let mut state = self.state.lock().await;
        let id = resource.id();
        if state.resources.contains_key(&id) {
            return Err(Error::AlreadyExists(id));
        }
        state.next_version += 1;
        resource.metadata_mut().resource_version = Some(state.next_version.to_string());
        state.resources.insert(id, resource);
        Ok(())
    }

    async fn update(&self, mut resource: ManagedResource) -> Result<()> {
        let mut state = self.state.lock().await;
        let id = resource.id();
        let existing = state
            .resources
            .get(&id)
            .ok_or_else(|| Error::NotFound(id.clone()))?;
        if resource.metadata().resource_version != existing.metadata().resource_version {
            return Err(Error::Conflict(id));
        }
        state.next_version += 1;
        resource.metadata_mut().resource_version = Some(state.next_version.to_string());
        state.resources.insert(id, resource);
        Ok(())
    }

    async fn delete(&self, id: &ResourceId) -> Result<()> {
        self.state.lock().await.resources.remove(id);
        Ok(())
    }

    async fn get_app(&self, _namespace: &str, name: &str) -> Result<Option<AppSuite>> {
        let state = self.state.lock().await;
        Ok(state
            .app
            .clone()
            .filter(|a| a.metadata.name.as_deref() == Some(name)))
    }

    async fn get_app_cached(&self, _namespace: &str, name: &str) -> Result<Option<AppSuite>> {
        let state = self.state.lock().await;
        Ok(state
            .cached_app
            .clone()
            .filter(|a| a.metadata.name.as_deref() == Some(name)))
    }

    async fn update_app_status(&self, app: &AppSuite) -> Result<()> {
        let mut state = self.state.lock().await;
        let stored_version = state
            .app
            .as_ref()
            .and_then(|a| a.metadata.resource_version.clone());
        if app.metadata.resource_version != stored_version {
            return Err(Error::StaleStatus {
                namespace: app.metadata.namespace.clone().unwrap_or_default(),
                name: app.metadata.name.clone().unwrap_or_default(),
            });
        }
        state.next_version += 1;
        let version = state.next_version.to_string();
        if let Some(stored) = state.app.as_mut() {
            stored.status = app.status.clone();
            stored.metadata.resource_version = Some(version.clone());
        }
        if let Some(cached) = state.cached_app.as_mut() {
            cached.status = app.status.clone();
            cached.metadata.resource_version = Some(version);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Route;

    fn route(name: &str) -> ManagedResource {
        let mut route = Route::default();
        route.metadata.name = Some(name.to_string());
        route.metadata.namespace = Some("demo".to_string());
        ManagedResource::Route(route)
    }

    #[tokio::test]
    async fn create_rejects_duplicates() {
        let store = MemoryStore::new();
        store.create(route("console")).await.unwrap();
        let err = store.create(route("console")).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn update_detects_stale_versions() {
        let store = MemoryStore::new();
        store.create(route("console")).await.unwrap();
        // An update with no version token is stale by definition
        let err = store.update(route("console")).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        let id = ResourceId::new(ResourceKind::Route, "demo", "console");
        let current = store.get(&id).await.unwrap().expect("stored route");
        store.update(current).await.unwrap();
    }
}

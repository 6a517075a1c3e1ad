//! Differ/Applier
//!
//! Pairs deployed and requested resources by identity within each kind,
//! partitions them into added/updated/removed through the comparator, and
//! applies the delta through the store. Creation precedes deletion so a
//! resource replaced under a new identity never goes dark in between.

use std::collections::BTreeSet;

use tracing::debug;

use crate::crd::AppSuite;
use crate::error::Result;
use crate::resources::compare::equivalent;
use crate::resources::{owner_reference, ManagedResource, ResourceKind, ResourceSet};
use crate::store::Store;

/// Per-kind partition of the requested/deployed pairing
#[derive(Clone, Debug, Default)]
pub struct ResourceDelta {
    pub added: Vec<ManagedResource>,
    pub updated: Vec<ManagedResource>,
    pub removed: Vec<ManagedResource>,
}

impl ResourceDelta {
    pub fn has_changes(&self) -> bool {
        !(self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty())
    }
}

/// Partition one kind's resources. Unmatched deployed entries are removed,
/// unmatched requested entries are added, matched-but-unequal pairs are
/// updated.
pub fn partition(deployed: &[ManagedResource], requested: &[ManagedResource]) -> ResourceDelta {
    let mut delta = ResourceDelta::default();
    for req in requested {
        match deployed.iter().find(|dep| dep.id() == req.id()) {
            None => delta.added.push(req.clone()),
            Some(dep) if !equivalent(dep, req) => delta.updated.push(req.clone()),
            Some(_) => {}
        }
    }
    for dep in deployed {
        if !requested.iter().any(|req| req.id() == dep.id()) {
            delta.removed.push(dep.clone());
        }
    }
    delta
}

/// Apply the full delta between the deployed and requested sets. Returns
/// whether any mutation was performed; the first store failure aborts the
/// pass.
pub async fn apply(
    store: &dyn Store,
    app: &AppSuite,
    deployed: &ResourceSet,
    requested: &ResourceSet,
) -> Result<bool> {
    let kinds: BTreeSet<ResourceKind> = deployed.kinds().chain(requested.kinds()).collect();
    let mut has_changes = false;
    for kind in kinds {
        let deployed_of_kind = deployed.get(kind);
        let delta = partition(deployed_of_kind, requested.get(kind));
        if !delta.has_changes() {
            continue;
        }
        debug!(
            kind = %kind,
            added = delta.added.len(),
            updated = delta.updated.len(),
            removed = delta.removed.len(),
            "applying resource delta"
        );
        for mut resource in delta.added {
            resource.set_owner(owner_reference(app));
            store.create(resource).await?;
            has_changes = true;
        }
        for mut resource in delta.updated {
            if let Some(existing) = deployed_of_kind.iter().find(|d| d.id() == resource.id()) {
                let meta = resource.metadata_mut();
                meta.resource_version = existing.metadata().resource_version.clone();
                meta.owner_references = existing.metadata().owner_references.clone();
            }
            store.update(resource).await?;
            has_changes = true;
        }
        for resource in delta.removed {
            store.delete(&resource.id()).await?;
            has_changes = true;
        }
    }
    Ok(has_changes)
}

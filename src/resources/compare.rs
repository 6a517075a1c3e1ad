//! Resource Comparator
//!
//! Registry mapping each resource kind to its equivalence predicate. The
//! default is structural equality over a scrubbed copy (server-populated
//! metadata and status stripped). Kind-specific overrides additionally
//! mask fields the platform mutates out-of-band so they never cause
//! spurious updates.

use tracing::debug;

use crate::resources::{ManagedResource, ResourceKind};

/// Equivalence predicate for one kind
pub type EquivalenceFn = fn(&ManagedResource, &ManagedResource) -> bool;

/// Look up the predicate registered for a kind
pub fn comparator_for(kind: ResourceKind) -> EquivalenceFn {
    match kind {
        ResourceKind::Workload => workload_equivalent,
        ResourceKind::BuildConfig => build_config_equivalent,
        ResourceKind::ConfigMap => config_map_equivalent,
        ResourceKind::Route => route_equivalent,
        _ => default_equivalent,
    }
}

/// `true` when the deployed resource needs no update to match the request
pub fn equivalent(deployed: &ManagedResource, requested: &ManagedResource) -> bool {
    comparator_for(requested.kind())(deployed, requested)
}

fn default_equivalent(deployed: &ManagedResource, requested: &ManagedResource) -> bool {
    scrub(deployed) == scrub(requested)
}

/// Strip server-populated fields before structural comparison
fn scrub(resource: &ManagedResource) -> ManagedResource {
    let mut scrubbed = resource.clone();
    {
        let meta = scrubbed.metadata_mut();
        meta.resource_version = None;
        meta.uid = None;
        meta.generation = None;
        meta.creation_timestamp = None;
        meta.managed_fields = None;
        meta.owner_references = None;
        meta.finalizers = None;
    }
    if let ManagedResource::Workload(dc) = &mut scrubbed {
        dc.status = None;
    }
    scrubbed
}

/// Image-change triggers with an empty requested source namespace mean
/// "resolve at runtime"; the deployed value is filled in by the image
/// resolver and is not drift.
fn workload_equivalent(deployed: &ManagedResource, requested: &ManagedResource) -> bool {
    let (ManagedResource::Workload(deployed_dc), ManagedResource::Workload(requested_dc)) =
        (deployed, requested)
    else {
        return false;
    };
    let mut masked = deployed_dc.clone();
    for (index, trigger) in masked.spec.triggers.iter_mut().enumerate() {
        let Some(requested_trigger) = requested_dc.spec.triggers.get(index) else {
            return false;
        };
        if let (Some(params), Some(requested_params)) = (
            trigger.image_change_params.as_mut(),
            requested_trigger.image_change_params.as_ref(),
        ) {
            if requested_params.from.namespace.is_empty() {
                params.from.namespace = String::new();
            }
        }
    }
    default_equivalent(&ManagedResource::Workload(masked), requested)
}

/// The source-strategy namespace is resolved dynamically, and the platform
/// auto-generates webhook triggers when none are declared.
fn build_config_equivalent(deployed: &ManagedResource, requested: &ManagedResource) -> bool {
    let (ManagedResource::BuildConfig(deployed_bc), ManagedResource::BuildConfig(requested_bc)) =
        (deployed, requested)
    else {
        return false;
    };
    let mut masked = deployed_bc.clone();
    if let Some(strategy) = masked.spec.strategy.source_strategy.as_mut() {
        if let Some(requested_strategy) = requested_bc.spec.strategy.source_strategy.as_ref() {
            strategy.from.namespace = requested_strategy.from.namespace.clone();
        }
    }
    if !masked.spec.triggers.is_empty() && requested_bc.spec.triggers.is_empty() {
        masked.spec.triggers = requested_bc.spec.triggers.clone();
    }
    default_equivalent(&ManagedResource::BuildConfig(masked), requested)
}

/// Label marking a config map whose data is injected by the platform
pub const CA_BUNDLE_INJECT_LABEL: &str = "config.openshift.io/inject-trusted-cabundle";

/// Meta is always compared; data only when the platform does not inject it
fn config_map_equivalent(deployed: &ManagedResource, requested: &ManagedResource) -> bool {
    let (ManagedResource::ConfigMap(deployed_cm), ManagedResource::ConfigMap(requested_cm)) =
        (deployed, requested)
    else {
        return false;
    };
    let mut equal = deployed_cm.metadata.name == requested_cm.metadata.name
        && deployed_cm.metadata.namespace == requested_cm.metadata.namespace
        && deployed_cm.metadata.labels == requested_cm.metadata.labels
        && deployed_cm.metadata.annotations == requested_cm.metadata.annotations;
    let ca_injected = deployed_cm
        .metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(CA_BUNDLE_INJECT_LABEL))
        .map(|v| v == "true")
        .unwrap_or(false);
    if equal && !ca_injected {
        equal = deployed_cm.data == requested_cm.data
            && deployed_cm.binary_data == requested_cm.binary_data;
    }
    if !equal {
        debug!(
            kind = %ResourceKind::ConfigMap,
            name = %requested.name(),
            namespace = %requested.namespace(),
            deployed = ?deployed_cm,
            requested = ?requested_cm,
            "resources are not equal"
        );
    }
    equal
}

/// An empty requested host means the platform assigns it on admission
fn route_equivalent(deployed: &ManagedResource, requested: &ManagedResource) -> bool {
    let (ManagedResource::Route(deployed_route), ManagedResource::Route(requested_route)) =
        (deployed, requested)
    else {
        return false;
    };
    let mut masked = deployed_route.clone();
    if requested_route.spec.host.is_empty() {
        masked.spec.host = String::new();
    }
    default_equivalent(&ManagedResource::Route(masked), requested)
}

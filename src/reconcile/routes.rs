//! Route Phase Controller
//!
//! Route hostnames are assigned by the platform asynchronously after
//! creation, and TLS credential CNs must match the eventual hostname. The
//! early pass therefore applies routes only (Added-only semantics) and
//! reports an explicit resumable state: either the pass must requeue and
//! wait for hostnames, or every requested route already exists and full
//! reconciliation can proceed.

use std::time::Duration;

use tracing::debug;

use crate::config::SETTLE_DELAY;
use crate::crd::AppSuite;
use crate::error::Result;
use crate::platform::Route;
use crate::resolver::Environment;
use crate::resources::{diff, flatten, owner_reference, ManagedResource, ResourceKind};
use crate::store::{OwnerSelector, Store};

/// Outcome of the routes-only pre-pass
#[derive(Debug)]
pub enum RoutePhase {
    /// Routes were just created; hostnames are not assigned yet
    AwaitingHostnames { requeue_after: Duration },
    /// Every requested route exists; hostnames are available
    Ready { deployed: Vec<ManagedResource> },
}

/// Apply the routes subset of the desired state. Existing routes are left
/// alone at this phase; only missing ones are created.
pub async fn ensure_routes(
    store: &dyn Store,
    app: &AppSuite,
    env: &Environment,
) -> Result<RoutePhase> {
    let namespace = app.metadata.namespace.clone().unwrap_or_default();

    let requested = flatten::flatten_routes(env, &namespace);
    let deployed = store
        .list(ResourceKind::Route, &namespace, &OwnerSelector::of(app))
        .await?;

    let delta = diff::partition(&deployed, &requested);
    if delta.added.is_empty() {
        return Ok(RoutePhase::Ready { deployed });
    }

    debug!(count = delta.added.len(), "creating routes that were not found");
    for mut route in delta.added {
        route.set_owner(owner_reference(app));
        store.create(route).await?;
    }
    Ok(RoutePhase::AwaitingHostnames {
        requeue_after: SETTLE_DELAY,
    })
}

/// Hostname of the given requested route, as assigned on the deployed side
pub fn deployed_host(route: &Route, deployed: &[ManagedResource]) -> String {
    let name = route.metadata.name.clone().unwrap_or_default();
    deployed
        .iter()
        .find_map(|candidate| match candidate {
            ManagedResource::Route(r)
                if r.metadata.name.as_deref() == Some(name.as_str()) =>
            {
                Some(r.spec.host.clone())
            }
            _ => None,
        })
        .unwrap_or_default()
}

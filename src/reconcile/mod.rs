//! Reconciliation pipeline
//!
//! One pass walks fetch, resolve, route pre-pass, credential provisioning,
//! image resolution, diff/apply and status derivation in order. Each phase
//! lives in its own module; [`Reconciler`] is the orchestrator.

use std::time::Duration;

pub mod credentials;
pub mod images;
mod reconciler;
pub mod routes;
pub mod status;

pub use reconciler::Reconciler;

/// What one pass tells its caller
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Whether any cluster mutation was performed
    pub has_changes: bool,
    /// Requested redelivery delay; `Some(ZERO)` asks for immediate
    /// redelivery under the caller's own backoff
    pub requeue_after: Option<Duration>,
}

impl ReconcileOutcome {
    /// Mutations were applied; the pass wants to observe convergence
    pub fn changed() -> Self {
        Self {
            has_changes: true,
            requeue_after: None,
        }
    }

    /// Nothing to do; deployed state matches the request
    pub fn settled() -> Self {
        Self {
            has_changes: false,
            requeue_after: None,
        }
    }

    /// Mutations were applied and the pass must resume after a delay
    pub fn changed_after(delay: Duration) -> Self {
        Self {
            has_changes: true,
            requeue_after: Some(delay),
        }
    }

    pub fn requeue_now(mut self) -> Self {
        self.requeue_after = Some(Duration::ZERO);
        self
    }
}

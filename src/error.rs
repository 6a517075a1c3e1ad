//! Central error types for the AppSuite operator core
//!
//! Uses `thiserror` for ergonomic, type-safe error handling. Every error
//! carries a [`Reason`] classification that the status state machine and
//! the surrounding worker pool use to decide how a failed pass surfaces.

use thiserror::Error;

use crate::resources::ResourceId;

/// Central error type for the reconciliation core
#[derive(Error, Debug)]
pub enum Error {
    /// The store could not find the requested object
    #[error("resource not found: {0}")]
    NotFound(ResourceId),

    /// Create raced with a concurrent writer
    #[error("resource already exists: {0}")]
    AlreadyExists(ResourceId),

    /// Update raced with a concurrent writer (stale version token)
    #[error("conflict writing {0}: stale resource version")]
    Conflict(ResourceId),

    /// The CR status write raced with a concurrent writer
    #[error("conflict writing status of {namespace}/{name}")]
    StaleStatus { namespace: String, name: String },

    /// Desired-state resolution failed; terminal for this pass
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An externally referenced object the CR points to does not exist
    #[error("missing dependency: {kind} {namespace}/{name}")]
    MissingDependency {
        kind: String,
        namespace: String,
        name: String,
    },

    /// Credential material could not be generated or validated
    #[error("credential error: {0}")]
    Credential(String),

    /// Store call failed for reasons other than NotFound/Conflict
    #[error("store error: {0}")]
    Store(String),

    /// The externally supplied cancellation signal fired mid-pass
    #[error("reconcile pass cancelled")]
    Cancelled,

    /// JSON serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for core operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Error taxonomy used by the status state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reason {
    /// Benign: signals "create" or "nothing to clean up"
    NotFound,
    /// Benign: triggers a requeue, never a forced overwrite
    Conflict,
    /// Surfaced in status, retried at the standard external backoff
    ConfigurationError,
    /// Surfaced in status, retried on redelivery
    MissingDependency,
    /// Propagated to the caller for backoff-retry
    Transient,
    /// Fallback classification
    Unknown,
}

impl Error {
    /// Classify this error for status reporting and requeue decisions
    pub fn reason(&self) -> Reason {
        match self {
            Error::NotFound(_) => Reason::NotFound,
            Error::AlreadyExists(_) | Error::Conflict(_) | Error::StaleStatus { .. } => {
                Reason::Conflict
            }
            Error::Configuration(_) => Reason::ConfigurationError,
            Error::MissingDependency { .. } => Reason::MissingDependency,
            Error::Store(_) | Error::Cancelled => Reason::Transient,
            Error::Credential(_) | Error::Serialization(_) => Reason::Unknown,
        }
    }

    /// True for errors the caller should retry with its own backoff
    pub fn is_retriable(&self) -> bool {
        matches!(self.reason(), Reason::Conflict | Reason::Transient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::ResourceKind;

    #[test]
    fn classification_follows_taxonomy() {
        let id = ResourceId::new(ResourceKind::Secret, "ns", "app-keystore");
        assert_eq!(Error::NotFound(id.clone()).reason(), Reason::NotFound);
        assert_eq!(Error::Conflict(id).reason(), Reason::Conflict);
        assert_eq!(
            Error::Configuration("bad env".into()).reason(),
            Reason::ConfigurationError
        );
        assert_eq!(
            Error::MissingDependency {
                kind: "ConfigMap".into(),
                namespace: "ns".into(),
                name: "git-hooks".into(),
            }
            .reason(),
            Reason::MissingDependency
        );
        assert!(Error::Store("i/o".into()).is_retriable());
        assert!(!Error::Configuration("bad env".into()).is_retriable());
    }
}

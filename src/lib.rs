//! AppSuite Operator: reconciliation core for composite application suites
//!
//! This crate reconciles an [`crd::AppSuite`] custom resource against the
//! cluster: it resolves the declared environment into concrete objects,
//! provisions TLS credentials bound to route hostnames, resolves image
//! references, and applies the minimal delta between deployed and
//! requested state.

pub mod config;
pub mod crd;
pub mod error;
pub mod platform;
pub mod reconcile;
pub mod resolver;
pub mod resources;
pub mod store;

pub use crate::error::{Error, Result};

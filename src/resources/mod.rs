//! Typed resource model, comparison and diffing
//!
//! Everything between "a resolved environment" and "store mutations":
//! flattening, deployed-state loading, equivalence and delta application.

pub mod compare;
pub mod deployed;
pub mod diff;
pub mod flatten;
mod managed;

pub use managed::{owner_reference, ManagedResource, ResourceId, ResourceKind, ResourceSet};

//! Custom Resource Definitions for the AppSuite operator

mod app_suite;
pub mod types;

pub use app_suite::{AppSuite, AppSuiteSpec, AppSuiteStatus, Phase};
pub use types::*;

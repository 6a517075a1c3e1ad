//! Read-only configuration consumed by the reconciliation core
//!
//! These inputs are owned by the surrounding process (flags/env), not by
//! the core; see `main.rs` for how they are populated.

use std::time::Duration;

use semver::Version;

/// Default image registry used when the CR does not configure one
pub const DEFAULT_REGISTRY: &str = "registry.redhat.io";

/// Minimum platform version that supports dashboard console links
pub const MIN_CONSOLE_LINK_VERSION: Version = Version::new(4, 2, 0);

/// Fixed delay for known async-settling conditions (route hostnames,
/// CA bundle materialization)
pub const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Read-only configuration for one reconciler instance
#[derive(Clone, Debug)]
pub struct CoreConfig {
    /// Registry used when neither the CR nor an image rule picks one
    pub default_registry: String,
    /// Mark created image tags for insecure registry access
    pub insecure_registry: bool,
    /// Password protecting generated keystore secrets
    pub keystore_password: String,
    /// Platform version, when known; `None` is treated as "supports
    /// everything"
    pub platform_version: Option<Version>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            default_registry: DEFAULT_REGISTRY.to_string(),
            insecure_registry: false,
            keystore_password: "changeit".to_string(),
            platform_version: None,
        }
    }
}

impl CoreConfig {
    /// Whether the platform supports the cosmetic console-link resource.
    /// Absence of version information is treated as supported.
    pub fn supports_console_links(&self) -> bool {
        match &self.platform_version {
            Some(version) => *version >= MIN_CONSOLE_LINK_VERSION,
            None => true,
        }
    }
}

//! AppSuite Custom Resource Definition
//!
//! An AppSuite describes one composite application deployment: a console,
//! a number of execution servers, an optional routing layer and dashboard,
//! plus their backing databases. The operator owns every resource it
//! creates for the CR and drives the cluster toward the declared state.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{
    AuthConfig, CommonConfig, ComponentSpecs, Condition, DeploymentsSummary, RegistrySettings,
};

#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "apps.appsuite.dev",
    version = "v1alpha1",
    kind = "AppSuite",
    namespaced,
    status = "AppSuiteStatus",
    shortname = "asu",
    printcolumn = r#"{"name":"Environment","type":"string","jsonPath":".spec.environment"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AppSuiteSpec {
    /// Named environment profile handed to the desired-state resolver
    pub environment: String,

    /// Product version, e.g. "7.11.0"; drives registry context derivation
    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub common: CommonConfig,

    #[serde(default)]
    pub objects: ComponentSpecs,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_registry: Option<RegistrySettings>,

    /// Resolve images through tags rather than digests
    #[serde(default)]
    pub use_image_tags: bool,

    /// Mark created tags for scheduled re-import (only honored together
    /// with `useImageTags`)
    #[serde(default)]
    pub scheduled_import_policy: bool,
}

/// Status phase, derived per pass rather than stored incrementally
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum Phase {
    #[default]
    Unknown,
    ConfigurationError,
    MissingDependency,
    Provisioning,
    Deployed,
    Failed,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppSuiteStatus {
    #[serde(default)]
    pub phase: Phase,

    /// Snapshot of the resolved spec, immutable once computed for a pass
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied: Option<AppSuiteSpec>,

    /// Externally reachable console address, once a route hostname is known
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub console_host: String,

    #[serde(default)]
    pub deployments: DeploymentsSummary,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl AppSuite {
    /// The resolved spec parameters for the current pass. Reads fall back
    /// to the live spec until a resolution has been recorded.
    pub fn applied(&self) -> &AppSuiteSpec {
        self.status
            .as_ref()
            .and_then(|s| s.applied.as_ref())
            .unwrap_or(&self.spec)
    }

    /// Application base name, defaulting to the CR name
    pub fn application_name(&self) -> String {
        let applied = self.applied();
        if applied.common.application_name.is_empty() {
            self.metadata.name.clone().unwrap_or_default()
        } else {
            applied.common.application_name.clone()
        }
    }

    /// Deployment name for the server set at `index`
    pub fn server_deployment_name(&self, index: usize) -> String {
        let applied = self.applied();
        if let Some(server) = applied.objects.servers.get(index) {
            if !server.name.is_empty() {
                return server.name.clone();
            }
        }
        if index == 0 {
            format!("{}-server", self.application_name())
        } else {
            format!("{}-server-{}", self.application_name(), index + 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::types::ServerSpec;
    use kube::api::ObjectMeta;

    fn suite(name: &str) -> AppSuite {
        AppSuite {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("demo".to_string()),
                ..Default::default()
            },
            spec: AppSuiteSpec {
                environment: "production".to_string(),
                ..Default::default()
            },
            status: None,
        }
    }

    #[test]
    fn application_name_defaults_to_cr_name() {
        assert_eq!(suite("myapp").application_name(), "myapp");
    }

    #[test]
    fn server_deployment_names_are_indexed() {
        let mut app = suite("myapp");
        assert_eq!(app.server_deployment_name(0), "myapp-server");
        assert_eq!(app.server_deployment_name(1), "myapp-server-2");

        app.spec.objects.servers = vec![ServerSpec {
            name: "orders-server".to_string(),
            ..Default::default()
        }];
        assert_eq!(app.server_deployment_name(0), "orders-server");
    }

    #[test]
    fn applied_prefers_status_snapshot() {
        let mut app = suite("myapp");
        let mut snapshot = app.spec.clone();
        snapshot.common.application_name = "resolved".to_string();
        app.status = Some(AppSuiteStatus {
            applied: Some(snapshot),
            ..Default::default()
        });
        assert_eq!(app.application_name(), "resolved");
    }
}

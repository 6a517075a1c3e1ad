//! Shared configuration types embedded in the AppSuite spec and status

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Settings shared by every component of the suite
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommonConfig {
    /// Base name stamped on generated resources and used as the CN
    /// fallback for plain (non-TLS) deployments
    pub application_name: String,

    /// Password protecting generated keystores; falls back to the
    /// operator-wide configured password when empty
    #[serde(default)]
    pub keystore_password: String,

    /// Skip keystore generation entirely
    #[serde(default)]
    pub disable_ssl: bool,

    /// Generate a truststore from the platform-injected CA bundle
    #[serde(default)]
    pub platform_ca: bool,
}

/// Per-component overrides for the resolved environment
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpecs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub console: Option<ConsoleSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub dashboard: Option<DashboardSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<ServerSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub router: Option<RouterSpec>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleSpec {
    /// User-provided keystore secret; empty means the operator generates one
    #[serde(default)]
    pub keystore_secret: String,

    /// Git hooks directory sourced from an external object
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_hooks: Option<GitHooksSpec>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSpec {
    #[serde(default)]
    pub keystore_secret: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServerSpec {
    /// Deployment name; defaults to `{applicationName}-server[-N]`
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub keystore_secret: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouterSpec {
    #[serde(default)]
    pub keystore_secret: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GitHooksSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<ObjRef>,
}

/// Authentication wiring; the role mapper may reference an external object
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_mapper: Option<RoleMapperConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoleMapperConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<ObjRef>,
}

/// Reference to an externally provided object in the CR namespace
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObjRef {
    pub kind: String,
    pub name: String,
}

/// Image registry settings for the suite
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySettings {
    /// Registry address; empty means the operator default
    #[serde(default)]
    pub registry: String,

    #[serde(default)]
    pub insecure: bool,
}

/// Per-workload availability summary derived from deployed state
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentsSummary {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ready: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub starting: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stopped: Vec<String>,
}

/// Status condition following Kubernetes API conventions
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    pub last_transition_time: String,
    pub reason: String,
    pub message: String,
}

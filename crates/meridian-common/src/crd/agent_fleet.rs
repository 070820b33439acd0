//! AgentFleet CRD
//!
//! One `AgentFleet` describes the gateway deployment for a cluster (the
//! capabilities it runs, how pods are scheduled) plus the agent-distribution
//! endpoint node-local binaries are fetched from.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{CapabilityProperties, ValueSource};

/// Gateway capabilities that can be enabled on an `AgentFleet`
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum CapabilityKind {
    /// Cluster API monitoring
    KubernetesMonitoring,
    /// Agent traffic routing
    Routing,
    /// Metrics ingest endpoint
    DataIngest,
}

impl std::fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KubernetesMonitoring => write!(f, "kubernetes-monitoring"),
            Self::Routing => write!(f, "routing"),
            Self::DataIngest => write!(f, "data-ingest"),
        }
    }
}

/// Gateway deployment settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveGateSpec {
    /// Capabilities merged into the gateway StatefulSet, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<CapabilityKind>,

    /// Secret holding the gateway's TLS server certificate
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tls_secret_name: String,

    /// Gateway image override
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,

    /// Properties shared by all capabilities
    #[serde(flatten)]
    pub properties: CapabilityProperties,
}

/// Deprecated single-capability gateway settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LegacyCapabilitySpec {
    /// Enables the capability
    #[serde(default)]
    pub enabled: bool,

    /// Service account used by the capability's pods
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_account_name: String,

    /// Capability properties
    #[serde(flatten)]
    pub properties: CapabilityProperties,
}

/// Desired state of an `AgentFleet`
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "meridian.dev",
    version = "v1",
    kind = "AgentFleet",
    plural = "agentfleets",
    shortname = "af",
    namespaced,
    status = "AgentFleetStatus",
    printcolumn = r#"{"name":"ApiUrl","type":"string","jsonPath":".spec.apiUrl"}"#,
    printcolumn = r#"{"name":"Gateway","type":"string","jsonPath":".status.activeGate.version"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AgentFleetSpec {
    /// Agent-distribution API URL (e.g., `https://tenant.example.com/api`)
    pub api_url: String,

    /// Secret with `apiToken` and `paasToken`; defaults to the resource name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tokens: String,

    /// Image pull secret; defaults to `{name}-pull-secret`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub custom_pull_secret: String,

    /// Proxy used by gateways and the distribution client
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ValueSource>,

    /// Network zone gateways register in
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub network_zone: String,

    /// Disable certificate validation against the distribution API
    #[serde(default)]
    pub skip_cert_check: bool,

    /// Merged gateway deployment
    #[serde(default)]
    pub active_gate: ActiveGateSpec,

    /// Deprecated: standalone Kubernetes monitoring gateway
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes_monitoring: Option<LegacyCapabilitySpec>,

    /// Deprecated: standalone routing gateway
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing: Option<LegacyCapabilitySpec>,
}

/// Observed gateway state
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveGateStatus {
    /// Gateway version currently rolled out
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
}

/// Connection details reported by the distribution API
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfoStatus {
    /// Tenant identifier
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tenant_uuid: String,
}

/// Status of an `AgentFleet`
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentFleetStatus {
    /// UID of the `kube-system` namespace, used as the cluster identity
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kube_system_uuid: String,

    /// Gateway status
    #[serde(default)]
    pub active_gate: ActiveGateStatus,

    /// Distribution API connection info
    #[serde(default)]
    pub connection_info: ConnectionInfoStatus,
}

impl AgentFleet {
    /// Whether the merged gateway deployment is requested
    pub fn active_gate_mode(&self) -> bool {
        !self.spec.active_gate.capabilities.is_empty()
    }

    /// Name of the tokens secret
    pub fn tokens(&self) -> String {
        if self.spec.tokens.is_empty() {
            self.name_any()
        } else {
            self.spec.tokens.clone()
        }
    }

    /// Name of the image pull secret
    pub fn pull_secret(&self) -> String {
        if self.spec.custom_pull_secret.is_empty() {
            format!("{}-pull-secret", self.name_any())
        } else {
            self.spec.custom_pull_secret.clone()
        }
    }

    /// Gateway image, derived from the API host unless overridden
    pub fn active_gate_image(&self) -> String {
        if !self.spec.active_gate.image.is_empty() {
            return self.spec.active_gate.image.clone();
        }
        format!("{}/linux/activegate:latest", api_host(&self.spec.api_url))
    }

    /// Cluster identity recorded in status
    pub fn kube_system_uuid(&self) -> &str {
        self.status
            .as_ref()
            .map(|s| s.kube_system_uuid.as_str())
            .unwrap_or_default()
    }

    /// Gateway version recorded in status
    pub fn active_gate_version(&self) -> &str {
        self.status
            .as_ref()
            .map(|s| s.active_gate.version.as_str())
            .unwrap_or_default()
    }
}

/// Host (and port) portion of an API URL
fn api_host(api_url: &str) -> &str {
    let without_scheme = api_url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(api_url);
    without_scheme
        .split('/')
        .next()
        .unwrap_or(without_scheme)
}

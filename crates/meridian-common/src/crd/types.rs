//! Shared CRD field types

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// =============================================================================
// Value sources
// =============================================================================

/// A value provided either inline or by reference to a secret
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ValueSource {
    /// Inline value
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,

    /// Name of a secret in the resource namespace holding the value
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value_from: String,
}

impl ValueSource {
    /// Returns true when neither an inline value nor a reference is set
    pub fn is_empty(&self) -> bool {
        self.value.is_empty() && self.value_from.is_empty()
    }

    /// Returns the referenced secret name, if the value is provided by reference
    pub fn reference(&self) -> Option<&str> {
        (!self.value_from.is_empty()).then_some(self.value_from.as_str())
    }
}

// =============================================================================
// Container Resource Requirements
// =============================================================================

/// Container resource limits and requests
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ResourceRequirements {
    /// Resource requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<ResourceQuantity>,

    /// Resource limits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<ResourceQuantity>,
}

/// Resource quantity for CPU and memory
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ResourceQuantity {
    /// CPU quantity (e.g., "100m", "1")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,

    /// Memory quantity (e.g., "128Mi", "1Gi")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

// =============================================================================
// Scheduling and environment
// =============================================================================

/// Pod toleration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Toleration {
    /// Taint key the toleration applies to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// `Exists` or `Equal`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    /// Taint value the toleration matches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Taint effect to match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,
}

/// Environment variable declared on a capability
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvVarSpec {
    /// Variable name
    pub name: String,
    /// Literal value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Secret key the value is read from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key_ref: Option<SecretKeyRef>,
}

/// Reference to a key inside a secret
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct SecretKeyRef {
    /// Secret name
    pub name: String,
    /// Key within the secret
    pub key: String,
}

// =============================================================================
// Capability properties
// =============================================================================

/// Properties shared by every gateway capability
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityProperties {
    /// Number of gateway pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Gateway group the pods register under
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group: String,

    /// Custom gateway properties, inline or by secret reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_properties: Option<ValueSource>,

    /// Resource requests and limits applied to every gateway container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    /// Node selector for gateway pods
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,

    /// Tolerations for gateway pods
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,

    /// Additional environment variables for gateway containers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVarSpec>,
}

impl CapabilityProperties {
    /// Custom properties, if any are declared
    pub fn declared_custom_properties(&self) -> Option<&ValueSource> {
        self.custom_properties.as_ref().filter(|cp| !cp.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_source_emptiness() {
        assert!(ValueSource::default().is_empty());
        let inline = ValueSource {
            value: "a=b".to_string(),
            ..Default::default()
        };
        assert!(!inline.is_empty());
        assert_eq!(inline.reference(), None);

        let by_ref = ValueSource {
            value_from: "props".to_string(),
            ..Default::default()
        };
        assert_eq!(by_ref.reference(), Some("props"));
    }

    #[test]
    fn empty_custom_properties_are_not_declared() {
        let props = CapabilityProperties {
            custom_properties: Some(ValueSource::default()),
            ..Default::default()
        };
        assert!(props.declared_custom_properties().is_none());
    }

    #[test]
    fn properties_deserialize_from_camel_case() {
        let props: CapabilityProperties = serde_json::from_value(serde_json::json!({
            "replicas": 2,
            "group": "edge",
            "customProperties": { "valueFrom": "cp-secret" },
            "nodeSelector": { "zone": "a" },
            "env": [{ "name": "FOO", "value": "bar" }]
        }))
        .expect("properties should deserialize");

        assert_eq!(props.replicas, Some(2));
        assert_eq!(props.group, "edge");
        assert_eq!(
            props.declared_custom_properties().and_then(|cp| cp.reference()),
            Some("cp-secret")
        );
        assert_eq!(props.env[0].value.as_deref(), Some("bar"));
    }
}

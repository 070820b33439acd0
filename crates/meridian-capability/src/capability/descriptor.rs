//! Capability descriptor: the unit the StatefulSet builder consumes

use meridian_common::crd::{CapabilityProperties, ValueSource};

use crate::k8s::{Container, Volume, VolumeMount};

/// Module name of the merged descriptor
pub const MULTI_MODULE: &str = "multi";

/// Per-module configuration flags
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Configuration {
    /// Publish the gateway as a DNS entry point
    pub set_dns_entry_point: bool,
    /// Expose the readiness port
    pub set_readiness_port: bool,
    /// Expose the communication port
    pub set_communication_port: bool,
    /// Create a network Service in front of the pods
    pub create_service: bool,
    /// Capability owning the service account and custom-properties secret
    pub service_account_owner: String,
}

impl Configuration {
    /// Fold another module's flags into this one.
    ///
    /// Flags OR together. The service-account owner is replaced by the
    /// other module's owner whenever that one is non-empty, so the last
    /// non-empty owner in capability order wins.
    pub fn merge(mut self, other: &Configuration) -> Self {
        self.set_dns_entry_point |= other.set_dns_entry_point;
        self.set_readiness_port |= other.set_readiness_port;
        self.set_communication_port |= other.set_communication_port;
        self.create_service |= other.create_service;
        if !other.service_account_owner.is_empty() {
            self.service_account_owner = other.service_account_owner.clone();
        }
        self
    }
}

/// Closed set of descriptor variants
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModuleVariant {
    /// Merged descriptor built from `activeGate.capabilities`
    Multi,
    /// Deprecated standalone Kubernetes monitoring gateway
    LegacyKubernetesMonitoring,
    /// Deprecated standalone routing gateway
    LegacyRouting,
}

impl ModuleVariant {
    /// Whether this is one of the deprecated single-capability variants
    pub fn is_legacy(&self) -> bool {
        !matches!(self, Self::Multi)
    }
}

/// A gateway capability ready to be turned into a StatefulSet.
///
/// Containers and init containers are fully built (image, resources, env,
/// mounts). `volumes` is the complete pod volume list.
#[derive(Clone, Debug, PartialEq)]
pub struct CapabilityDescriptor {
    /// Variant tag
    pub variant: ModuleVariant,
    /// Stable module identifier (`multi`, `kubemon`, `routing`, ...)
    pub module_name: String,
    /// Identifier sent to the gateway process
    pub capability_name: String,
    /// Whether a StatefulSet should exist for this descriptor
    pub enabled: bool,
    /// Configuration flags
    pub configuration: Configuration,
    /// Properties shared by every container in the descriptor
    pub properties: CapabilityProperties,
    /// Primary containers, in capability order
    pub containers: Vec<Container>,
    /// Init containers, in capability order
    pub init_containers: Vec<Container>,
    /// Volume mounts used by the primary containers, deduplicated by name
    pub volume_mounts: Vec<VolumeMount>,
    /// Pod volumes, deduplicated by name
    pub volumes: Vec<Volume>,
    /// Service account of deprecated variants; the merged form leaves it unset
    pub service_account_name: Option<String>,
}

impl CapabilityDescriptor {
    /// Descriptor for a capability that is switched off
    pub fn disabled(
        variant: ModuleVariant,
        module_name: impl Into<String>,
        properties: CapabilityProperties,
    ) -> Self {
        Self {
            variant,
            module_name: module_name.into(),
            capability_name: String::new(),
            enabled: false,
            configuration: Configuration::default(),
            properties,
            containers: Vec::new(),
            init_containers: Vec::new(),
            volume_mounts: Vec::new(),
            volumes: Vec::new(),
            service_account_name: None,
        }
    }

    /// StatefulSet name for this descriptor under the given instance
    pub fn workload_name(&self, instance_name: &str) -> String {
        format!("{}-{}", instance_name, self.module_name)
    }

    /// Declared custom properties, if any
    pub fn custom_properties(&self) -> Option<&ValueSource> {
        self.properties.declared_custom_properties()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(name: &str) -> Configuration {
        Configuration {
            service_account_owner: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn merge_ors_flags() {
        let routing = Configuration {
            set_dns_entry_point: true,
            set_readiness_port: true,
            set_communication_port: true,
            create_service: true,
            service_account_owner: String::new(),
        };
        let merged = Configuration::default().merge(&owner("a")).merge(&routing);
        assert!(merged.set_dns_entry_point);
        assert!(merged.set_readiness_port);
        assert!(merged.set_communication_port);
        assert!(merged.create_service);
        assert_eq!(merged.service_account_owner, "a");
    }

    #[test]
    fn merge_keeps_last_non_empty_owner() {
        let merged = Configuration::default()
            .merge(&owner("first"))
            .merge(&owner("second"))
            .merge(&owner(""));
        assert_eq!(merged.service_account_owner, "second");
    }

    #[test]
    fn workload_name_joins_instance_and_module() {
        let d = CapabilityDescriptor::disabled(
            ModuleVariant::Multi,
            MULTI_MODULE,
            CapabilityProperties::default(),
        );
        assert_eq!(d.workload_name("fleet"), "fleet-multi");
        assert!(!d.variant.is_legacy());
        assert!(ModuleVariant::LegacyRouting.is_legacy());
    }
}

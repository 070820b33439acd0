//! Base templates per capability and the registry they are injected through

use std::collections::BTreeMap;

use meridian_common::crd::CapabilityKind;

use super::descriptor::Configuration;
use crate::error::CapabilityError;
use crate::k8s::{Container, Volume, VolumeMount};

const TRUST_STORE_VOLUME: &str = "truststore-volume";
const CERT_CONVERTER_SCRIPT: &str = "/opt/meridian/gateway/k8scrt2jks.sh";
const GATEWAY_CACERTS_PATH: &str = "/opt/meridian/gateway/jre/lib/security/cacerts";
const GATEWAY_SSL_PATH: &str = "/var/lib/meridian/gateway/ssl";
const CLUSTER_TRUST_STORE_FILE: &str = "k8s-local.jks";
const GATEWAY_WORKING_DIR: &str = "/var/lib/meridian/gateway";
const CERTIFICATE_LOADER: &str = "certificate-loader";

/// Fixed parts of one capability.
///
/// Init containers are partial: image and resources are filled in when the
/// capability is instantiated for a fleet.
#[derive(Clone, Debug, PartialEq)]
pub struct CapabilityTemplate {
    /// Module name; also the primary container name
    pub module_name: String,
    /// Identifier sent to the gateway process
    pub capability_name: String,
    /// HTTPS port of the readiness endpoint
    pub readiness_port: u16,
    /// Configuration flags
    pub configuration: Configuration,
    /// Init containers
    pub init_containers: Vec<Container>,
    /// Mounts added to the primary container
    pub volume_mounts: Vec<VolumeMount>,
    /// Volumes the mounts refer to
    pub volumes: Vec<Volume>,
}

impl CapabilityTemplate {
    /// Kubernetes API monitoring.
    ///
    /// Loads the cluster CA into a truststore before the gateway starts.
    pub fn kubernetes_monitoring() -> Self {
        Self {
            module_name: "kubemon".to_string(),
            capability_name: "kubernetes_monitoring".to_string(),
            readiness_port: 9999,
            configuration: Configuration {
                service_account_owner: "kubernetes-monitoring".to_string(),
                ..Default::default()
            },
            init_containers: vec![Container {
                name: CERTIFICATE_LOADER.to_string(),
                image_pull_policy: Some("Always".to_string()),
                working_dir: Some(GATEWAY_WORKING_DIR.to_string()),
                command: Some(vec!["/bin/bash".to_string()]),
                args: Some(vec!["-c".to_string(), CERT_CONVERTER_SCRIPT.to_string()]),
                volume_mounts: vec![VolumeMount::new(
                    TRUST_STORE_VOLUME,
                    GATEWAY_SSL_PATH,
                    false,
                )],
                ..Default::default()
            }],
            volume_mounts: vec![VolumeMount::readonly_file(
                TRUST_STORE_VOLUME,
                GATEWAY_CACERTS_PATH,
                CLUSTER_TRUST_STORE_FILE,
            )],
            volumes: vec![Volume::from_empty_dir(TRUST_STORE_VOLUME)],
        }
    }

    /// Agent traffic routing
    pub fn routing() -> Self {
        Self::routable("routing", "MSGrouter", 9990)
    }

    /// Metrics ingest
    pub fn data_ingest() -> Self {
        Self::routable("data-ingest", "metrics_ingest", 9980)
    }

    fn routable(module_name: &str, capability_name: &str, readiness_port: u16) -> Self {
        Self {
            module_name: module_name.to_string(),
            capability_name: capability_name.to_string(),
            readiness_port,
            configuration: Configuration {
                set_dns_entry_point: true,
                set_readiness_port: true,
                set_communication_port: true,
                create_service: true,
                service_account_owner: String::new(),
            },
            init_containers: Vec::new(),
            volume_mounts: Vec::new(),
            volumes: Vec::new(),
        }
    }
}

/// Capability identifier to template mapping.
///
/// Passed explicitly to the composer; [`TemplateRegistry::default`] holds
/// the built-in templates.
#[derive(Clone, Debug)]
pub struct TemplateRegistry {
    templates: BTreeMap<CapabilityKind, CapabilityTemplate>,
}

impl TemplateRegistry {
    /// Registry with no templates
    pub fn empty() -> Self {
        Self {
            templates: BTreeMap::new(),
        }
    }

    /// Register (or replace) the template for a capability
    pub fn with_template(mut self, kind: CapabilityKind, template: CapabilityTemplate) -> Self {
        self.templates.insert(kind, template);
        self
    }

    /// Look up a capability's template
    pub fn get(&self, kind: CapabilityKind) -> Result<&CapabilityTemplate, CapabilityError> {
        self.templates
            .get(&kind)
            .ok_or_else(|| CapabilityError::unknown(kind))
    }

    /// Registered capability identifiers
    pub fn kinds(&self) -> impl Iterator<Item = CapabilityKind> + '_ {
        self.templates.keys().copied()
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::empty()
            .with_template(
                CapabilityKind::KubernetesMonitoring,
                CapabilityTemplate::kubernetes_monitoring(),
            )
            .with_template(CapabilityKind::Routing, CapabilityTemplate::routing())
            .with_template(CapabilityKind::DataIngest, CapabilityTemplate::data_ingest())
    }
}

//! Merged ("multi") capability composition
//!
//! Every enabled capability is instantiated from its template and folded
//! into one descriptor. Environment order is fixed so the StatefulSet hash
//! does not change between reconciliations of an unchanged fleet.

use std::collections::BTreeSet;

use kube::ResourceExt;
use meridian_common::crd::{AgentFleet, CapabilityProperties, ValueSource};
use tracing::debug;

use super::descriptor::{CapabilityDescriptor, Configuration, ModuleVariant, MULTI_MODULE};
use super::template::{CapabilityTemplate, TemplateRegistry};
use super::{
    custom_properties_secret_name, CUSTOM_PROPERTIES_FILE, CUSTOM_PROPERTIES_KEY,
    CUSTOM_PROPERTIES_MOUNT_PATH, CUSTOM_PROPERTIES_VOLUME, PROXY_SECRET_KEY,
};
use crate::error::CapabilityError;
use crate::k8s::{
    Container, EnvVar, HttpGetAction, ProbeSpec, ResourceRequirements, Volume, VolumeMount,
};

/// Gateway environment variables
pub const ENV_CAPABILITIES: &str = "MERIDIAN_CAPABILITIES";
/// Namespace the gateway derives its identity from
pub const ENV_ID_SEED_NAMESPACE: &str = "MERIDIAN_ID_SEED_NAMESPACE";
/// Cluster identity seed
pub const ENV_ID_SEED_CLUSTER_ID: &str = "MERIDIAN_ID_SEED_K8S_CLUSTER_ID";
/// Deployment metadata string
pub const ENV_DEPLOYMENT_METADATA: &str = "MERIDIAN_DEPLOYMENT_METADATA";
/// Proxy used by the gateway
pub const ENV_INTERNAL_PROXY: &str = "MERIDIAN_INTERNAL_PROXY";
/// Gateway group
pub const ENV_GROUP: &str = "MERIDIAN_GROUP";
/// Network zone
pub const ENV_NETWORK_ZONE: &str = "MERIDIAN_NETWORK_ZONE";

const TLS_VOLUME: &str = "server-certs";
const TLS_MOUNT_PATH: &str = "/var/lib/meridian/secrets/tls";
const READINESS_PATH: &str = "/rest/health";

/// Fleet-level inputs every capability instance reads
#[derive(Clone, Debug, PartialEq)]
pub struct FleetContext {
    /// `AgentFleet` name
    pub name: String,
    /// `AgentFleet` namespace
    pub namespace: String,
    /// Resolved gateway image
    pub image: String,
    /// Cluster identity (UID of `kube-system`)
    pub kube_system_uuid: String,
    /// Gateway proxy, if configured
    pub proxy: Option<ValueSource>,
    /// Network zone, empty when unset
    pub network_zone: String,
    /// TLS secret for the merged gateway, empty when unset
    pub tls_secret_name: String,
    /// Version of this operator, reported in deployment metadata
    pub operator_version: String,
}

impl FleetContext {
    /// Gather the fleet-level inputs from an `AgentFleet`
    pub fn new(fleet: &AgentFleet, operator_version: &str) -> Result<Self, CapabilityError> {
        let name = fleet.name_any();
        let namespace = fleet
            .namespace()
            .ok_or_else(|| CapabilityError::invalid_fleet(&name, "resource has no namespace"))?;
        Ok(Self {
            image: fleet.active_gate_image(),
            kube_system_uuid: fleet.kube_system_uuid().to_string(),
            proxy: fleet.spec.proxy.clone().filter(|p| !p.is_empty()),
            network_zone: fleet.spec.network_zone.clone(),
            tls_secret_name: fleet.spec.active_gate.tls_secret_name.clone(),
            operator_version: operator_version.to_string(),
            name,
            namespace,
        })
    }

    /// Value of the deployment-metadata environment variable
    pub fn deployment_metadata(&self) -> String {
        format!(
            "orchestration_tech=Operator-active_gate;script_version={};orchestrator_id={}",
            self.operator_version, self.kube_system_uuid
        )
    }

    fn tls_secret(&self) -> Option<&str> {
        (!self.tls_secret_name.is_empty()).then_some(self.tls_secret_name.as_str())
    }
}

/// One capability instantiated for a fleet
pub(crate) struct Instance {
    pub container: Container,
    pub init_containers: Vec<Container>,
    pub volumes: Vec<Volume>,
}

/// Build the merged descriptor from `activeGate.capabilities`.
///
/// Returns a disabled `multi` descriptor when no capability is listed.
pub fn compose_capabilities(
    fleet: &AgentFleet,
    registry: &TemplateRegistry,
    operator_version: &str,
) -> Result<CapabilityDescriptor, CapabilityError> {
    let spec = &fleet.spec.active_gate;
    let properties = spec.properties.clone();

    if !fleet.active_gate_mode() {
        return Ok(CapabilityDescriptor::disabled(
            ModuleVariant::Multi,
            MULTI_MODULE,
            properties,
        ));
    }

    let ctx = FleetContext::new(fleet, operator_version)?;

    let mut templates: Vec<&CapabilityTemplate> = Vec::with_capacity(spec.capabilities.len());
    let mut modules = BTreeSet::new();
    for kind in &spec.capabilities {
        let template = registry.get(*kind)?;
        if !modules.insert(template.module_name.as_str()) {
            return Err(CapabilityError::DuplicateModule {
                module: template.module_name.clone(),
            });
        }
        templates.push(template);
    }

    // Flags first: the custom-properties secret name depends on the merged owner.
    let configuration = templates
        .iter()
        .fold(Configuration::default(), |acc, t| acc.merge(&t.configuration));

    let mut descriptor = CapabilityDescriptor {
        variant: ModuleVariant::Multi,
        module_name: MULTI_MODULE.to_string(),
        capability_name: templates
            .iter()
            .map(|t| t.capability_name.as_str())
            .collect::<Vec<_>>()
            .join(","),
        enabled: true,
        configuration,
        properties,
        containers: Vec::new(),
        init_containers: Vec::new(),
        volume_mounts: Vec::new(),
        volumes: Vec::new(),
        service_account_name: None,
    };

    let owner = descriptor.configuration.service_account_owner.clone();
    let mut base_volumes = Vec::new();
    for template in templates {
        let instance = instantiate(template, &ctx, &descriptor.properties, ctx.tls_secret());
        descriptor
            .volume_mounts
            .extend(instance.container.volume_mounts.iter().cloned());
        descriptor.containers.push(instance.container);
        descriptor.init_containers.extend(instance.init_containers);
        base_volumes.extend(instance.volumes);
    }
    descriptor.volume_mounts = dedup_by_name(descriptor.volume_mounts, |m| &m.name);
    descriptor.volumes = assemble_volumes(
        &ctx,
        &descriptor.properties,
        &owner,
        base_volumes,
        ctx.tls_secret(),
    );

    debug!(
        fleet = %ctx.name,
        capabilities = %descriptor.capability_name,
        containers = descriptor.containers.len(),
        volumes = descriptor.volumes.len(),
        "composed capabilities"
    );
    Ok(descriptor)
}

/// Instantiate one capability template
pub(crate) fn instantiate(
    template: &CapabilityTemplate,
    ctx: &FleetContext,
    properties: &CapabilityProperties,
    tls_secret: Option<&str>,
) -> Instance {
    let resources = properties.resources.as_ref().map(ResourceRequirements::from);

    let mut volume_mounts = Vec::new();
    if properties.declared_custom_properties().is_some() {
        volume_mounts.push(VolumeMount::readonly_file(
            CUSTOM_PROPERTIES_VOLUME,
            CUSTOM_PROPERTIES_MOUNT_PATH,
            CUSTOM_PROPERTIES_FILE,
        ));
    }
    volume_mounts.extend(template.volume_mounts.iter().cloned());
    if tls_secret.is_some() {
        volume_mounts.push(VolumeMount::new(TLS_VOLUME, TLS_MOUNT_PATH, true));
    }

    let container = Container {
        name: template.module_name.clone(),
        image: ctx.image.clone(),
        image_pull_policy: Some("Always".to_string()),
        env: build_env(&template.capability_name, ctx, properties),
        resources: resources.clone(),
        readiness_probe: Some(readiness_probe(template.readiness_port)),
        volume_mounts,
        ..Default::default()
    };

    let init_containers = template
        .init_containers
        .iter()
        .cloned()
        .map(|mut c| {
            c.image = ctx.image.clone();
            c.resources = resources.clone();
            c
        })
        .collect();

    Instance {
        container,
        init_containers,
        volumes: template.volumes.clone(),
    }
}

/// Pod volumes: custom properties, then base volumes, then TLS
pub(crate) fn assemble_volumes(
    ctx: &FleetContext,
    properties: &CapabilityProperties,
    owner: &str,
    base_volumes: Vec<Volume>,
    tls_secret: Option<&str>,
) -> Vec<Volume> {
    let mut volumes = Vec::with_capacity(base_volumes.len() + 2);
    if let Some(cp) = properties.declared_custom_properties() {
        let secret_name = cp
            .reference()
            .map(str::to_string)
            .unwrap_or_else(|| custom_properties_secret_name(&ctx.name, owner));
        volumes.push(Volume::from_secret_key(
            CUSTOM_PROPERTIES_VOLUME,
            secret_name,
            CUSTOM_PROPERTIES_KEY,
            CUSTOM_PROPERTIES_FILE,
        ));
    }
    volumes.extend(base_volumes);
    if let Some(secret) = tls_secret {
        volumes.push(Volume::from_secret(TLS_VOLUME, secret));
    }
    dedup_by_name(volumes, |v| &v.name)
}

/// Gateway environment in its fixed order
fn build_env(
    capability_name: &str,
    ctx: &FleetContext,
    properties: &CapabilityProperties,
) -> Vec<EnvVar> {
    let mut env = vec![
        EnvVar::literal(ENV_CAPABILITIES, capability_name),
        EnvVar::literal(ENV_ID_SEED_NAMESPACE, &ctx.namespace),
        EnvVar::literal(ENV_ID_SEED_CLUSTER_ID, &ctx.kube_system_uuid),
        EnvVar::literal(ENV_DEPLOYMENT_METADATA, ctx.deployment_metadata()),
    ];
    env.extend(properties.env.iter().map(EnvVar::from));

    if let Some(proxy) = &ctx.proxy {
        env.push(match proxy.reference() {
            Some(secret) => EnvVar::from_secret(ENV_INTERNAL_PROXY, secret, PROXY_SECRET_KEY),
            None => EnvVar::literal(ENV_INTERNAL_PROXY, &proxy.value),
        });
    }
    if !properties.group.is_empty() {
        env.push(EnvVar::literal(ENV_GROUP, &properties.group));
    }
    if !ctx.network_zone.is_empty() {
        env.push(EnvVar::literal(ENV_NETWORK_ZONE, &ctx.network_zone));
    }
    env
}

fn readiness_probe(port: u16) -> ProbeSpec {
    ProbeSpec {
        http_get: Some(HttpGetAction {
            path: READINESS_PATH.to_string(),
            port,
            scheme: Some("HTTPS".to_string()),
        }),
        initial_delay_seconds: Some(90),
        period_seconds: Some(15),
        failure_threshold: Some(3),
    }
}

/// Keep the first item per name, preserving order
pub(crate) fn dedup_by_name<T>(items: Vec<T>, name: impl Fn(&T) -> &String) -> Vec<T> {
    let mut seen = BTreeSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(name(item).clone()))
        .collect()
}

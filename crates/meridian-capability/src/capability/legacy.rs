//! Deprecated single-capability gateways
//!
//! Fleets created before capabilities could be merged run one StatefulSet
//! per capability. These descriptors reuse the merged composer's building
//! blocks so their containers and volumes match the corresponding entry in
//! a `multi` descriptor exactly, and migrating a fleet does not roll pods.

use meridian_common::crd::{AgentFleet, CapabilityKind, LegacyCapabilitySpec};

use super::compose::{assemble_volumes, instantiate, FleetContext};
use super::descriptor::{CapabilityDescriptor, ModuleVariant};
use super::template::TemplateRegistry;
use crate::error::CapabilityError;

/// Prefix of derived service account names
pub const SERVICE_ACCOUNT_PREFIX: &str = "meridian-";

/// Service account used when neither a name nor an owner is known
pub const DEFAULT_SERVICE_ACCOUNT: &str = "meridian-activegate";

/// Descriptor for `spec.kubernetesMonitoring`
pub fn kubernetes_monitoring(
    fleet: &AgentFleet,
    registry: &TemplateRegistry,
    operator_version: &str,
) -> Result<CapabilityDescriptor, CapabilityError> {
    build(
        fleet,
        registry,
        operator_version,
        CapabilityKind::KubernetesMonitoring,
        ModuleVariant::LegacyKubernetesMonitoring,
        fleet.spec.kubernetes_monitoring.as_ref(),
    )
}

/// Descriptor for `spec.routing`
pub fn routing(
    fleet: &AgentFleet,
    registry: &TemplateRegistry,
    operator_version: &str,
) -> Result<CapabilityDescriptor, CapabilityError> {
    build(
        fleet,
        registry,
        operator_version,
        CapabilityKind::Routing,
        ModuleVariant::LegacyRouting,
        fleet.spec.routing.as_ref(),
    )
}

/// Service account for a legacy gateway
pub fn service_account_name(explicit: &str, owner: &str) -> String {
    if !explicit.is_empty() {
        explicit.to_string()
    } else if !owner.is_empty() {
        format!("{SERVICE_ACCOUNT_PREFIX}{owner}")
    } else {
        DEFAULT_SERVICE_ACCOUNT.to_string()
    }
}

fn build(
    fleet: &AgentFleet,
    registry: &TemplateRegistry,
    operator_version: &str,
    kind: CapabilityKind,
    variant: ModuleVariant,
    spec: Option<&LegacyCapabilitySpec>,
) -> Result<CapabilityDescriptor, CapabilityError> {
    let template = registry.get(kind)?;

    let spec = match spec {
        Some(spec) if spec.enabled => spec,
        other => {
            let properties = other.map(|s| s.properties.clone()).unwrap_or_default();
            return Ok(CapabilityDescriptor::disabled(
                variant,
                &template.module_name,
                properties,
            ));
        }
    };

    let ctx = FleetContext::new(fleet, operator_version)?;
    let owner = template.configuration.service_account_owner.as_str();
    let instance = instantiate(template, &ctx, &spec.properties, None);
    let volumes = assemble_volumes(&ctx, &spec.properties, owner, instance.volumes, None);

    Ok(CapabilityDescriptor {
        variant,
        module_name: template.module_name.clone(),
        capability_name: template.capability_name.clone(),
        enabled: true,
        configuration: template.configuration.clone(),
        properties: spec.properties.clone(),
        volume_mounts: instance.container.volume_mounts.clone(),
        containers: vec![instance.container],
        init_containers: instance.init_containers,
        volumes,
        service_account_name: Some(service_account_name(&spec.service_account_name, owner)),
    })
}

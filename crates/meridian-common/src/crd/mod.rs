//! Custom Resource Definitions for Meridian

mod agent_fleet;
mod types;

pub use agent_fleet::{
    ActiveGateSpec, ActiveGateStatus, AgentFleet, AgentFleetSpec, AgentFleetStatus,
    CapabilityKind, ConnectionInfoStatus, LegacyCapabilitySpec,
};
pub use types::{
    CapabilityProperties, EnvVarSpec, ResourceQuantity, ResourceRequirements, SecretKeyRef,
    Toleration, ValueSource,
};

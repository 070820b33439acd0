//! Capability model for Meridian gateways
//!
//! Turns the capabilities enabled on an `AgentFleet` into one
//! [`CapabilityDescriptor`]: the containers, init containers, volumes and
//! configuration flags a gateway StatefulSet is built from.
//!
//! # Usage
//!
//! ```rust,ignore
//! let registry = TemplateRegistry::default();
//! let multi = compose_capabilities(&fleet, &registry, OPERATOR_VERSION)?;
//! let kubemon = legacy::kubernetes_monitoring(&fleet, &registry, OPERATOR_VERSION)?;
//! ```

pub mod capability;
pub mod error;
pub mod k8s;

pub use capability::{
    compose_capabilities, legacy, CapabilityDescriptor, CapabilityTemplate, Configuration,
    FleetContext, ModuleVariant, TemplateRegistry, MULTI_MODULE,
};
pub use error::CapabilityError;

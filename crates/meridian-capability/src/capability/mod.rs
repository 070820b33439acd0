//! Capability descriptors and their composition

mod compose;
mod descriptor;
pub mod legacy;
mod template;

pub use compose::{
    compose_capabilities, FleetContext, ENV_CAPABILITIES, ENV_DEPLOYMENT_METADATA,
    ENV_GROUP, ENV_ID_SEED_CLUSTER_ID, ENV_ID_SEED_NAMESPACE, ENV_INTERNAL_PROXY,
    ENV_NETWORK_ZONE,
};
pub use descriptor::{CapabilityDescriptor, Configuration, ModuleVariant, MULTI_MODULE};
pub use template::{CapabilityTemplate, TemplateRegistry};

/// Secret data key holding custom properties
pub const CUSTOM_PROPERTIES_KEY: &str = "customProperties";

/// File the custom properties are projected to
pub const CUSTOM_PROPERTIES_FILE: &str = "custom.properties";

/// Pod volume carrying custom properties
pub const CUSTOM_PROPERTIES_VOLUME: &str = "custom-properties";

/// Where the gateway reads custom properties from
pub const CUSTOM_PROPERTIES_MOUNT_PATH: &str =
    "/var/lib/meridian/gateway/config_template/custom.properties";

/// Secret key holding the proxy URL
pub const PROXY_SECRET_KEY: &str = "proxy";

/// Name of the operator-managed secret for inline custom properties
pub fn custom_properties_secret_name(instance_name: &str, service_account_owner: &str) -> String {
    format!("{instance_name}-{service_account_owner}-custom-properties")
}

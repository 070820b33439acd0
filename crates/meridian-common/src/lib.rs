//! Common types for Meridian: the `AgentFleet` CRD, errors, and Kubernetes utilities

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod kube_utils;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Label key identifying the application a resource belongs to
pub const LABEL_NAME: &str = "app.kubernetes.io/name";

/// Label key identifying the tool managing a resource
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Value of [`LABEL_MANAGED_BY`] for resources owned by this operator
pub const LABEL_MANAGED_BY_MERIDIAN: &str = "meridian-operator";

/// Label key carrying the owning `AgentFleet` name
pub const LABEL_INSTANCE: &str = "meridian.dev/instance";

/// Label key carrying the capability module a workload was built for
pub const LABEL_MODULE: &str = "meridian.dev/module";

/// Field manager used for server-side apply
pub const FIELD_MANAGER: &str = "meridian-operator";

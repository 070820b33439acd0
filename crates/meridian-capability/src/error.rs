//! Error types for capability composition

use meridian_common::crd::CapabilityKind;
use thiserror::Error;

/// Capability composition errors
#[derive(Debug, Error, PartialEq)]
pub enum CapabilityError {
    /// Capability has no template in the registry
    #[error("unknown capability {kind}: no template registered")]
    UnknownCapability {
        /// Requested capability
        kind: CapabilityKind,
    },

    /// Two templates in one merged descriptor share a module name
    #[error("duplicate module {module} in capability list")]
    DuplicateModule {
        /// Module name
        module: String,
    },

    /// The `AgentFleet` lacks data composition depends on
    #[error("invalid fleet {fleet}: {message}")]
    InvalidFleet {
        /// Fleet name
        fleet: String,
        /// Error message
        message: String,
    },
}

impl CapabilityError {
    /// Create an unknown-capability error
    pub fn unknown(kind: CapabilityKind) -> Self {
        Self::UnknownCapability { kind }
    }

    /// Create an invalid-fleet error
    pub fn invalid_fleet(fleet: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::InvalidFleet {
            fleet: fleet.into(),
            message: msg.into(),
        }
    }
}

impl From<CapabilityError> for meridian_common::Error {
    fn from(err: CapabilityError) -> Self {
        let resource = match &err {
            CapabilityError::InvalidFleet { fleet, .. } => fleet.clone(),
            CapabilityError::UnknownCapability { kind } => kind.to_string(),
            CapabilityError::DuplicateModule { module } => module.clone(),
        };
        meridian_common::Error::validation_for(resource, err.to_string())
    }
}

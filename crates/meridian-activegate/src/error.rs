//! Gateway reconciliation errors

use meridian_capability::CapabilityError;

/// Errors building a desired StatefulSet
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The built object could not be hashed
    #[error("failed to hash statefulset {name}: {source}")]
    Hash {
        /// StatefulSet name
        name: String,
        /// Underlying serialization error
        source: meridian_common::Error,
    },
}

impl From<BuildError> for meridian_common::Error {
    fn from(err: BuildError) -> Self {
        meridian_common::Error::serialization_for_kind("StatefulSet", err.to_string())
    }
}

/// Errors from one gateway reconcile cycle
#[derive(Debug, thiserror::Error)]
pub enum ActiveGateError {
    /// Capability composition failed
    #[error("capability error: {0}")]
    Capability(#[from] CapabilityError),

    /// Desired state could not be built
    #[error("build error: {0}")]
    Build(#[from] BuildError),

    /// Remote store, secret, or configuration failure
    #[error("{0}")]
    Common(#[from] meridian_common::Error),

    /// Owner reference could not be derived from the AgentFleet
    #[error("cannot set owner of {name}: {message}")]
    Ownership {
        /// Object being owned
        name: String,
        /// Error message
        message: String,
    },

    /// AgentFleet has no namespace
    #[error("missing namespace on AgentFleet")]
    MissingNamespace,
}

impl ActiveGateError {
    /// Whether retrying without a spec change can succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Common(e) => e.is_retryable(),
            Self::Capability(_) | Self::Build(_) | Self::Ownership { .. } => false,
            Self::MissingNamespace => false,
        }
    }
}

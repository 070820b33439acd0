//! Error types for the Meridian operator
//!
//! Errors carry the resource or call site they originated from so a failed
//! reconcile can be diagnosed from a single log line.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for Meridian operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// A referenced secret (or a key inside it) does not exist
    #[error("missing reference {namespace}/{name}{}", key_suffix(.key))]
    MissingReference {
        /// Namespace the reference was resolved in
        namespace: String,
        /// Name of the referenced object
        name: String,
        /// Key inside the referenced object, when the object exists but the key does not
        key: Option<String>,
    },

    /// The remote store (API server or agent-distribution service) could not serve a request
    #[error("backend unavailable [{context}]: {message}")]
    BackendUnavailable {
        /// Call site that issued the request (e.g., "get statefulset ns/name")
        context: String,
        /// Description of what failed
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Invalid `AgentFleet` configuration
    #[error("validation error for {resource}: {message}")]
    Validation {
        /// Name of the resource with invalid configuration
        resource: String,
        /// Description of what's invalid
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "reconciler", "ownership")
        context: String,
    },
}

impl Error {
    /// Create a missing-reference error for an absent object
    pub fn missing_reference(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::MissingReference {
            namespace: namespace.into(),
            name: name.into(),
            key: None,
        }
    }

    /// Create a missing-reference error for an object that lacks a key
    pub fn missing_key(
        namespace: impl Into<String>,
        name: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self::MissingReference {
            namespace: namespace.into(),
            name: name.into(),
            key: Some(key.into()),
        }
    }

    /// Wrap a backend failure with the call site that observed it
    pub fn backend(context: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::BackendUnavailable {
            context: context.into(),
            message: err.to_string(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            resource: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
        }
    }

    /// Create a validation error with resource context
    pub fn validation_for(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Configuration problems (validation, missing references, serialization)
    /// need a spec or secret change before a retry can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code)
            ),
            Error::MissingReference { .. } => false,
            Error::BackendUnavailable { .. } => true,
            Error::Serialization { .. } => false,
            Error::Validation { .. } => false,
            Error::Internal { .. } => true,
        }
    }

    /// Get the context if this error has one
    pub fn context(&self) -> Option<&str> {
        match self {
            Error::BackendUnavailable { context, .. } => Some(context),
            Error::Internal { context, .. } => Some(context),
            _ => None,
        }
    }
}

fn key_suffix(key: &Option<String>) -> String {
    key.as_deref()
        .map(|k| format!(" (key '{k}')"))
        .unwrap_or_default()
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::serialization(err.to_string())
    }
}

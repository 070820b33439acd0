//! Garbage collection errors

/// Errors preparing a garbage collection run
#[derive(Debug, thiserror::Error)]
pub enum GcError {
    /// Secret or cluster access failed
    #[error("{0}")]
    Common(#[from] meridian_common::Error),

    /// Distribution service could not be reached
    #[error("request to {url} failed: {message}")]
    Http {
        /// Request URL
        url: String,
        /// Error message
        message: String,
    },

    /// Distribution service answered with a non-success status
    #[error("request to {url} returned HTTP {status}")]
    Status {
        /// Request URL
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// Distribution service answered with an unexpected body
    #[error("invalid response from {url}: {message}")]
    InvalidResponse {
        /// Request URL
        url: String,
        /// Error message
        message: String,
    },

    /// HTTP client could not be configured
    #[error("failed to build distribution client: {0}")]
    Client(String),

    /// AgentFleet has no namespace
    #[error("missing namespace on AgentFleet")]
    MissingNamespace,

    /// Blocking sweep task failed
    #[error("garbage collection task failed: {0}")]
    Task(String),
}

impl GcError {
    /// Create an HTTP transport error
    pub fn http(url: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Http {
            url: url.into(),
            message: err.to_string(),
        }
    }

    /// Create an invalid response error
    pub fn invalid_response(url: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::InvalidResponse {
            url: url.into(),
            message: err.to_string(),
        }
    }
}

impl From<GcError> for meridian_common::Error {
    fn from(err: GcError) -> Self {
        match err {
            GcError::Common(e) => e,
            GcError::Http { url, message } => meridian_common::Error::backend(url, message),
            GcError::Status { url, status } => {
                meridian_common::Error::backend(url, format!("HTTP {status}"))
            }
            other @ (GcError::MissingNamespace | GcError::InvalidResponse { .. }) => {
                meridian_common::Error::validation(other.to_string())
            }
            other => meridian_common::Error::internal(other.to_string()),
        }
    }
}

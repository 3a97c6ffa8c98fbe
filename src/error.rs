//! Error types for the service discovery lifecycle

use thiserror::Error;

/// Failure reported by a [`ResolutionBackend`](crate::backend::ResolutionBackend)
///
/// The controller passes these through to its caller unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The backend was used before `init` or after `shutdown`
    #[error("resolution backend is not initialized")]
    NotInitialized,
    /// The addressed record or service does not exist
    #[error("not found: {0}")]
    NotFound(String),
    /// A service is already advertised for the same type and protocol
    #[error("already advertised: {0}")]
    AlreadyExists(String),
    /// mDNS daemon failure
    #[error("mDNS error: {0}")]
    Mdns(String),
    /// The backend gave up waiting on the network
    #[error("timeout: {0}")]
    Timeout(String),
    /// Any other backend failure
    #[error("{0}")]
    Other(String),
}

impl BackendError {
    /// Create a new not-found error
    pub fn not_found<S: Into<String>>(what: S) -> Self {
        Self::NotFound(what.into())
    }

    /// Create a new already-advertised error
    pub fn already_exists<S: Into<String>>(what: S) -> Self {
        Self::AlreadyExists(what.into())
    }

    /// Create a new mDNS error
    pub fn mdns<S: Into<String>>(msg: S) -> Self {
        Self::Mdns(msg.into())
    }

    /// Create a new catch-all error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Self::Other(msg.into())
    }
}

#[cfg(feature = "mdns-sd")]
impl From<mdns_sd::Error> for BackendError {
    fn from(err: mdns_sd::Error) -> Self {
        Self::Mdns(err.to_string())
    }
}

/// The error type returned by every [`ServiceDiscovery`](crate::ServiceDiscovery) operation
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The operation requires `init` to have run first
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// A required argument was missing or empty
    #[error("invalid argument `{field}`: {reason}")]
    InvalidArgument {
        /// The offending argument or configuration field
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
    /// Allocation or task spawn failure
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
    /// Failure passed through from the resolution backend
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

/// Common result type for library operations
pub type Result<T> = std::result::Result<T, DiscoveryError>;

impl DiscoveryError {
    /// Create a new invalid state error
    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create a new invalid argument error for `field`
    pub fn invalid_argument<S: Into<String>>(field: &'static str, reason: S) -> Self {
        Self::InvalidArgument {
            field,
            reason: reason.into(),
        }
    }

    /// Create a new resource exhausted error
    pub fn resource_exhausted<S: Into<String>>(msg: S) -> Self {
        Self::ResourceExhausted(msg.into())
    }

    /// Name of the rejected field, if this is an argument error
    pub fn invalid_field(&self) -> Option<&'static str> {
        match self {
            Self::InvalidArgument { field, .. } => Some(field),
            _ => None,
        }
    }

    /// The backend failure, if this error came from the backend
    pub fn backend_error(&self) -> Option<&BackendError> {
        match self {
            Self::Backend(err) => Some(err),
            _ => None,
        }
    }
}

/// Reject an empty string argument
pub(crate) fn require_non_empty(field: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(DiscoveryError::invalid_argument(field, "must not be empty"));
    }
    Ok(())
}

//! Errors returned by the redirection managers and the controller.

use redirect_driver::DriverError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RedirectionError>;

/// Redirection error.
///
/// `Conflict`, `Invalid` and `Backend` make up the backend-failure class:
/// the request was refused, either by a manager-side consistency check or by
/// the controller itself. `NotFound` and `PortNotFound` report unresolved
/// references; removing something that is already absent is never an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RedirectionError {
    /// An update target or parent element does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A port or element referenced by a port or hook operation does not
    /// resolve. Callers usually need to register the element, not retry the
    /// hook operation.
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// The request contradicts installed state (order collision, identity
    /// mismatch, object in use).
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid request: {0}")]
    Invalid(String),

    #[error("Backend failure: {0}")]
    Backend(#[from] DriverError),
}

impl RedirectionError {
    pub fn not_found(what: impl Into<String>) -> Self {
        RedirectionError::NotFound(what.into())
    }

    pub fn port_not_found(what: impl Into<String>) -> Self {
        RedirectionError::PortNotFound(what.into())
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        RedirectionError::Conflict(what.into())
    }

    pub fn invalid(what: impl Into<String>) -> Self {
        RedirectionError::Invalid(what.into())
    }

    /// Returns true for failures the controller or a consistency check
    /// reported, as opposed to unresolved references.
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            RedirectionError::Conflict(_) | RedirectionError::Invalid(_) | RedirectionError::Backend(_)
        )
    }

    /// Returns true if the failure is transient.
    ///
    /// State must be re-queried (or reconciled) before retrying, since the
    /// controller may have applied part of the request.
    pub fn is_retryable(&self) -> bool {
        match self {
            RedirectionError::Backend(e) => e.is_retryable(),
            _ => false,
        }
    }
}

//! Driver error types and status handling.
//!
//! Controllers report failures as numeric status codes; this module turns
//! them into Rust's `Result` type.

use std::fmt;
use thiserror::Error;

/// Status codes reported by an SDN controller driver.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverStatus {
    Success = 0,
    Failure = -1,
    NotSupported = -2,
    InsufficientResources = -4,
    InvalidParameter = -5,
    ItemAlreadyExists = -6,
    ItemNotFound = -7,
    Uninitialized = -12,
    ObjectInUse = -17,
    NotExecuted = -23,
    Unreachable = -30,
}

impl DriverStatus {
    /// Creates a DriverStatus from a raw i32 value.
    pub fn from_raw(status: i32) -> Self {
        match status {
            0 => DriverStatus::Success,
            -2 => DriverStatus::NotSupported,
            -4 => DriverStatus::InsufficientResources,
            -5 => DriverStatus::InvalidParameter,
            -6 => DriverStatus::ItemAlreadyExists,
            -7 => DriverStatus::ItemNotFound,
            -12 => DriverStatus::Uninitialized,
            -17 => DriverStatus::ObjectInUse,
            -23 => DriverStatus::NotExecuted,
            -30 => DriverStatus::Unreachable,
            _ => DriverStatus::Failure,
        }
    }

    pub fn is_success(&self) -> bool {
        *self == DriverStatus::Success
    }

    /// Converts to a Result, returning Ok(()) for success.
    pub fn into_result(self) -> DriverResult<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(DriverError::from_status(self))
        }
    }
}

impl fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DriverStatus::Success => "STATUS_SUCCESS",
            DriverStatus::Failure => "STATUS_FAILURE",
            DriverStatus::NotSupported => "STATUS_NOT_SUPPORTED",
            DriverStatus::InsufficientResources => "STATUS_INSUFFICIENT_RESOURCES",
            DriverStatus::InvalidParameter => "STATUS_INVALID_PARAMETER",
            DriverStatus::ItemAlreadyExists => "STATUS_ITEM_ALREADY_EXISTS",
            DriverStatus::ItemNotFound => "STATUS_ITEM_NOT_FOUND",
            DriverStatus::Uninitialized => "STATUS_UNINITIALIZED",
            DriverStatus::ObjectInUse => "STATUS_OBJECT_IN_USE",
            DriverStatus::NotExecuted => "STATUS_NOT_EXECUTED",
            DriverStatus::Unreachable => "STATUS_UNREACHABLE",
        };
        write!(f, "{}", s)
    }
}

/// Error type for driver operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// Controller returned an error status.
    #[error("Controller operation failed: {status}")]
    Status { status: DriverStatus },

    /// The controller does not support the requested feature or value.
    #[error("Feature not supported: {feature}")]
    NotSupported { feature: String },

    /// The controller rejected the request parameters.
    #[error("Invalid parameter: {message}")]
    InvalidParameter { message: String },

    #[error("Item not found: {item}")]
    NotFound { item: String },

    #[error("Item already exists: {item}")]
    AlreadyExists { item: String },

    /// Object is referenced and cannot be removed.
    #[error("Object in use: {object}")]
    ObjectInUse { object: String },

    /// The controller could not be reached.
    #[error("Controller unreachable: {controller}")]
    Unreachable { controller: String },

    /// The driver session is not connected.
    #[error("Driver not connected")]
    Uninitialized,

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DriverError {
    /// Creates an error from a controller status code.
    pub fn from_status(status: DriverStatus) -> Self {
        match status {
            DriverStatus::Success => DriverError::Internal {
                message: "from_status called with success status".to_string(),
            },
            DriverStatus::NotSupported => DriverError::NotSupported {
                feature: "unknown".to_string(),
            },
            DriverStatus::InvalidParameter => DriverError::InvalidParameter {
                message: format!("controller returned {}", status),
            },
            DriverStatus::ItemNotFound => DriverError::NotFound {
                item: "unknown".to_string(),
            },
            DriverStatus::ItemAlreadyExists => DriverError::AlreadyExists {
                item: "unknown".to_string(),
            },
            DriverStatus::ObjectInUse => DriverError::ObjectInUse {
                object: "unknown".to_string(),
            },
            DriverStatus::Uninitialized => DriverError::Uninitialized,
            DriverStatus::Unreachable => DriverError::Unreachable {
                controller: "unknown".to_string(),
            },
            _ => DriverError::Status { status },
        }
    }

    pub fn not_supported(feature: impl Into<String>) -> Self {
        DriverError::NotSupported {
            feature: feature.into(),
        }
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        DriverError::InvalidParameter {
            message: message.into(),
        }
    }

    pub fn not_found(item: impl Into<String>) -> Self {
        DriverError::NotFound { item: item.into() }
    }

    pub fn already_exists(item: impl Into<String>) -> Self {
        DriverError::AlreadyExists { item: item.into() }
    }

    pub fn object_in_use(object: impl Into<String>) -> Self {
        DriverError::ObjectInUse {
            object: object.into(),
        }
    }

    pub fn unreachable(controller: impl Into<String>) -> Self {
        DriverError::Unreachable {
            controller: controller.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        DriverError::Internal {
            message: message.into(),
        }
    }

    /// Returns true if the controller reported the target as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DriverError::NotFound { .. }
                | DriverError::Status {
                    status: DriverStatus::ItemNotFound
                }
        )
    }

    /// Returns true if the failure is transient.
    ///
    /// A retry after a transient failure must be preceded by a state query,
    /// since the controller may have applied part of the request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DriverError::Unreachable { .. }
                | DriverError::Status {
                    status: DriverStatus::InsufficientResources | DriverStatus::NotExecuted
                }
        )
    }
}

/// Result type for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_success() {
        assert!(DriverStatus::Success.is_success());
        assert!(DriverStatus::Success.into_result().is_ok());
        assert!(DriverStatus::Failure.into_result().is_err());
    }

    #[test]
    fn test_status_from_raw() {
        assert_eq!(DriverStatus::from_raw(0), DriverStatus::Success);
        assert_eq!(DriverStatus::from_raw(-7), DriverStatus::ItemNotFound);
        assert_eq!(DriverStatus::from_raw(-30), DriverStatus::Unreachable);
        assert_eq!(DriverStatus::from_raw(-999), DriverStatus::Failure);
    }

    #[test]
    fn test_error_from_status() {
        assert!(DriverError::from_status(DriverStatus::ItemNotFound).is_not_found());
        assert!(matches!(
            DriverError::from_status(DriverStatus::ObjectInUse),
            DriverError::ObjectInUse { .. }
        ));
        assert_eq!(
            DriverError::from_status(DriverStatus::Uninitialized),
            DriverError::Uninitialized
        );
    }

    #[test]
    fn test_error_retryable() {
        assert!(DriverError::unreachable("odl").is_retryable());
        assert!(DriverError::from_status(DriverStatus::NotExecuted).is_retryable());
        assert!(!DriverError::not_found("chain-1").is_retryable());
        assert!(!DriverError::invalid_parameter("cycle").is_retryable());
    }
}

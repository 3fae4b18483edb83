//! Structured logging and audit records.
//!
//! Two kinds of events are emitted:
//!
//! - Component events through [`debug_log!`](crate::debug_log),
//!   [`info_log!`](crate::info_log), [`warn_log!`](crate::warn_log) and
//!   [`error_log!`](crate::error_log). Each carries a `source` field naming
//!   the manager that emitted it.
//! - Audit records through [`audit_log!`](crate::audit_log), on the `audit`
//!   target. Every change to what the controller redirects (element
//!   composition, inspection ports, hooks) produces one record, whether it
//!   succeeded or failed, so the redirection state can be reconstructed from
//!   the log alone.
//!
//! | Outcome | Level |
//! |---------|-------|
//! | Success | Info |
//! | InProgress | Debug |
//! | Failure / Denied | Warn |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of change an audit record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditCategory {
    /// Element, port or hook created
    ResourceCreate,
    /// Hook attributes or element children changed
    ResourceModify,
    /// Element, port or hook removed
    ResourceDelete,
    /// Controller session opened or closed
    SystemLifecycle,
    /// Call into the backend driver
    DriverOperation,
    /// Caches rebuilt from the controller
    Reconciliation,
    /// Plan or configuration applied
    ConfigurationChange,
    /// Failure that left state needing manual cleanup
    ErrorCondition,
}

impl fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuditCategory::ResourceCreate => "RESOURCE_CREATE",
            AuditCategory::ResourceModify => "RESOURCE_MODIFY",
            AuditCategory::ResourceDelete => "RESOURCE_DELETE",
            AuditCategory::SystemLifecycle => "SYSTEM_LIFECYCLE",
            AuditCategory::DriverOperation => "DRIVER_OPERATION",
            AuditCategory::Reconciliation => "RECONCILIATION",
            AuditCategory::ConfigurationChange => "CONFIGURATION_CHANGE",
            AuditCategory::ErrorCondition => "ERROR_CONDITION",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Failure,
    InProgress,
    /// Refused by a manager-side check before reaching the driver
    Denied,
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditOutcome::Success => write!(f, "success"),
            AuditOutcome::Failure => write!(f, "failure"),
            AuditOutcome::InProgress => write!(f, "in_progress"),
            AuditOutcome::Denied => write!(f, "denied"),
        }
    }
}

/// One audit event.
///
/// Built with [`AuditRecord::new`] and the `with_*` methods, then handed to
/// [`audit_log!`](crate::audit_log). The timestamp is taken at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub category: AuditCategory,
    /// Component that emitted the record, e.g. `HookManager`
    pub source: String,
    pub action: String,
    pub outcome: AuditOutcome,

    /// Element id, port id or hook id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,

    /// `network_element`, `inspection_port` or `inspection_hook`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Groups the records of one compound operation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl AuditRecord {
    /// Creates a record with outcome `InProgress`.
    pub fn new(
        category: AuditCategory,
        source: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            category,
            source: source.into(),
            action: action.into(),
            outcome: AuditOutcome::InProgress,
            object_id: None,
            object_type: None,
            details: None,
            error: None,
            correlation_id: None,
        }
    }

    pub fn with_outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_object_id(mut self, id: impl Into<String>) -> Self {
        self.object_id = Some(id.into());
        self
    }

    pub fn with_object_type(mut self, obj_type: impl Into<String>) -> Self {
        self.object_type = Some(obj_type.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Sets the error message. Also sets the outcome to `Failure` unless it
    /// was already `Denied`.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        if self.outcome != AuditOutcome::Denied {
            self.outcome = AuditOutcome::Failure;
        }
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"error":"serialization_failed","message":"{}"}}"#, e))
    }
}

/// Debug-level event from a component.
///
/// ```ignore
/// debug_log!("HookManager", hook = %id, "Installing hook");
/// ```
#[macro_export]
macro_rules! debug_log {
    ($source:expr, $($arg:tt)*) => {
        tracing::debug!(
            source = $source,
            $($arg)*
        )
    };
}

/// Info-level event from a component.
#[macro_export]
macro_rules! info_log {
    ($source:expr, $($arg:tt)*) => {
        tracing::info!(
            source = $source,
            $($arg)*
        )
    };
}

/// Warn-level event from a component.
#[macro_export]
macro_rules! warn_log {
    ($source:expr, $($arg:tt)*) => {
        tracing::warn!(
            source = $source,
            $($arg)*
        )
    };
}

/// Error-level event from a component. Used for driver failures.
#[macro_export]
macro_rules! error_log {
    ($source:expr, $($arg:tt)*) => {
        tracing::error!(
            source = $source,
            $($arg)*
        )
    };
}

/// Emits an [`AuditRecord`] on the `audit` target at the level its outcome
/// maps to.
///
/// ```ignore
/// audit_log!(AuditRecord::new(AuditCategory::ResourceCreate, "PortManager", "register_port")
///     .with_outcome(AuditOutcome::Success)
///     .with_object_id("pp-1")
///     .with_object_type("inspection_port"));
/// ```
#[macro_export]
macro_rules! audit_log {
    ($record:expr) => {
        let record = $record;
        match record.outcome {
            $crate::audit::AuditOutcome::Success => {
                tracing::info!(
                    target: "audit",
                    category = %record.category,
                    source = %record.source,
                    action = %record.action,
                    outcome = %record.outcome,
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {}",
                    record.category,
                    record.action,
                    record.outcome
                );
            }
            $crate::audit::AuditOutcome::InProgress => {
                tracing::debug!(
                    target: "audit",
                    category = %record.category,
                    source = %record.source,
                    action = %record.action,
                    outcome = %record.outcome,
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {}",
                    record.category,
                    record.action,
                    record.outcome
                );
            }
            $crate::audit::AuditOutcome::Failure | $crate::audit::AuditOutcome::Denied => {
                tracing::warn!(
                    target: "audit",
                    category = %record.category,
                    source = %record.source,
                    action = %record.action,
                    outcome = %record.outcome,
                    error = record.error.as_deref().unwrap_or(""),
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {}",
                    record.category,
                    record.action,
                    record.outcome
                );
            }
        }
    };
}

/// Installs a JSON subscriber. `RUST_LOG` overrides `log_level`.
pub fn init_logging(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .json(),
        )
        .init();
}

/// Installs a human-readable subscriber for interactive use.
pub fn init_logging_pretty(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .pretty(),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_record_creation() {
        let record = AuditRecord::new(AuditCategory::ResourceCreate, "PortManager", "register_port")
            .with_outcome(AuditOutcome::Success)
            .with_object_id("pp-1")
            .with_object_type("inspection_port");

        assert_eq!(record.category, AuditCategory::ResourceCreate);
        assert_eq!(record.source, "PortManager");
        assert_eq!(record.outcome, AuditOutcome::Success);
        assert_eq!(record.object_id, Some("pp-1".to_string()));
    }

    #[test]
    fn test_with_error_marks_failure() {
        let record = AuditRecord::new(AuditCategory::DriverOperation, "HookManager", "install_hook")
            .with_error("Controller unreachable: odl");
        assert_eq!(record.outcome, AuditOutcome::Failure);

        let denied = AuditRecord::new(AuditCategory::ResourceCreate, "HookManager", "install_hook")
            .with_outcome(AuditOutcome::Denied)
            .with_error("order collision");
        assert_eq!(denied.outcome, AuditOutcome::Denied);
    }

    #[test]
    fn test_json_carries_details() {
        let record = AuditRecord::new(AuditCategory::ResourceModify, "HookManager", "set_order")
            .with_outcome(AuditOutcome::Success)
            .with_object_id("hook-1")
            .with_correlation_id("redirect-7")
            .with_details(serde_json::json!({ "old_order": 10, "new_order": 1 }));

        let json = record.to_json();
        assert!(json.contains("RESOURCE_MODIFY"));
        assert!(json.contains("\"new_order\":1"));
        assert!(json.contains("redirect-7"));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn test_display() {
        assert_eq!(AuditCategory::DriverOperation.to_string(), "DRIVER_OPERATION");
        assert_eq!(AuditCategory::Reconciliation.to_string(), "RECONCILIATION");
        assert_eq!(AuditOutcome::InProgress.to_string(), "in_progress");
    }
}

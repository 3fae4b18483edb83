//! Backend drivers for SDN traffic redirection.
//!
//! A driver is the piece that actually talks to an SDN/NFV controller and
//! programs flows. The redirection controller only ever talks to a driver
//! through the [`RedirectionDriver`] trait, so every backend has to honor
//! the same identity and idempotency rules.
//!
//! # Architecture
//!
//! - [`error`]: Driver status codes and error types
//! - [`types`]: Requests, capabilities and snapshots exchanged with drivers
//! - [`api`]: The driver trait and the controller backends
//!   ([`SfcDriver`], [`FlowClassifierDriver`])
//! - [`mock`]: A recording test double with failure injection
//!
//! # Example
//!
//! ```
//! use redirect_driver::{RedirectionDriver, SfcDriver};
//!
//! let driver = SfcDriver::new("neutron-sfc");
//! driver.add_port("p1".parse().unwrap());
//! driver.connect().unwrap();
//! assert!(driver.capabilities().hook_id_is_port_id);
//! driver.disconnect().unwrap();
//! ```

pub mod api;
pub mod error;
pub mod mock;
mod store;
pub mod types;

pub use api::{FlowClassifierDriver, RedirectionDriver, SfcDriver};
pub use error::{DriverError, DriverResult, DriverStatus};
pub use mock::{DriverOp, MockDriver};
pub use types::{DriverCapabilities, DriverSnapshot, HookRequest};

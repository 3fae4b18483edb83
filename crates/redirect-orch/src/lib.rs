//! Traffic redirection orchestration.
//!
//! Steers traffic between protected network elements and inspection devices
//! (firewalls, IDS, DPI appliances) attached to an SDN. Callers describe what
//! is redirected and through which inspection points; a
//! [`RedirectionDriver`](redirect_driver::RedirectionDriver) programs the
//! flows on the controller.
//!
//! # Architecture
//!
//! ```text
//!                   [RedirectionController]
//!                  /          |            \
//!   [ElementRegistry] <- [PortManager] <- [HookManager]
//!                  \          |            /
//!                     [RedirectionDriver] ──> [SDN controller]
//! ```
//!
//! Each manager keeps a cache of the controller's objects. The driver is the
//! system of truth; [`RedirectionController::reconcile`] rebuilds the caches
//! from it.
//!
//! # Key Components
//!
//! - [`element::ElementRegistry`]: Network elements and their ordered children
//! - [`port::PortManager`]: Inspection ports keyed by (ingress, egress)
//! - [`hook::HookManager`]: Inspection hooks, addressable by id or by
//!   (inspected elements, inspection port)
//! - [`controller::RedirectionController`]: The facade callers use
//! - [`audit`]: Structured and audit logging
//! - [`config`]: TOML controller configuration and redirection plans

pub mod audit;
pub mod config;
pub mod controller;
pub mod element;
pub mod error;
pub mod hook;
pub mod port;

pub use controller::{ControllerStats, ReconcileReport, RedirectionController, RedirectionControllerConfig};
pub use error::{RedirectionError, Result};

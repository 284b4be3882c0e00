//! shelly-exporter library crate.
//!
//! The monitoring engine behind the `shelly-exporter` binary: configuration,
//! the target scheduler, network discovery and the metrics seam. Device
//! protocol and parsing live in `shelly-devices`.

pub mod config;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod scheduler;
pub mod services;
pub mod utils;

pub use error::{Error, Result};

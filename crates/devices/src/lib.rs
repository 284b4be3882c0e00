//! Device-facing building blocks for monitoring Shelly Gen2+ devices.
//!
//! - [`rpc`]: JSON-RPC over HTTP client handles sharing one connection pool.
//! - [`driver`]: capability-scored drivers that map a device identity to the
//!   right status parser, plus the [`DriverRegistry`] that picks one.
//! - [`reading`]: the normalized reading model drivers produce.
//!
//! # Example
//!
//! ```no_run
//! use shelly_devices::{
//!     ChannelDescriptor, ClientPool, ClientPoolConfig, DeviceDriver, DriverRegistry,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = ClientPool::new(ClientPoolConfig::default())?;
//! let client = pool.client("10.0.80.22", None)?;
//!
//! let identity = client.get_device_info().await?;
//! let registry = DriverRegistry::with_builtin_drivers();
//! if let Some(driver) = registry.resolve(&identity) {
//!     let status = client.get_status().await?;
//!     let readings = driver.parse_status(&status, &identity, &[ChannelDescriptor::switch(0)]);
//!     println!("{readings:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod driver;
pub mod identity;
pub mod reading;
pub mod rpc;

pub use channel::{ChannelDescriptor, ChannelKind, FieldSuppression};
pub use driver::{DeviceDriver, DriverError, DriverRegistry, SupportedChannels, build_reading};
pub use identity::DeviceIdentity;
pub use reading::{
    ChannelReading, ConnectivityReading, DeviceReading, InputReading, NetworkReading,
    SystemReading,
};
pub use rpc::{ClientPool, ClientPoolConfig, Credentials, RpcClient, RpcError, RpcErrorKind};

//! Network discovery.
//!
//! The [`NetworkScanner`] expands the configured address ranges, probes
//! every candidate for a device identity, promotes supported devices to
//! targets and hands them to the scheduler through a [`TargetRegistrar`].

mod device;
mod naming;
mod probe;
mod range;
mod scanner;
mod store;

pub use device::DiscoveredDevice;
pub use naming::format_device_name;
pub use probe::{IdentityProbe, ProbeOutcome, RpcProbe};
pub use range::{MAX_RANGE_ADDRESSES, candidate_addresses, expand_range};
pub use scanner::{NetworkScanner, ScanReport, TargetRegistrar};
pub use store::{DiscoveryStore, YamlDiscoveryStore};

//! Device drivers.
//!
//! A driver knows how to recognise one device family from its identity blob
//! and how to turn that family's status payload into normalized readings.
//! Drivers never talk to the network; the scheduler fetches the payloads and
//! hands them in.

mod error;
pub mod models;
pub mod parse;
mod registry;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::channel::{ChannelDescriptor, ChannelKind};
use crate::identity::DeviceIdentity;
use crate::reading::{ChannelReading, DeviceReading};

pub use error::DriverError;
pub use registry::DriverRegistry;

/// Channel kinds a driver understands, with the valid indices for each.
pub type SupportedChannels = BTreeMap<ChannelKind, BTreeSet<u32>>;

/// Score returned on an exact identity match.
pub const EXACT_MATCH_SCORE: u32 = 100;

/// Capability interface implemented by every device driver.
pub trait DeviceDriver: Send + Sync {
    /// Stable identifier, e.g. `pro4pm_gen2`.
    fn id(&self) -> &'static str;

    /// Human readable name.
    fn name(&self) -> &'static str;

    /// How well this driver matches the identity. 0 means unsupported.
    fn score(&self, identity: &DeviceIdentity) -> Result<u32, DriverError>;

    fn supported_channels(&self, identity: &DeviceIdentity) -> SupportedChannels;

    /// Parse one present channel section.
    fn parse_channel(&self, kind: ChannelKind, index: u32, section: &Value) -> ChannelReading {
        match kind {
            ChannelKind::Switch => parse::parse_switch_section(section, index),
            ChannelKind::Light => parse::parse_light_section(section, index),
        }
    }

    /// Turn the configured channels into readings.
    ///
    /// Channels of an unsupported kind or index are skipped with a warning.
    /// Channels whose section is missing from the payload are skipped quietly
    /// (device still booting, component disabled). Suppression flags are
    /// applied before a reading is returned.
    fn parse_status(
        &self,
        status: &Value,
        identity: &DeviceIdentity,
        channels: &[ChannelDescriptor],
    ) -> Vec<ChannelReading> {
        let supported = self.supported_channels(identity);
        let mut readings = Vec::with_capacity(channels.len());

        for channel in channels {
            let Some(indices) = supported.get(&channel.kind) else {
                warn!(
                    driver = self.id(),
                    channel = %channel.status_key(),
                    "Channel type not supported by driver, skipping"
                );
                continue;
            };
            if !indices.contains(&channel.index) {
                warn!(
                    driver = self.id(),
                    channel = %channel.status_key(),
                    valid = ?indices,
                    "Channel index out of range for driver, skipping"
                );
                continue;
            }

            let key = channel.status_key();
            let Some(section) = status.get(&key).filter(|v| v.is_object()) else {
                debug!(driver = self.id(), channel = %key, "No status section for channel");
                continue;
            };

            let mut reading = self.parse_channel(channel.kind, channel.index, section);
            reading.apply_suppression(&channel.suppress);
            readings.push(reading);
        }

        readings
    }
}

impl fmt::Debug for dyn DeviceDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceDriver")
            .field("id", &self.id())
            .field("name", &self.name())
            .finish()
    }
}

/// Build the full reading for a successful poll.
///
/// Channel parsing goes through the driver; the system, network,
/// connectivity and input sections are read the same way for every device.
pub fn build_reading(
    driver: &dyn DeviceDriver,
    device: &str,
    poll_duration: Duration,
    status: &Value,
    identity: &DeviceIdentity,
    channels: &[ChannelDescriptor],
) -> DeviceReading {
    DeviceReading {
        channels: driver.parse_status(status, identity, channels),
        inputs: parse::parse_inputs(status),
        system: parse::parse_system(status),
        network: parse::parse_network(status),
        connectivity: parse::parse_connectivity(status),
        ..DeviceReading::reachable(device, poll_duration)
    }
}

/// Score helper for drivers that match on an exact `(gen, app)` pair.
pub fn exact_match(identity: &DeviceIdentity, generation: i64, app: &str) -> u32 {
    if identity.generation() == Some(generation) && identity.app() == Some(app) {
        EXACT_MATCH_SCORE
    } else {
        0
    }
}

/// A single channel kind with a contiguous index range.
pub fn channels_of(kind: ChannelKind, indices: impl IntoIterator<Item = u32>) -> SupportedChannels {
    BTreeMap::from([(kind, indices.into_iter().collect())])
}

use crate::channel::ChannelKind;
use crate::driver::{DeviceDriver, DriverError, SupportedChannels, channels_of, exact_match};
use crate::identity::DeviceIdentity;

/// Shelly Plug US Gen2 (`SNPL-00116US`).
#[derive(Debug, Clone, Copy, Default)]
pub struct PlugUsGen2;

impl DeviceDriver for PlugUsGen2 {
    fn id(&self) -> &'static str {
        "plugus_gen2"
    }

    fn name(&self) -> &'static str {
        "Shelly Plug US Gen2"
    }

    fn score(&self, identity: &DeviceIdentity) -> Result<u32, DriverError> {
        Ok(exact_match(identity, 2, "PlugUS"))
    }

    fn supported_channels(&self, _identity: &DeviceIdentity) -> SupportedChannels {
        channels_of(ChannelKind::Switch, [0])
    }
}

use crate::channel::ChannelKind;
use crate::driver::{DeviceDriver, DriverError, SupportedChannels, channels_of, exact_match};
use crate::identity::DeviceIdentity;

/// Shelly 1PM Gen4 (`S4SW-001P16EU`): one metered switch.
#[derive(Debug, Clone, Copy, Default)]
pub struct Shelly1PmGen4;

impl DeviceDriver for Shelly1PmGen4 {
    fn id(&self) -> &'static str {
        "s1pm_gen4"
    }

    fn name(&self) -> &'static str {
        "Shelly 1PM Gen4"
    }

    fn score(&self, identity: &DeviceIdentity) -> Result<u32, DriverError> {
        Ok(exact_match(identity, 4, "S1PMG4"))
    }

    fn supported_channels(&self, _identity: &DeviceIdentity) -> SupportedChannels {
        channels_of(ChannelKind::Switch, [0])
    }
}

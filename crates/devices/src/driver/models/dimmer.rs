use serde_json::Value;

use crate::channel::ChannelKind;
use crate::driver::parse::{field_f64, field_flag};
use crate::driver::{DeviceDriver, DriverError, SupportedChannels, channels_of, exact_match};
use crate::identity::DeviceIdentity;
use crate::reading::ChannelReading;

/// Shelly Dimmer 0/1-10V PM Gen3 (`S3DM-0010WW`). Exposes `light:0`, not a switch.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dimmer0110VpmGen3;

impl DeviceDriver for Dimmer0110VpmGen3 {
    fn id(&self) -> &'static str {
        "dimmer_0110vpm_g3"
    }

    fn name(&self) -> &'static str {
        "Shelly Dimmer 0/1-10V PM Gen3"
    }

    fn score(&self, identity: &DeviceIdentity) -> Result<u32, DriverError> {
        Ok(exact_match(identity, 3, "Dimmer0110VPMG3"))
    }

    fn supported_channels(&self, _identity: &DeviceIdentity) -> SupportedChannels {
        channels_of(ChannelKind::Light, [0])
    }
}

/// Shelly Plus Wall Dimmer US Gen2 (`SNDM-0013US`).
///
/// Has no metering: only the output state and brightness are reported.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlusWallDimmerGen2;

impl DeviceDriver for PlusWallDimmerGen2 {
    fn id(&self) -> &'static str {
        "pluswalldimmer_gen2"
    }

    fn name(&self) -> &'static str {
        "Shelly Plus Wall Dimmer US Gen2"
    }

    fn score(&self, identity: &DeviceIdentity) -> Result<u32, DriverError> {
        Ok(exact_match(identity, 2, "PlusWallDimmer"))
    }

    fn supported_channels(&self, _identity: &DeviceIdentity) -> SupportedChannels {
        channels_of(ChannelKind::Light, [0])
    }

    fn parse_channel(&self, kind: ChannelKind, index: u32, section: &Value) -> ChannelReading {
        ChannelReading {
            output: field_flag(section, "output"),
            brightness: field_f64(section, "brightness"),
            ..ChannelReading::new(kind, index)
        }
    }
}

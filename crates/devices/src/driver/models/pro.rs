use crate::channel::ChannelKind;
use crate::driver::{DeviceDriver, DriverError, SupportedChannels, channels_of, exact_match};
use crate::identity::DeviceIdentity;

/// Shelly Pro 4PM Gen2 (`SPSW-104PE16EU`): four metered switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pro4PmGen2;

impl DeviceDriver for Pro4PmGen2 {
    fn id(&self) -> &'static str {
        "pro4pm_gen2"
    }

    fn name(&self) -> &'static str {
        "Shelly Pro 4PM Gen2"
    }

    fn score(&self, identity: &DeviceIdentity) -> Result<u32, DriverError> {
        Ok(exact_match(identity, 2, "Pro4PM"))
    }

    fn supported_channels(&self, _identity: &DeviceIdentity) -> SupportedChannels {
        channels_of(ChannelKind::Switch, 0..4)
    }
}

/// Shelly Pro 2PM Gen2 (`SPSW-102...`): two metered switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pro2PmGen2;

impl DeviceDriver for Pro2PmGen2 {
    fn id(&self) -> &'static str {
        "pro2pm_gen2"
    }

    fn name(&self) -> &'static str {
        "Shelly Pro 2PM Gen2"
    }

    fn score(&self, identity: &DeviceIdentity) -> Result<u32, DriverError> {
        Ok(exact_match(identity, 2, "Pro2PM"))
    }

    fn supported_channels(&self, _identity: &DeviceIdentity) -> SupportedChannels {
        channels_of(ChannelKind::Switch, 0..2)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::channel::ChannelDescriptor;

    fn identity(value: serde_json::Value) -> DeviceIdentity {
        DeviceIdentity::from_value(value).unwrap()
    }

    #[test]
    fn test_pro4pm_scoring() {
        let exact = identity(json!({"model": "SPSW-104PE16EU", "gen": 2, "app": "Pro4PM"}));
        assert_eq!(Pro4PmGen2.score(&exact).unwrap(), 100);
        assert_eq!(Pro2PmGen2.score(&exact).unwrap(), 0);

        let wrong_gen = identity(json!({"gen": 3, "app": "Pro4PM"}));
        assert_eq!(Pro4PmGen2.score(&wrong_gen).unwrap(), 0);
    }

    #[test]
    fn test_pro4pm_all_channels() {
        let status = json!({
            "switch:0": {"output": true, "apower": 10.0},
            "switch:1": {"output": false, "apower": 0.0},
            "switch:2": {"output": true, "apower": 20.0},
            "switch:3": {"output": false, "apower": 0.0}
        });
        let channels: Vec<_> = (0..4).map(ChannelDescriptor::switch).collect();

        let readings = Pro4PmGen2.parse_status(&status, &DeviceIdentity::default(), &channels);
        assert_eq!(readings.len(), 4);
        assert_eq!(readings[2].apower_w, Some(20.0));
        assert_eq!(readings[3].output_value(), Some(0.0));
    }

    #[test]
    fn test_pro2pm_rejects_index_two() {
        let status = json!({
            "switch:1": {"output": true},
            "switch:2": {"output": true}
        });
        let channels = [ChannelDescriptor::switch(1), ChannelDescriptor::switch(2)];

        let readings = Pro2PmGen2.parse_status(&status, &DeviceIdentity::default(), &channels);
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].index, 1);
    }
}

use crate::driver::{DeviceDriver, DriverError, SupportedChannels, exact_match};
use crate::identity::DeviceIdentity;

/// Shelly BLU Gateway Gen2 (`SNGW-BT01`).
///
/// No switch or light channels. Polled for system, network and
/// connectivity data only.
#[derive(Debug, Clone, Copy, Default)]
pub struct BluGwGen2;

impl DeviceDriver for BluGwGen2 {
    fn id(&self) -> &'static str {
        "blugw_gen2"
    }

    fn name(&self) -> &'static str {
        "Shelly BLU Gateway Gen2"
    }

    fn score(&self, identity: &DeviceIdentity) -> Result<u32, DriverError> {
        Ok(exact_match(identity, 2, "BluGw"))
    }

    fn supported_channels(&self, _identity: &DeviceIdentity) -> SupportedChannels {
        SupportedChannels::new()
    }
}

/// Shelly BLU Gateway Gen3 (`S3GW-1DBT001`).
#[derive(Debug, Clone, Copy, Default)]
pub struct BluGwGen3;

impl DeviceDriver for BluGwGen3 {
    fn id(&self) -> &'static str {
        "blugw_gen3"
    }

    fn name(&self) -> &'static str {
        "Shelly BLU Gateway Gen3"
    }

    fn score(&self, identity: &DeviceIdentity) -> Result<u32, DriverError> {
        Ok(exact_match(identity, 3, "BluGwG3"))
    }

    fn supported_channels(&self, _identity: &DeviceIdentity) -> SupportedChannels {
        SupportedChannels::new()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::channel::ChannelDescriptor;

    #[test]
    fn test_gateways_return_no_channels() {
        let status = json!({
            "blugw": {},
            "script:1": {"id": 1, "running": true},
            "sys": {"uptime": 100}
        });
        let channels = [ChannelDescriptor::switch(0)];

        assert!(BluGwGen2
            .parse_status(&status, &DeviceIdentity::default(), &channels)
            .is_empty());
        assert!(BluGwGen3
            .parse_status(&status, &DeviceIdentity::default(), &[])
            .is_empty());
    }

    #[test]
    fn test_gateway_generations_are_distinct() {
        let gen3 = DeviceIdentity::from_value(json!({"gen": 3, "app": "BluGwG3"})).unwrap();
        assert_eq!(BluGwGen3.score(&gen3).unwrap(), 100);
        assert_eq!(BluGwGen2.score(&gen3).unwrap(), 0);
    }
}

use std::sync::LazyLock;

use regex::Regex;

use super::DiscoveredDevice;

static UNSAFE_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9_-]").unwrap());

fn sanitize(value: &str) -> String {
    UNSAFE_CHARS
        .replace_all(&value.to_lowercase(), "_")
        .into_owned()
}

/// Render a target name for a discovered device.
///
/// Placeholders: `{ip}` (dots become underscores), `{model}`, `{gen}`,
/// `{app}`, `{mac}` and `{id}`. String values are lower-cased and reduced
/// to `[a-z0-9_-]`.
pub fn format_device_name(template: &str, device: &DiscoveredDevice) -> String {
    template
        .replace("{ip}", &device.address.replace('.', "_"))
        .replace("{model}", &sanitize(device.model()))
        .replace("{gen}", &device.generation().to_string())
        .replace("{app}", &sanitize(device.app()))
        .replace("{mac}", &sanitize(device.mac()))
        .replace("{id}", &sanitize(device.id()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use shelly_devices::DeviceIdentity;

    use super::*;

    fn device() -> DiscoveredDevice {
        let identity = DeviceIdentity::from_value(json!({
            "id": "shellypro4pm-AABBCC",
            "model": "SPSW-104PE16EU",
            "gen": 2,
            "app": "Pro4PM",
            "mac": "AA:BB:CC",
        }))
        .unwrap();
        DiscoveredDevice::new("10.0.80.22", identity)
    }

    #[test]
    fn test_default_template() {
        assert_eq!(
            format_device_name("shelly_{ip}_{model}", &device()),
            "shelly_10_0_80_22_spsw-104pe16eu"
        );
    }

    #[test]
    fn test_all_placeholders() {
        assert_eq!(
            format_device_name("{app}-g{gen}-{mac}-{id}", &device()),
            "pro4pm-g2-aa_bb_cc-shellypro4pm-aabbcc"
        );
    }

    #[test]
    fn test_missing_fields_render_unknown() {
        let bare = DiscoveredDevice::new("10.0.0.1", DeviceIdentity::default());
        assert_eq!(format_device_name("{model}_{gen}", &bare), "unknown_0");
    }
}

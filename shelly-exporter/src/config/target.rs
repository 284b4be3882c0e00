use serde::{Deserialize, Serialize};
use shelly_devices::{ChannelDescriptor, Credentials};
use tracing::warn;

/// Strip the scheme and any trailing slash so `http://10.0.0.5/` and
/// `10.0.0.5` compare equal.
pub fn normalize_address(address: &str) -> String {
    let trimmed = address.trim();
    let without_scheme = trimmed
        .strip_prefix("http://")
        .or_else(|| trimmed.strip_prefix("https://"))
        .unwrap_or(trimmed);
    without_scheme.trim_end_matches('/').to_string()
}

/// One monitored device.
///
/// `name` is the identity key across reloads. The address is written as
/// `url` and accepted as either `url` or `address`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawTarget")]
pub struct TargetDescriptor {
    pub name: String,
    #[serde(rename = "url")]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
    #[serde(default)]
    pub channels: Vec<ChannelDescriptor>,
    /// Set on targets created by network discovery.
    #[serde(default)]
    pub discovered: bool,
}

impl TargetDescriptor {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            poll_interval_seconds: None,
            credentials: None,
            channels: Vec::new(),
            discovered: false,
        }
    }

    pub fn with_channels(mut self, channels: Vec<ChannelDescriptor>) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_poll_interval(mut self, seconds: u64) -> Self {
        self.poll_interval_seconds = Some(seconds);
        self
    }

    pub fn mark_discovered(mut self) -> Self {
        self.discovered = true;
        self
    }

    pub fn normalized_address(&self) -> String {
        normalize_address(&self.address)
    }
}

#[derive(Deserialize)]
struct RawTarget {
    name: String,
    #[serde(alias = "address")]
    url: String,
    #[serde(default)]
    poll_interval_seconds: Option<u64>,
    #[serde(default)]
    credentials: Option<Credentials>,
    #[serde(default)]
    channels: Vec<ChannelDescriptor>,
    #[serde(default)]
    target_meters: Option<Vec<LegacyMeter>>,
    #[serde(default)]
    discovered: bool,
}

/// Entry of the deprecated `target_meters` list: a bare switch index or a
/// channel table without a `type`.
#[derive(Deserialize)]
#[serde(untagged)]
enum LegacyMeter {
    Index(u32),
    Channel(ChannelDescriptor),
}

impl From<RawTarget> for TargetDescriptor {
    fn from(raw: RawTarget) -> Self {
        let mut channels = raw.channels;
        if let Some(meters) = raw.target_meters {
            warn!(
                device = %raw.name,
                "Target uses deprecated 'target_meters', migrate to 'channels' with type 'switch'"
            );
            channels.extend(meters.into_iter().map(|meter| match meter {
                LegacyMeter::Index(index) => ChannelDescriptor::switch(index),
                LegacyMeter::Channel(channel) => channel,
            }));
        }

        Self {
            name: raw.name,
            address: raw.url,
            poll_interval_seconds: raw.poll_interval_seconds,
            credentials: raw.credentials,
            channels,
            discovered: raw.discovered,
        }
    }
}

#[cfg(test)]
mod tests {
    use shelly_devices::ChannelKind;

    use super::*;

    #[test]
    fn test_normalize_address() {
        assert_eq!(normalize_address("http://10.0.80.22/"), "10.0.80.22");
        assert_eq!(normalize_address("https://plug.local"), "plug.local");
        assert_eq!(normalize_address("10.0.80.22"), "10.0.80.22");
        assert_eq!(normalize_address(" 10.0.80.22:8080// "), "10.0.80.22:8080");
    }

    #[test]
    fn test_url_and_address_keys() {
        let from_url: TargetDescriptor =
            serde_yaml::from_str("name: plug\nurl: http://10.0.0.5\n").unwrap();
        let from_address: TargetDescriptor =
            serde_yaml::from_str("name: plug\naddress: http://10.0.0.5\n").unwrap();
        assert_eq!(from_url, from_address);
        assert_eq!(from_url.address, "http://10.0.0.5");
        assert!(!from_url.discovered);
    }

    #[test]
    fn test_legacy_target_meters() {
        let yaml = r#"
name: pro
url: 10.0.0.7
channels:
  - type: light
    index: 0
target_meters: [0, 2, {index: 3, ignore_voltage: true}]
"#;
        let target: TargetDescriptor = serde_yaml::from_str(yaml).unwrap();
        let keys: Vec<_> = target.channels.iter().map(|c| c.status_key()).collect();
        assert_eq!(keys, vec!["light:0", "switch:0", "switch:2", "switch:3"]);
        assert_eq!(target.channels[3].kind, ChannelKind::Switch);
        assert!(target.channels[3].suppress.ignore_voltage);
    }

    #[test]
    fn test_serializes_address_as_url() {
        let target = TargetDescriptor::new("plug", "10.0.0.5")
            .with_channels(vec![ChannelDescriptor::switch(0)])
            .mark_discovered();
        let yaml = serde_yaml::to_string(&target).unwrap();
        assert!(yaml.contains("url:"));
        assert!(yaml.contains("10.0.0.5"));
        assert!(yaml.contains("discovered: true"));
        assert!(!yaml.contains("credentials"));

        let back: TargetDescriptor = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, target);
    }
}

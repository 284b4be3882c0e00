use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use shelly_devices::DeviceIdentity;

const UNKNOWN: &str = "unknown";

/// A device found by a scan, before promotion to a target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveredDevice {
    pub address: String,
    pub identity: DeviceIdentity,
    pub discovered_at: DateTime<Utc>,
}

impl DiscoveredDevice {
    pub fn new(address: impl Into<String>, identity: DeviceIdentity) -> Self {
        Self {
            address: address.into(),
            identity,
            discovered_at: Utc::now(),
        }
    }

    /// Placeholder for an address restored from the discovery store.
    pub fn persisted(address: impl Into<String>) -> Self {
        let identity = DeviceIdentity::from_value(json!({
            "model": "persisted",
            "gen": 0,
            "app": UNKNOWN,
        }))
        .unwrap_or_default();
        Self::new(address, identity)
    }

    pub fn model(&self) -> &str {
        self.identity.model().unwrap_or(UNKNOWN)
    }

    pub fn generation(&self) -> i64 {
        self.identity.generation().unwrap_or(0)
    }

    pub fn app(&self) -> &str {
        self.identity.app().unwrap_or(UNKNOWN)
    }

    pub fn mac(&self) -> &str {
        self.identity.mac().unwrap_or(UNKNOWN)
    }

    pub fn id(&self) -> &str {
        self.identity.device_id().unwrap_or(UNKNOWN)
    }
}

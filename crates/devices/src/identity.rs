//! Device identity blob as reported by `Shelly.GetDeviceInfo`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opaque device-reported metadata.
///
/// Only drivers interpret the fields; everything else passes the blob
/// through untouched. The typed accessors are tolerant and return `None`
/// when a field is missing or has an unexpected type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceIdentity(Map<String, Value>);

impl DeviceIdentity {
    /// Wrap a JSON value. Returns `None` unless it is an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Hardware model string, e.g. `SPSW-104PE16EU`.
    pub fn model(&self) -> Option<&str> {
        self.get("model").and_then(Value::as_str)
    }

    /// Protocol generation (`gen`).
    pub fn generation(&self) -> Option<i64> {
        self.get("gen").and_then(Value::as_i64)
    }

    /// Application / firmware family (`app`), e.g. `Pro4PM`.
    pub fn app(&self) -> Option<&str> {
        self.get("app").and_then(Value::as_str)
    }

    /// Hardware address (`mac`).
    pub fn mac(&self) -> Option<&str> {
        self.get("mac").and_then(Value::as_str)
    }

    /// Device id, e.g. `shellypro4pm-aabbccddeeff`.
    pub fn device_id(&self) -> Option<&str> {
        self.get("id").and_then(Value::as_str)
    }

    /// Firmware version string (`ver`).
    pub fn firmware(&self) -> Option<&str> {
        self.get("ver").and_then(Value::as_str)
    }

    /// Whether the blob carries at least a model or a generation field.
    pub fn looks_like_device(&self) -> bool {
        self.0.contains_key("model") || self.0.contains_key("gen")
    }
}

impl From<Map<String, Value>> for DeviceIdentity {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

//! Tolerant accessors over raw `Shelly.GetStatus` payloads.
//!
//! Missing keys, `null`s and values of the wrong type all collapse to `None`.
//! Nothing in here panics or returns an error.

use serde_json::Value;

use crate::channel::ChannelKind;
use crate::reading::{
    ChannelReading, ConnectivityReading, InputReading, NetworkReading, SystemReading,
};

/// Convert a JSON value into a float. Numeric strings are accepted.
pub fn to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Interpret a JSON value as a flag. `null` means unknown.
pub fn to_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(*b),
        Value::Number(n) => Some(n.as_f64().is_some_and(|v| v != 0.0)),
        Value::String(s) => Some(!s.is_empty()),
        Value::Array(a) => Some(!a.is_empty()),
        Value::Object(o) => Some(!o.is_empty()),
    }
}

pub fn field_f64(section: &Value, key: &str) -> Option<f64> {
    section.get(key).and_then(to_f64)
}

pub fn field_flag(section: &Value, key: &str) -> Option<bool> {
    section.get(key).and_then(to_flag)
}

pub fn field_str(section: &Value, key: &str) -> Option<String> {
    section.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Read `section[outer][inner]` as a float, e.g. `aenergy.total`.
pub fn nested_f64(section: &Value, outer: &str, inner: &str) -> Option<f64> {
    section
        .get(outer)
        .filter(|v| v.is_object())
        .and_then(|v| field_f64(v, inner))
}

/// Return a non-empty object section, or `None`.
fn object_section<'a>(status: &'a Value, key: &str) -> Option<&'a Value> {
    status
        .get(key)
        .filter(|v| v.as_object().is_some_and(|o| !o.is_empty()))
}

/// Parse a `switch:N` section.
pub fn parse_switch_section(section: &Value, index: u32) -> ChannelReading {
    ChannelReading {
        kind: ChannelKind::Switch,
        index,
        output: field_flag(section, "output"),
        apower_w: field_f64(section, "apower"),
        voltage_v: field_f64(section, "voltage"),
        freq_hz: field_f64(section, "freq"),
        current_a: field_f64(section, "current"),
        pf: field_f64(section, "pf"),
        temp_c: nested_f64(section, "temperature", "tC"),
        aenergy_wh: nested_f64(section, "aenergy", "total"),
        ret_aenergy_wh: nested_f64(section, "ret_aenergy", "total"),
        brightness: None,
    }
}

/// Parse a `light:N` section. Lights never report returned energy.
pub fn parse_light_section(section: &Value, index: u32) -> ChannelReading {
    ChannelReading {
        kind: ChannelKind::Light,
        index,
        output: field_flag(section, "output"),
        apower_w: field_f64(section, "apower"),
        voltage_v: field_f64(section, "voltage"),
        freq_hz: field_f64(section, "freq"),
        current_a: field_f64(section, "current"),
        pf: field_f64(section, "pf"),
        temp_c: nested_f64(section, "temperature", "tC"),
        aenergy_wh: nested_f64(section, "aenergy", "total"),
        ret_aenergy_wh: None,
        brightness: field_f64(section, "brightness"),
    }
}

/// Parse the `sys` section.
pub fn parse_system(status: &Value) -> Option<SystemReading> {
    let sys = object_section(status, "sys")?;
    Some(SystemReading {
        uptime_seconds: field_f64(sys, "uptime"),
        ram_size_bytes: field_f64(sys, "ram_size"),
        ram_free_bytes: field_f64(sys, "ram_free"),
        ram_min_free_bytes: field_f64(sys, "ram_min_free"),
        fs_size_bytes: field_f64(sys, "fs_size"),
        fs_free_bytes: field_f64(sys, "fs_free"),
        restart_required: field_flag(sys, "restart_required"),
        cfg_rev: field_f64(sys, "cfg_rev"),
        unixtime: field_f64(sys, "unixtime"),
    })
}

/// Parse the `wifi` section.
///
/// The station counts as connected when it holds an address or reports
/// `status == "got ip"`.
pub fn parse_network(status: &Value) -> Option<NetworkReading> {
    let wifi = object_section(status, "wifi")?;
    let sta_ip = field_str(wifi, "sta_ip").filter(|ip| !ip.is_empty());
    let got_ip = wifi.get("status").and_then(Value::as_str) == Some("got ip");

    Some(NetworkReading {
        rssi_dbm: field_f64(wifi, "rssi"),
        connected: sta_ip.is_some() || got_ip,
        sta_ip,
        ssid: field_str(wifi, "ssid"),
    })
}

/// Parse `cloud.connected` and `mqtt.connected`.
pub fn parse_connectivity(status: &Value) -> Option<ConnectivityReading> {
    let connected = |key: &str| {
        status
            .get(key)
            .filter(|v| v.is_object())
            .and_then(|v| v.get("connected"))
            .map(|v| to_flag(v).unwrap_or(false))
    };

    let cloud_connected = connected("cloud");
    let mqtt_connected = connected("mqtt");
    if cloud_connected.is_none() && mqtt_connected.is_none() {
        return None;
    }

    Some(ConnectivityReading {
        cloud_connected,
        mqtt_connected,
    })
}

/// Collect every `input:N` section, sorted by index.
pub fn parse_inputs(status: &Value) -> Vec<InputReading> {
    let Some(map) = status.as_object() else {
        return Vec::new();
    };

    let mut inputs: Vec<InputReading> = map
        .iter()
        .filter(|(_, value)| value.is_object())
        .filter_map(|(key, value)| {
            let index = key.strip_prefix("input:")?.parse::<u32>().ok()?;
            Some(InputReading {
                index,
                state: field_flag(value, "state"),
            })
        })
        .collect();

    inputs.sort_by_key(|input| input.index);
    inputs
}

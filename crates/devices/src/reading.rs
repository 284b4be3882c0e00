//! Normalized reading model.
//!
//! Every numeric field is independently optional: `None` means "not reported
//! by this device or firmware", never zero.

use std::time::Duration;

use serde::Serialize;

use crate::channel::{ChannelKind, FieldSuppression};

/// Reading for one switch or light channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChannelReading {
    pub kind: ChannelKind,
    pub index: u32,
    pub output: Option<bool>,
    pub apower_w: Option<f64>,
    pub voltage_v: Option<f64>,
    pub freq_hz: Option<f64>,
    pub current_a: Option<f64>,
    pub pf: Option<f64>,
    pub temp_c: Option<f64>,
    pub aenergy_wh: Option<f64>,
    pub ret_aenergy_wh: Option<f64>,
    /// Brightness in percent (lights only).
    pub brightness: Option<f64>,
}

impl ChannelReading {
    pub fn new(kind: ChannelKind, index: u32) -> Self {
        Self {
            kind,
            index,
            ..Default::default()
        }
    }

    /// Output state as a gauge value: 1.0 on, 0.0 off.
    pub fn output_value(&self) -> Option<f64> {
        self.output.map(|on| if on { 1.0 } else { 0.0 })
    }

    /// Clear every field the channel configuration suppresses.
    pub fn apply_suppression(&mut self, suppress: &FieldSuppression) {
        if suppress.ignore_output {
            self.output = None;
        }
        if suppress.ignore_active_power {
            self.apower_w = None;
        }
        if suppress.ignore_voltage {
            self.voltage_v = None;
        }
        if suppress.ignore_frequency {
            self.freq_hz = None;
        }
        if suppress.ignore_current {
            self.current_a = None;
        }
        if suppress.ignore_power_factor {
            self.pf = None;
        }
        if suppress.ignore_temperature {
            self.temp_c = None;
        }
        if suppress.ignore_total_active_energy {
            self.aenergy_wh = None;
        }
        if suppress.ignore_total_returned_active_energy {
            self.ret_aenergy_wh = None;
        }
        if suppress.ignore_brightness {
            self.brightness = None;
        }
    }
}

/// Digital input state (`input:N`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputReading {
    pub index: u32,
    pub state: Option<bool>,
}

/// Device-level system section (`sys`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SystemReading {
    pub uptime_seconds: Option<f64>,
    pub ram_size_bytes: Option<f64>,
    pub ram_free_bytes: Option<f64>,
    pub ram_min_free_bytes: Option<f64>,
    pub fs_size_bytes: Option<f64>,
    pub fs_free_bytes: Option<f64>,
    pub restart_required: Option<bool>,
    pub cfg_rev: Option<f64>,
    pub unixtime: Option<f64>,
}

/// Wireless network section (`wifi`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NetworkReading {
    pub rssi_dbm: Option<f64>,
    pub connected: bool,
    pub sta_ip: Option<String>,
    pub ssid: Option<String>,
}

/// Cloud / MQTT relay connection flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConnectivityReading {
    pub cloud_connected: Option<bool>,
    pub mqtt_connected: Option<bool>,
}

/// Result of one poll attempt for one target.
///
/// Produced for failures too (`reachable == false`), so consumers see a
/// continuous series instead of silence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceReading {
    pub device: String,
    pub reachable: bool,
    pub poll_duration: Duration,
    pub error: Option<String>,
    pub channels: Vec<ChannelReading>,
    pub inputs: Vec<InputReading>,
    pub system: Option<SystemReading>,
    pub network: Option<NetworkReading>,
    pub connectivity: Option<ConnectivityReading>,
}

impl DeviceReading {
    /// A reading for a reachable device with no sections filled in yet.
    pub fn reachable(device: impl Into<String>, poll_duration: Duration) -> Self {
        Self {
            device: device.into(),
            reachable: true,
            poll_duration,
            error: None,
            channels: Vec::new(),
            inputs: Vec::new(),
            system: None,
            network: None,
            connectivity: None,
        }
    }

    /// A reading for a failed poll.
    pub fn unreachable(
        device: impl Into<String>,
        poll_duration: Duration,
        error: impl Into<String>,
    ) -> Self {
        Self {
            reachable: false,
            error: Some(error.into()),
            ..Self::reachable(device, poll_duration)
        }
    }
}

//! Configured channel descriptors.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of an output channel on a device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    #[default]
    Switch,
    Light,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Switch => "switch",
            Self::Light => "light",
        }
    }

    /// Status section key for a channel of this kind, e.g. `switch:0`.
    pub fn status_key(&self, index: u32) -> String {
        format!("{}:{}", self.as_str(), index)
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "switch" => Ok(Self::Switch),
            "light" => Ok(Self::Light),
            other => Err(format!("unknown channel type '{other}'")),
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Per-field suppression flags for one channel.
///
/// A set flag drops the corresponding normalized field before the reading
/// is forwarded downstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSuppression {
    #[serde(default, skip_serializing_if = "is_false")]
    pub ignore_voltage: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub ignore_current: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub ignore_active_power: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub ignore_power_factor: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub ignore_frequency: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub ignore_total_active_energy: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub ignore_total_returned_active_energy: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub ignore_temperature: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub ignore_output: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub ignore_brightness: bool,
}

/// One configured channel of a target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    #[serde(rename = "type", default)]
    pub kind: ChannelKind,
    #[serde(default)]
    pub index: u32,
    #[serde(flatten)]
    pub suppress: FieldSuppression,
}

impl ChannelDescriptor {
    pub fn new(kind: ChannelKind, index: u32) -> Self {
        Self {
            kind,
            index,
            suppress: FieldSuppression::default(),
        }
    }

    pub fn switch(index: u32) -> Self {
        Self::new(ChannelKind::Switch, index)
    }

    pub fn light(index: u32) -> Self {
        Self::new(ChannelKind::Light, index)
    }

    pub fn with_suppression(mut self, suppress: FieldSuppression) -> Self {
        self.suppress = suppress;
        self
    }

    pub fn status_key(&self) -> String {
        self.kind.status_key(self.index)
    }
}

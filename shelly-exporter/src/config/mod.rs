//! Exporter configuration.
//!
//! Loaded from YAML, validated once, then shared as `Arc<Config>`. Every
//! field has a default so a minimal file only needs `targets`.

mod target;

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shelly_devices::Credentials;

use crate::utils::fs::io_error;
use crate::{Error, Result};

pub use target::{TargetDescriptor, normalize_address};

/// Config file used when neither `--config` nor `CONFIG_PATH` is given.
pub const DEFAULT_CONFIG_PATH: &str = "/config/config.yml";

pub const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 10;
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 3;
pub const DEFAULT_MAX_CONCURRENCY: usize = 50;
pub const DEFAULT_DEVICE_INFO_REFRESH_SECONDS: u64 = 6 * 60 * 60;
pub const DEFAULT_BACKOFF_BASE_SECONDS: f64 = 30.0;
pub const DEFAULT_BACKOFF_MAX_SECONDS: f64 = 300.0;
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_LISTEN_PORT: u16 = 10037;

pub const DEFAULT_SCAN_INTERVAL_SECONDS: u64 = 3600;
pub const DEFAULT_SCAN_TIMEOUT_SECONDS: f64 = 2.0;
pub const DEFAULT_SCAN_CONCURRENCY: usize = 20;
pub const DEFAULT_NAME_TEMPLATE: &str = "shelly_{ip}_{model}";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    #[serde(alias = "debug", alias = "TRACE", alias = "trace")]
    Debug,
    #[default]
    #[serde(alias = "info")]
    Info,
    #[serde(alias = "warning", alias = "WARN", alias = "warn")]
    Warning,
    #[serde(alias = "error")]
    Error,
}

impl LogLevel {
    /// Level name as understood by `EnvFilter`.
    pub fn as_directive(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_directive())
    }
}

/// Network discovery settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub enabled: bool,
    pub scan_interval_seconds: u64,
    /// CIDR blocks, `start-end` ranges or single addresses.
    pub network_ranges: Vec<String>,
    pub scan_timeout_seconds: f64,
    pub scan_concurrency: usize,
    pub auto_add_discovered: bool,
    pub auto_add_credentials: Option<Credentials>,
    pub exclude_ips: Vec<String>,
    /// Supports `{ip}`, `{model}`, `{gen}`, `{app}`, `{mac}` and `{id}`.
    pub name_template: String,
    /// Where discovered targets are persisted. Nothing is written when unset.
    pub persist_path: Option<PathBuf>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            scan_interval_seconds: DEFAULT_SCAN_INTERVAL_SECONDS,
            network_ranges: Vec::new(),
            scan_timeout_seconds: DEFAULT_SCAN_TIMEOUT_SECONDS,
            scan_concurrency: DEFAULT_SCAN_CONCURRENCY,
            auto_add_discovered: true,
            auto_add_credentials: None,
            exclude_ips: Vec::new(),
            name_template: DEFAULT_NAME_TEMPLATE.to_string(),
            persist_path: None,
        }
    }
}

impl DiscoveryConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_seconds)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.scan_timeout_seconds)
            .unwrap_or(Duration::from_secs_f64(DEFAULT_SCAN_TIMEOUT_SECONDS))
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: LogLevel,
    /// Emit JSON log lines instead of the human readable format.
    pub log_json: bool,
    /// Also write daily-rotated log files into this directory.
    pub log_dir: Option<PathBuf>,
    pub listen_host: String,
    pub listen_port: u16,
    pub poll_interval_seconds: u64,
    pub request_timeout_seconds: u64,
    pub max_concurrency: usize,
    pub default_credentials: Credentials,
    pub targets: Vec<TargetDescriptor>,
    pub discovery: DiscoveryConfig,
    pub device_info_refresh_seconds: u64,
    pub backoff_base_seconds: f64,
    pub backoff_max_seconds: f64,
    pub backoff_multiplier: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            log_json: false,
            log_dir: None,
            listen_host: "0.0.0.0".to_string(),
            listen_port: DEFAULT_LISTEN_PORT,
            poll_interval_seconds: DEFAULT_POLL_INTERVAL_SECONDS,
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            default_credentials: Credentials::default(),
            targets: Vec::new(),
            discovery: DiscoveryConfig::default(),
            device_info_refresh_seconds: DEFAULT_DEVICE_INFO_REFRESH_SECONDS,
            backoff_base_seconds: DEFAULT_BACKOFF_BASE_SECONDS,
            backoff_max_seconds: DEFAULT_BACKOFF_MAX_SECONDS,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl Config {
    /// Parse and validate a YAML document. An empty document yields defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str::<Self>(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path).map_err(|e| io_error("reading", path, e))?;
        Self::from_yaml_str(&yaml)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_seconds == 0 {
            return Err(Error::config("poll_interval_seconds must be greater than 0"));
        }
        if self.request_timeout_seconds == 0 {
            return Err(Error::config("request_timeout_seconds must be greater than 0"));
        }
        if self.max_concurrency == 0 {
            return Err(Error::config("max_concurrency must be greater than 0"));
        }
        if self.device_info_refresh_seconds == 0 {
            return Err(Error::config("device_info_refresh_seconds must be greater than 0"));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(Error::config("backoff_multiplier must be at least 1"));
        }
        if !self.backoff_base_seconds.is_finite() || self.backoff_base_seconds < 0.0 {
            return Err(Error::config("backoff_base_seconds must not be negative"));
        }
        if !self.backoff_max_seconds.is_finite() || self.backoff_base_seconds > self.backoff_max_seconds {
            return Err(Error::config(
                "backoff_base_seconds must not exceed backoff_max_seconds",
            ));
        }

        let mut names = HashSet::new();
        for target in &self.targets {
            if target.name.trim().is_empty() {
                return Err(Error::config("target name must not be empty"));
            }
            if target.address.trim().is_empty() {
                return Err(Error::config(format!(
                    "target '{}' has an empty url",
                    target.name
                )));
            }
            if !names.insert(target.name.as_str()) {
                return Err(Error::config(format!(
                    "duplicate target name '{}'",
                    target.name
                )));
            }
        }

        let discovery = &self.discovery;
        if discovery.scan_interval_seconds == 0 {
            return Err(Error::config("discovery.scan_interval_seconds must be greater than 0"));
        }
        if discovery.scan_concurrency == 0 {
            return Err(Error::config("discovery.scan_concurrency must be greater than 0"));
        }
        if !discovery.scan_timeout_seconds.is_finite() || discovery.scan_timeout_seconds <= 0.0 {
            return Err(Error::config("discovery.scan_timeout_seconds must be greater than 0"));
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn device_info_refresh(&self) -> Duration {
        Duration::from_secs(self.device_info_refresh_seconds)
    }

    /// Effective poll interval: target override, then global.
    pub fn target_poll_interval(&self, target: &TargetDescriptor) -> Duration {
        target
            .poll_interval_seconds
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.poll_interval())
    }

    /// Effective credentials: target, then global default, then none.
    pub fn target_credentials(&self, target: &TargetDescriptor) -> Option<Credentials> {
        target
            .credentials
            .as_ref()
            .filter(|c| c.has_credentials())
            .or_else(|| Some(&self.default_credentials).filter(|c| c.has_credentials()))
            .cloned()
    }

    /// Credentials for probing and for auto-added targets.
    pub fn discovery_credentials(&self) -> Option<Credentials> {
        self.discovery
            .auto_add_credentials
            .as_ref()
            .filter(|c| c.has_credentials())
            .or_else(|| Some(&self.default_credentials).filter(|c| c.has_credentials()))
            .cloned()
    }

    /// Normalized addresses of every configured target.
    pub fn configured_addresses(&self) -> HashSet<String> {
        self.targets
            .iter()
            .map(TargetDescriptor::normalized_address)
            .collect()
    }
}

//! In-memory metrics collector.
//!
//! Keeps the latest reading per device plus engine counters.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use shelly_devices::DeviceReading;

use super::MetricsSink;
use crate::config::TargetDescriptor;
use crate::discovery::{DiscoveredDevice, ScanReport};

/// Latest state of one polled device.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceMetrics {
    pub address: String,
    pub discovered: bool,
    pub up: bool,
    pub last_poll_duration: Duration,
    pub last_success: Option<DateTime<Utc>>,
    pub polls_total: u64,
    pub poll_errors: u64,
    /// Suppressed fields are already stripped by the driver.
    pub last_reading: DeviceReading,
}

/// Metrics collector for the exporter.
#[derive(Debug)]
pub struct MetricsCollector {
    // Poll metrics
    polls_total: AtomicU64,
    poll_errors_total: AtomicU64,
    devices: DashMap<String, DeviceMetrics>,

    // Discovery metrics
    scans_started: AtomicU64,
    scans_completed: AtomicU64,
    scan_errors: AtomicU64,
    last_scan_duration_ms: AtomicU64,
    devices_discovered_total: AtomicU64,
    discovered: DashMap<String, DiscoveredDevice>,

    // Config metrics
    config_reloads_success: AtomicU64,
    config_reloads_failed: AtomicU64,
}

impl MetricsCollector {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self {
            polls_total: AtomicU64::new(0),
            poll_errors_total: AtomicU64::new(0),
            devices: DashMap::new(),
            scans_started: AtomicU64::new(0),
            scans_completed: AtomicU64::new(0),
            scan_errors: AtomicU64::new(0),
            last_scan_duration_ms: AtomicU64::new(0),
            devices_discovered_total: AtomicU64::new(0),
            discovered: DashMap::new(),
            config_reloads_success: AtomicU64::new(0),
            config_reloads_failed: AtomicU64::new(0),
        }
    }

    /// Latest metrics of one device.
    pub fn device(&self, name: &str) -> Option<DeviceMetrics> {
        self.devices.get(name).map(|entry| entry.value().clone())
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Number of devices whose last poll succeeded.
    pub fn devices_up(&self) -> usize {
        self.devices.iter().filter(|entry| entry.up).count()
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let devices = self
            .devices
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut discovered: Vec<_> = self
            .discovered
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        discovered.sort_by(|a, b| a.address.cmp(&b.address));

        MetricsSnapshot {
            polls_total: self.polls_total.load(Ordering::Relaxed),
            poll_errors_total: self.poll_errors_total.load(Ordering::Relaxed),
            devices_up: self.devices_up(),
            devices,
            scans_started: self.scans_started.load(Ordering::Relaxed),
            scans_completed: self.scans_completed.load(Ordering::Relaxed),
            scan_errors: self.scan_errors.load(Ordering::Relaxed),
            last_scan_duration_ms: self.last_scan_duration_ms.load(Ordering::Relaxed),
            devices_discovered_total: self.devices_discovered_total.load(Ordering::Relaxed),
            discovered,
            config_reloads_success: self.config_reloads_success.load(Ordering::Relaxed),
            config_reloads_failed: self.config_reloads_failed.load(Ordering::Relaxed),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for MetricsCollector {
    // ========== Poll Metrics ==========

    fn record_reading(&self, target: &TargetDescriptor, reading: &DeviceReading) {
        self.polls_total.fetch_add(1, Ordering::Relaxed);
        if !reading.reachable {
            self.poll_errors_total.fetch_add(1, Ordering::Relaxed);
        }

        let mut entry = self
            .devices
            .entry(target.name.clone())
            .or_insert_with(|| DeviceMetrics {
                address: target.address.clone(),
                discovered: target.discovered,
                up: false,
                last_poll_duration: Duration::ZERO,
                last_success: None,
                polls_total: 0,
                poll_errors: 0,
                last_reading: reading.clone(),
            });

        let metrics = entry.value_mut();
        metrics.address.clone_from(&target.address);
        metrics.discovered = target.discovered;
        metrics.up = reading.reachable;
        metrics.last_poll_duration = reading.poll_duration;
        metrics.polls_total += 1;
        if reading.reachable {
            metrics.last_success = Some(Utc::now());
        } else {
            metrics.poll_errors += 1;
        }
        metrics.last_reading = reading.clone();
    }

    fn record_target_removed(&self, name: &str) {
        self.devices.remove(name);
    }

    // ========== Discovery Metrics ==========

    fn record_scan_started(&self) {
        self.scans_started.fetch_add(1, Ordering::Relaxed);
    }

    fn record_scan_completed(&self, duration: Duration, _report: &ScanReport) {
        self.scans_completed.fetch_add(1, Ordering::Relaxed);
        self.last_scan_duration_ms
            .store(duration.as_millis() as u64, Ordering::Relaxed);
    }

    fn record_scan_error(&self) {
        self.scan_errors.fetch_add(1, Ordering::Relaxed);
    }

    fn record_device_discovered(&self, device: &DiscoveredDevice) {
        self.devices_discovered_total.fetch_add(1, Ordering::Relaxed);
        self.discovered
            .insert(device.address.clone(), device.clone());
    }

    // ========== Config Metrics ==========

    fn record_config_reload(&self, success: bool) {
        let counter = if success {
            &self.config_reloads_success
        } else {
            &self.config_reloads_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// A snapshot of all metrics at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    // Poll metrics
    pub polls_total: u64,
    pub poll_errors_total: u64,
    pub devices_up: usize,
    pub devices: HashMap<String, DeviceMetrics>,

    // Discovery metrics
    pub scans_started: u64,
    pub scans_completed: u64,
    pub scan_errors: u64,
    pub last_scan_duration_ms: u64,
    pub devices_discovered_total: u64,
    pub discovered: Vec<DiscoveredDevice>,

    // Config metrics
    pub config_reloads_success: u64,
    pub config_reloads_failed: u64,
}

#[cfg(test)]
mod tests {
    use shelly_devices::DeviceIdentity;

    use super::*;

    fn target() -> TargetDescriptor {
        TargetDescriptor::new("plug", "10.0.0.5")
    }

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::new();
        let snapshot = collector.snapshot();
        assert_eq!(snapshot.polls_total, 0);
        assert!(snapshot.devices.is_empty());
    }

    #[test]
    fn test_reading_metrics() {
        let collector = MetricsCollector::new();
        let target = target();

        let ok = DeviceReading::reachable("plug", Duration::from_millis(40));
        collector.record_reading(&target, &ok);
        let device = collector.device("plug").unwrap();
        assert!(device.up);
        assert!(device.last_success.is_some());
        assert_eq!(device.last_poll_duration, Duration::from_millis(40));

        let failed = DeviceReading::unreachable("plug", Duration::from_secs(3), "timeout");
        collector.record_reading(&target, &failed);
        let device = collector.device("plug").unwrap();
        assert!(!device.up);
        assert!(device.last_success.is_some());
        assert_eq!(device.polls_total, 2);
        assert_eq!(device.poll_errors, 1);
        assert_eq!(device.last_reading.error.as_deref(), Some("timeout"));

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.polls_total, 2);
        assert_eq!(snapshot.poll_errors_total, 1);
        assert_eq!(snapshot.devices_up, 0);

        collector.record_target_removed("plug");
        assert!(collector.device("plug").is_none());
    }

    #[test]
    fn test_discovery_and_reload_metrics() {
        let collector = MetricsCollector::new();
        collector.record_scan_started();
        collector.record_scan_completed(Duration::from_millis(1500), &ScanReport::default());
        collector.record_scan_error();

        let identity = DeviceIdentity::from_value(serde_json::json!({"model": "SPSW", "gen": 2}));
        let device = DiscoveredDevice::new("10.0.0.9", identity.unwrap_or_default());
        collector.record_device_discovered(&device);

        collector.record_config_reload(true);
        collector.record_config_reload(false);
        collector.record_config_reload(false);

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.scans_started, 1);
        assert_eq!(snapshot.scans_completed, 1);
        assert_eq!(snapshot.scan_errors, 1);
        assert_eq!(snapshot.last_scan_duration_ms, 1500);
        assert_eq!(snapshot.devices_discovered_total, 1);
        assert_eq!(snapshot.discovered[0].address, "10.0.0.9");
        assert_eq!(snapshot.config_reloads_success, 1);
        assert_eq!(snapshot.config_reloads_failed, 2);

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("10.0.0.9"));
    }
}

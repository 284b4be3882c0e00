use std::time::Duration;

use shelly_devices::DeviceReading;

use crate::config::TargetDescriptor;
use crate::discovery::{DiscoveredDevice, ScanReport};

/// Consumer of readings and engine events.
///
/// Called from the scheduler and scanner tasks, so implementations must not
/// block.
pub trait MetricsSink: Send + Sync {
    /// One call per completed poll, reachable or not.
    fn record_reading(&self, target: &TargetDescriptor, reading: &DeviceReading);

    fn record_target_removed(&self, _name: &str) {}

    fn record_scan_started(&self) {}

    fn record_scan_completed(&self, _duration: Duration, _report: &ScanReport) {}

    fn record_scan_error(&self) {}

    fn record_device_discovered(&self, _device: &DiscoveredDevice) {}

    fn record_config_reload(&self, _success: bool) {}
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn record_reading(&self, _target: &TargetDescriptor, _reading: &DeviceReading) {}
}

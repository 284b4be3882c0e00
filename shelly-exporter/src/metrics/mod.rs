//! Metrics seam between the engine and whatever exposes readings.
//!
//! The engine only talks to [`MetricsSink`]. [`MetricsCollector`] is the
//! in-memory implementation shipped with the exporter; encoding and serving
//! its snapshot is left to the caller.

mod collector;
mod sink;

pub use collector::{DeviceMetrics, MetricsCollector, MetricsSnapshot};
pub use sink::{MetricsSink, NoopMetricsSink};

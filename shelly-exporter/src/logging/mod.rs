//! Logging setup with a reloadable filter.
//!
//! Console output is either human readable or JSON lines. When a log
//! directory is configured, a daily-rotated plain text file is written too.

use std::path::PathBuf;

use chrono::Local;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    reload::{self, Handle},
    util::SubscriberInitExt,
};

use crate::config::{Config, LogLevel};
use crate::utils::fs;

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "shelly_exporter=info,shelly_devices=info";

/// File name prefix for rotated log files.
const LOG_FILE_PREFIX: &str = "shelly-exporter.log";

/// Timestamps in the server's local timezone.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Type alias for the reload handle.
pub type FilterHandle = Handle<EnvFilter, tracing_subscriber::Registry>;

/// Logging options, usually taken from [`Config`] and CLI overrides.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoggingSettings {
    pub level: LogLevel,
    pub json: bool,
    pub log_dir: Option<PathBuf>,
}

impl LoggingSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            level: config.log_level,
            json: config.log_json,
            log_dir: config.log_dir.clone(),
        }
    }

    /// Filter directive for the configured level.
    pub fn directive(&self) -> String {
        filter_directive(self.level)
    }
}

/// Directive applying `level` to both crates of the workspace.
pub fn filter_directive(level: LogLevel) -> String {
    let level = level.as_directive();
    format!("shelly_exporter={level},shelly_devices={level}")
}

/// Keeps the file writer alive and allows changing the filter at runtime.
pub struct LoggingGuard {
    handle: FilterHandle,
    _guard: Option<WorkerGuard>,
}

impl LoggingGuard {
    /// Get the current filter directive string.
    pub fn get_filter(&self) -> String {
        self.handle
            .with_current(|filter| filter.to_string())
            .unwrap_or_default()
    }

    /// Set a new filter directive.
    pub fn set_filter(&self, directive: &str) -> crate::Result<()> {
        let new_filter = EnvFilter::try_new(directive)
            .map_err(|e| crate::Error::Other(format!("Invalid filter directive: {}", e)))?;

        self.handle
            .reload(new_filter)
            .map_err(|e| crate::Error::Other(format!("Failed to reload filter: {}", e)))?;

        info!(directive = %directive, "Log filter updated");
        Ok(())
    }

    /// Switch to the directive of another level, e.g. after a config reload.
    pub fn set_level(&self, level: LogLevel) -> crate::Result<()> {
        self.set_filter(&filter_directive(level))
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Keep the returned
/// guard alive for the lifetime of the process.
pub fn init_logging(settings: &LoggingSettings) -> crate::Result<LoggingGuard> {
    let initial_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(settings.directive()))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let (filter_layer, filter_handle) = reload::Layer::new(initial_filter);

    let (file_writer, guard) = match &settings.log_dir {
        Some(dir) => {
            fs::ensure_dir_all_sync(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let console = (!settings.json).then(|| fmt::layer().with_ansi(true).with_timer(LocalTimer));
    let console_json = settings
        .json
        .then(|| fmt::layer().json().with_timer(LocalTimer));
    let file = file_writer.map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_timer(LocalTimer)
    });

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(console)
        .with(console_json)
        .with(file)
        .try_init()
        .map_err(|e| {
            crate::Error::Other(format!("Failed to set global default subscriber: {}", e))
        })?;

    Ok(LoggingGuard {
        handle: filter_handle,
        _guard: guard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert!(DEFAULT_LOG_FILTER.contains("shelly_exporter=info"));
        assert_eq!(filter_directive(LogLevel::Info), DEFAULT_LOG_FILTER);
    }

    #[test]
    fn test_directive_per_level() {
        assert_eq!(
            filter_directive(LogLevel::Warning),
            "shelly_exporter=warn,shelly_devices=warn"
        );
        assert!(EnvFilter::try_new(filter_directive(LogLevel::Debug)).is_ok());
    }

    #[test]
    fn test_settings_from_config() {
        let config = Config::from_yaml_str("log_level: ERROR\nlog_json: true\n").unwrap();
        let settings = LoggingSettings::from_config(&config);
        assert_eq!(settings.level, LogLevel::Error);
        assert!(settings.json);
        assert!(settings.log_dir.is_none());
    }
}

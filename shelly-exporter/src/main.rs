use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use shelly_exporter::config::{Config, DEFAULT_CONFIG_PATH};
use shelly_exporter::logging::{self, LoggingSettings};
use shelly_exporter::metrics::MetricsCollector;
use shelly_exporter::services::{DEFAULT_SHUTDOWN_TIMEOUT, Engine};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,

    /// Also write daily-rotated log files into this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables before clap reads CONFIG_PATH
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config_path = args
        .config
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let mut settings = LoggingSettings::from_config(&config);
    settings.json |= args.json_logs;
    if args.log_dir.is_some() {
        settings.log_dir = args.log_dir;
    }
    let log_guard = logging::init_logging(&settings)?;

    info!(
        config = %config_path.display(),
        targets = config.targets.len(),
        discovery = config.discovery.enabled,
        "Starting shelly-exporter"
    );

    let metrics = Arc::new(MetricsCollector::new());
    let engine = Engine::start(config, metrics.clone())?;

    wait_for_shutdown(&engine, &config_path, &log_guard).await;

    engine.shutdown(DEFAULT_SHUTDOWN_TIMEOUT).await;
    let snapshot = metrics.snapshot();
    info!(
        polls = snapshot.polls_total,
        poll_errors = snapshot.poll_errors_total,
        "shelly-exporter stopped"
    );
    Ok(())
}

fn reload(engine: &Engine, path: &Path, logging: &logging::LoggingGuard) {
    match Config::load(path) {
        Ok(config) => {
            let level = config.log_level;
            if let Err(e) = engine.apply_config(config) {
                error!(error = %e, "Failed to apply reloaded config");
                return;
            }
            if std::env::var_os("RUST_LOG").is_none() {
                if let Err(e) = logging.set_level(level) {
                    warn!(error = %e, "Failed to update log level");
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "Reloaded config is invalid, keeping current config");
            engine.record_reload_failure();
        }
    }
}

#[cfg(unix)]
async fn wait_for_shutdown(engine: &Engine, path: &Path, logging: &logging::LoggingGuard) {
    use tokio::signal::unix::{SignalKind, signal};

    let (mut terminate, mut hangup) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::hangup()),
    ) {
        (Ok(terminate), Ok(hangup)) => (terminate, hangup),
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "Cannot install signal handlers, waiting for Ctrl-C only");
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl-C");
            }
            return;
        }
    };

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl-C");
                return;
            }
            _ = terminate.recv() => {
                info!("Received SIGTERM");
                return;
            }
            _ = hangup.recv() => {
                info!(config = %path.display(), "Received SIGHUP, reloading config");
                reload(engine, path, logging);
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(engine: &Engine, path: &Path, logging: &logging::LoggingGuard) {
    let _ = (engine, path, logging);
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl-C");
    }
    info!("Received Ctrl-C");
}

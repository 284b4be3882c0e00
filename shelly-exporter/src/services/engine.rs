//! The monitoring engine: scheduler plus optional network scanner.

use std::sync::Arc;
use std::time::Duration;

use shelly_devices::{ClientPool, ClientPoolConfig, DriverRegistry};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::discovery::{DiscoveryStore, NetworkScanner, RpcProbe, YamlDiscoveryStore};
use crate::metrics::MetricsSink;
use crate::scheduler::{SchedulerHandle, TargetScheduler};
use crate::Result;

/// Default shutdown timeout.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Running engine. Dropping it without [`Engine::shutdown`] leaves the
/// background tasks running until the runtime stops.
pub struct Engine {
    config_tx: watch::Sender<Arc<Config>>,
    scheduler: SchedulerHandle,
    scanner: Option<Arc<NetworkScanner>>,
    metrics: Arc<dyn MetricsSink>,
    poll_pool: ClientPool,
    probe_pool: Option<ClientPool>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    cancellation_token: CancellationToken,
}

impl Engine {
    /// Start with the built-in drivers and the configured discovery store.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: Config, metrics: Arc<dyn MetricsSink>) -> Result<Self> {
        Self::start_with(
            config,
            metrics,
            Arc::new(DriverRegistry::with_builtin_drivers()),
            None,
        )
    }

    /// Start with an explicit registry and, optionally, a discovery store
    /// overriding `discovery.persist_path`.
    pub fn start_with(
        config: Config,
        metrics: Arc<dyn MetricsSink>,
        registry: Arc<DriverRegistry>,
        store: Option<Arc<dyn DiscoveryStore>>,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let cancellation_token = CancellationToken::new();

        let poll_pool = ClientPool::new(ClientPoolConfig {
            timeout: config.request_timeout(),
            max_connections: config.max_concurrency * 2,
        })?;

        let (config_tx, config_rx) = watch::channel(config.clone());
        let (scheduler, handle) = TargetScheduler::new(
            config_rx.clone(),
            poll_pool.clone(),
            registry.clone(),
            metrics.clone(),
        );

        let mut tasks = vec![(
            "scheduler",
            tokio::spawn(scheduler.run(cancellation_token.child_token())),
        )];

        let (scanner, probe_pool) = if config.discovery.enabled {
            let probe_pool = ClientPool::new(ClientPoolConfig {
                timeout: config.discovery.scan_timeout(),
                max_connections: config.discovery.scan_concurrency * 2,
            })?;

            let store = store.or_else(|| {
                config
                    .discovery
                    .persist_path
                    .as_ref()
                    .map(|path| Arc::new(YamlDiscoveryStore::new(path)) as Arc<dyn DiscoveryStore>)
            });

            let mut scanner = NetworkScanner::new(
                config_rx,
                registry,
                Arc::new(RpcProbe::new(probe_pool.clone())),
                Arc::new(handle.clone()),
                metrics.clone(),
            );
            if let Some(store) = store {
                scanner = scanner.with_store(store);
            }
            let scanner = Arc::new(scanner);

            tasks.push((
                "scanner",
                tokio::spawn(scanner.clone().run(cancellation_token.child_token())),
            ));
            info!(
                ranges = ?config.discovery.network_ranges,
                interval = ?config.discovery.scan_interval(),
                "Network discovery enabled"
            );
            (Some(scanner), Some(probe_pool))
        } else {
            (None, None)
        };

        info!(targets = config.targets.len(), "Engine started");

        Ok(Self {
            config_tx,
            scheduler: handle,
            scanner,
            metrics,
            poll_pool,
            probe_pool,
            tasks,
            cancellation_token,
        })
    }

    pub fn handle(&self) -> &SchedulerHandle {
        &self.scheduler
    }

    pub fn scanner(&self) -> Option<&Arc<NetworkScanner>> {
        self.scanner.as_ref()
    }

    /// The configuration currently in effect.
    pub fn config(&self) -> Arc<Config> {
        self.config_tx.borrow().clone()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Validate and publish a new configuration.
    ///
    /// The scheduler reconciles its targets and the scanner picks up the new
    /// configured addresses on its next scan. Concurrency limits, pool sizes
    /// and the discovery toggle keep their startup values.
    pub fn apply_config(&self, config: Config) -> Result<()> {
        if let Err(e) = config.validate() {
            warn!(error = %e, "Rejected new configuration");
            self.metrics.record_config_reload(false);
            return Err(e);
        }

        let current = self.config();
        if config.max_concurrency != current.max_concurrency {
            warn!("max_concurrency changes take effect after a restart");
        }
        if config.discovery.enabled != current.discovery.enabled {
            warn!("Enabling or disabling discovery takes effect after a restart");
        }

        let targets = config.targets.len();
        self.config_tx.send_replace(Arc::new(config));
        self.metrics.record_config_reload(true);
        info!(targets, "Applied new configuration");
        Ok(())
    }

    /// Count a reload whose file could not be read or parsed.
    pub fn record_reload_failure(&self) {
        self.metrics.record_config_reload(false);
    }

    /// Stop both loops, wait up to `grace` for in-flight work, then close the
    /// client pools.
    pub async fn shutdown(self, grace: Duration) {
        info!(grace = ?grace, "Shutting down engine");
        self.cancellation_token.cancel();

        let deadline = tokio::time::Instant::now() + grace;
        for (name, mut task) in self.tasks {
            match tokio::time::timeout_at(deadline, &mut task).await {
                Ok(Ok(())) => debug!(task = name, "Task stopped"),
                Ok(Err(e)) => warn!(task = name, error = %e, "Task ended abnormally"),
                Err(_) => {
                    warn!(task = name, "Task did not stop in time, aborting");
                    task.abort();
                }
            }
        }

        self.poll_pool.close();
        if let Some(pool) = &self.probe_pool {
            pool.close();
        }
        info!("Engine stopped");
    }
}

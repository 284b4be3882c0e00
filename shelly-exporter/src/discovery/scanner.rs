//! Periodic network scan.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use shelly_devices::{ChannelDescriptor, DriverRegistry};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::naming::format_device_name;
use super::probe::{IdentityProbe, ProbeOutcome};
use super::range::candidate_addresses;
use super::store::DiscoveryStore;
use super::DiscoveredDevice;
use crate::config::{Config, TargetDescriptor, normalize_address};
use crate::metrics::MetricsSink;

/// Counters of one scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanReport {
    /// Addresses produced by the configured ranges after exclusions.
    pub candidates: usize,
    /// Candidates actually probed, after skipping known addresses.
    pub probed: usize,
    pub found: usize,
    /// Devices promoted to targets and accepted by the scheduler.
    pub new: usize,
    pub auth_required: usize,
    pub errors: usize,
    pub duration: Duration,
}

/// Receives targets promoted by discovery.
#[async_trait]
pub trait TargetRegistrar: Send + Sync {
    /// Returns `false` when the target was not added, e.g. a duplicate.
    async fn register(&self, target: TargetDescriptor) -> bool;
}

/// Discovers devices in the configured address ranges.
///
/// The discovered-device map is owned here; readers get copies.
pub struct NetworkScanner {
    config: watch::Receiver<Arc<Config>>,
    registry: Arc<DriverRegistry>,
    probe: Arc<dyn IdentityProbe>,
    registrar: Arc<dyn TargetRegistrar>,
    store: Option<Arc<dyn DiscoveryStore>>,
    metrics: Arc<dyn MetricsSink>,
    discovered: RwLock<HashMap<String, DiscoveredDevice>>,
    discovered_targets: Mutex<Vec<TargetDescriptor>>,
}

impl NetworkScanner {
    pub fn new(
        config: watch::Receiver<Arc<Config>>,
        registry: Arc<DriverRegistry>,
        probe: Arc<dyn IdentityProbe>,
        registrar: Arc<dyn TargetRegistrar>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            config,
            registry,
            probe,
            registrar,
            store: None,
            metrics,
            discovered: RwLock::new(HashMap::new()),
            discovered_targets: Mutex::new(Vec::new()),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn DiscoveryStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Snapshot of every discovered device, keyed by address.
    pub fn discovered_devices(&self) -> HashMap<String, DiscoveredDevice> {
        self.discovered.read().clone()
    }

    /// Snapshot of the targets promoted so far.
    pub fn discovered_targets(&self) -> Vec<TargetDescriptor> {
        self.discovered_targets.lock().clone()
    }

    fn current_config(&self) -> Arc<Config> {
        self.config.borrow().clone()
    }

    /// Restore persisted targets and hand them to the scheduler.
    ///
    /// Returns how many were accepted.
    pub async fn load_persisted(&self) -> usize {
        let Some(store) = &self.store else {
            return 0;
        };

        let targets = match store.load().await {
            Ok(targets) => targets,
            Err(e) => {
                warn!(error = %e, "Failed to load discovered targets");
                return 0;
            }
        };

        let mut accepted = 0;
        for target in targets {
            let address = target.normalized_address();
            self.discovered
                .write()
                .insert(address.clone(), DiscoveredDevice::persisted(address.clone()));

            if self.registrar.register(target.clone()).await {
                debug!(device = %target.name, address = %address, "Restored discovered target");
                self.discovered_targets.lock().push(target);
                accepted += 1;
            }
        }

        if accepted > 0 {
            info!(count = accepted, "Restored discovered targets");
        }
        accepted
    }

    /// Run one full scan.
    pub async fn run_scan(&self) -> ScanReport {
        let started = Instant::now();
        let config = self.current_config();
        let discovery = &config.discovery;
        let mut report = ScanReport::default();

        if discovery.network_ranges.is_empty() {
            warn!("Discovery is enabled but no network ranges are configured");
            return report;
        }

        self.metrics.record_scan_started();

        let candidates = candidate_addresses(&discovery.network_ranges, &discovery.exclude_ips);
        report.candidates = candidates.len();

        let configured: HashSet<String> = config.configured_addresses();
        let to_probe: Vec<String> = {
            let discovered = self.discovered.read();
            candidates
                .iter()
                .map(|addr| addr.to_string())
                .filter(|addr| !configured.contains(addr) && !discovered.contains_key(addr))
                .collect()
        };
        report.probed = to_probe.len();

        info!(
            candidates = report.candidates,
            probing = report.probed,
            "Starting network scan"
        );

        let credentials = config.discovery_credentials();
        let timeout = discovery.scan_timeout();
        let concurrency = discovery.scan_concurrency.max(1);
        let mut pending = to_probe.into_iter();
        let mut probes = JoinSet::new();

        // At most `concurrency` probe tasks exist at once.
        let mut found = Vec::new();
        loop {
            while probes.len() < concurrency {
                let Some(address) = pending.next() else {
                    break;
                };
                let probe = self.probe.clone();
                let credentials = credentials.clone();
                probes.spawn(async move {
                    let outcome = probe.probe(&address, credentials.as_ref(), timeout).await;
                    (address, outcome)
                });
            }

            let Some(joined) = probes.join_next().await else {
                break;
            };
            match joined {
                Ok((address, ProbeOutcome::Found(identity))) => {
                    found.push(DiscoveredDevice::new(address, identity));
                }
                Ok((_, ProbeOutcome::AuthRequired)) => report.auth_required += 1,
                Ok((_, ProbeOutcome::NotFound)) => {}
                Err(e) => {
                    error!(error = %e, "Probe task failed");
                    report.errors += 1;
                }
            }
        }
        found.sort_by_key(|device| device.address.parse::<std::net::Ipv4Addr>().ok());
        report.found = found.len();

        let mut new_targets = Vec::new();
        for device in found {
            info!(
                address = %device.address,
                model = device.model(),
                generation = device.generation(),
                app = device.app(),
                "Discovered device"
            );
            self.discovered
                .write()
                .insert(device.address.clone(), device.clone());
            self.metrics.record_device_discovered(&device);

            if !discovery.auto_add_discovered {
                continue;
            }

            let Some(target) = self.promote(&config, &device) else {
                self.discovered.write().remove(&device.address);
                continue;
            };

            if self.registrar.register(target.clone()).await {
                info!(device = %target.name, address = %device.address, "Added discovered target");
                new_targets.push(target);
            }
        }
        report.new = new_targets.len();

        if !new_targets.is_empty() {
            let snapshot = {
                let mut targets = self.discovered_targets.lock();
                targets.extend(new_targets);
                targets.clone()
            };
            if let Some(store) = &self.store {
                if let Err(e) = store.save(&snapshot).await {
                    warn!(error = %e, "Failed to persist discovered targets");
                    report.errors += 1;
                    self.metrics.record_scan_error();
                }
            }
        }

        report.duration = started.elapsed();
        self.metrics.record_scan_completed(report.duration, &report);
        info!(
            found = report.found,
            new = report.new,
            auth_required = report.auth_required,
            duration = ?report.duration,
            "Network scan complete"
        );
        report
    }

    /// Build a target for a device some driver supports.
    fn promote(&self, config: &Config, device: &DiscoveredDevice) -> Option<TargetDescriptor> {
        let Some(driver) = self.registry.resolve(&device.identity) else {
            warn!(
                address = %device.address,
                model = device.model(),
                generation = device.generation(),
                app = device.app(),
                "No driver supports discovered device, will retry on next scan"
            );
            return None;
        };

        let channels: Vec<ChannelDescriptor> = driver
            .supported_channels(&device.identity)
            .into_iter()
            .flat_map(|(kind, indices)| {
                indices
                    .into_iter()
                    .map(move |index| ChannelDescriptor::new(kind, index))
            })
            .collect();

        let name = format_device_name(&config.discovery.name_template, device);
        debug!(device = %name, driver = driver.id(), channels = channels.len(), "Promoting device");

        Some(
            TargetDescriptor::new(name, normalize_address(&device.address))
                .with_channels(channels)
                .with_credentials(config.discovery_credentials())
                .mark_discovered(),
        )
    }

    /// Restore persisted targets, then scan immediately and at every interval
    /// until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        self.load_persisted().await;

        loop {
            let scanner = self.clone();
            let mut scan = tokio::spawn(async move { scanner.run_scan().await });

            tokio::select! {
                _ = cancel.cancelled() => {
                    scan.abort();
                    break;
                }
                joined = &mut scan => {
                    if let Err(e) = joined {
                        error!(error = %e, "Network scan failed");
                        self.metrics.record_scan_error();
                    }
                }
            }

            let interval = self.current_config().discovery.scan_interval();
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        debug!("Network scanner stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;
    use shelly_devices::{Credentials, DeviceIdentity, DeviceReading};

    use super::*;
    use crate::Result;

    struct FakeProbe {
        devices: HashMap<String, ProbeOutcome>,
        probed: Mutex<Vec<String>>,
        delay: Duration,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
    }

    impl FakeProbe {
        fn new(devices: Vec<(&str, ProbeOutcome)>) -> Self {
            Self {
                devices: devices
                    .into_iter()
                    .map(|(addr, outcome)| (addr.to_string(), outcome))
                    .collect(),
                probed: Mutex::new(Vec::new()),
                delay: Duration::ZERO,
                in_flight: AtomicUsize::new(0),
                peak_in_flight: AtomicUsize::new(0),
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl IdentityProbe for FakeProbe {
        async fn probe(
            &self,
            address: &str,
            _credentials: Option<&Credentials>,
            _timeout: Duration,
        ) -> ProbeOutcome {
            self.probed.lock().push(address.to_string());
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            self.devices
                .get(address)
                .cloned()
                .unwrap_or(ProbeOutcome::NotFound)
        }
    }

    #[derive(Default)]
    struct FakeRegistrar {
        targets: Mutex<Vec<TargetDescriptor>>,
    }

    #[async_trait]
    impl TargetRegistrar for FakeRegistrar {
        async fn register(&self, target: TargetDescriptor) -> bool {
            let mut targets = self.targets.lock();
            if targets.iter().any(|t| t.name == target.name) {
                return false;
            }
            targets.push(target);
            true
        }
    }

    #[derive(Default)]
    struct FakeStore {
        initial: Vec<TargetDescriptor>,
        saved: Mutex<Vec<Vec<TargetDescriptor>>>,
    }

    #[async_trait]
    impl DiscoveryStore for FakeStore {
        async fn load(&self) -> Result<Vec<TargetDescriptor>> {
            Ok(self.initial.clone())
        }

        async fn save(&self, targets: &[TargetDescriptor]) -> Result<()> {
            self.saved.lock().push(targets.to_vec());
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingSink {
        discovered: Mutex<Vec<String>>,
        scans: Mutex<u32>,
    }

    impl MetricsSink for CountingSink {
        fn record_reading(&self, _target: &TargetDescriptor, _reading: &DeviceReading) {}

        fn record_scan_completed(&self, _duration: Duration, _report: &ScanReport) {
            *self.scans.lock() += 1;
        }

        fn record_device_discovered(&self, device: &DiscoveredDevice) {
            self.discovered.lock().push(device.address.clone());
        }
    }

    fn found(app: &str, generation: i64) -> ProbeOutcome {
        ProbeOutcome::Found(
            DeviceIdentity::from_value(json!({"model": "SPSW-104PE16EU", "gen": generation, "app": app}))
                .unwrap(),
        )
    }

    fn config(yaml: &str) -> watch::Receiver<Arc<Config>> {
        let (_tx, rx) = watch::channel(Arc::new(Config::from_yaml_str(yaml).unwrap()));
        rx
    }

    struct Harness {
        scanner: NetworkScanner,
        probe: Arc<FakeProbe>,
        registrar: Arc<FakeRegistrar>,
        store: Arc<FakeStore>,
        sink: Arc<CountingSink>,
    }

    fn harness(yaml: &str, devices: Vec<(&str, ProbeOutcome)>, store: FakeStore) -> Harness {
        harness_with_probe(yaml, FakeProbe::new(devices), store)
    }

    fn harness_with_probe(yaml: &str, probe: FakeProbe, store: FakeStore) -> Harness {
        let probe = Arc::new(probe);
        let registrar = Arc::new(FakeRegistrar::default());
        let store = Arc::new(store);
        let sink = Arc::new(CountingSink::default());
        let scanner = NetworkScanner::new(
            config(yaml),
            Arc::new(DriverRegistry::with_builtin_drivers()),
            probe.clone(),
            registrar.clone(),
            sink.clone(),
        )
        .with_store(store.clone());
        Harness {
            scanner,
            probe,
            registrar,
            store,
            sink,
        }
    }

    const SCAN_CONFIG: &str = r#"
targets:
  - name: manual
    url: http://10.0.0.2/
discovery:
  enabled: true
  network_ranges: ["10.0.0.0/29"]
  exclude_ips: ["10.0.0.6"]
  auto_add_credentials: {username: admin, password: pw}
"#;

    #[tokio::test]
    async fn test_scan_promotes_supported_devices() {
        let h = harness(
            SCAN_CONFIG,
            vec![
                ("10.0.0.3", found("Pro4PM", 2)),
                ("10.0.0.4", found("Unknown", 9)),
                ("10.0.0.5", ProbeOutcome::AuthRequired),
            ],
            FakeStore::default(),
        );

        let report = h.scanner.run_scan().await;
        assert_eq!(report.candidates, 5);
        assert_eq!(report.probed, 4);
        assert_eq!(report.found, 2);
        assert_eq!(report.new, 1);
        assert_eq!(report.auth_required, 1);
        assert_eq!(report.errors, 0);

        let probed = h.probe.probed.lock().clone();
        assert!(!probed.contains(&"10.0.0.2".to_string()));
        assert!(!probed.contains(&"10.0.0.6".to_string()));

        let targets = h.registrar.targets.lock().clone();
        assert_eq!(targets.len(), 1);
        let target = &targets[0];
        assert_eq!(target.name, "shelly_10_0_0_3_spsw-104pe16eu");
        assert_eq!(target.address, "10.0.0.3");
        assert!(target.discovered);
        assert_eq!(target.channels.len(), 4);
        assert_eq!(target.credentials.as_ref().unwrap().username, "admin");

        let saved = h.store.saved.lock().clone();
        assert_eq!(saved, vec![targets.clone()]);

        let discovered = h.scanner.discovered_devices();
        assert!(discovered.contains_key("10.0.0.3"));
        assert!(!discovered.contains_key("10.0.0.4"));
        assert_eq!(h.sink.discovered.lock().len(), 2);
        assert_eq!(*h.sink.scans.lock(), 1);
    }

    #[tokio::test]
    async fn test_rescan_skips_known_and_retries_unsupported() {
        let h = harness(
            SCAN_CONFIG,
            vec![
                ("10.0.0.3", found("Pro4PM", 2)),
                ("10.0.0.4", found("Unknown", 9)),
            ],
            FakeStore::default(),
        );

        h.scanner.run_scan().await;
        h.probe.probed.lock().clear();

        let report = h.scanner.run_scan().await;
        assert_eq!(report.probed, 3);
        assert_eq!(report.new, 0);
        let probed = h.probe.probed.lock().clone();
        assert!(!probed.contains(&"10.0.0.3".to_string()));
        assert!(probed.contains(&"10.0.0.4".to_string()));
        assert_eq!(h.store.saved.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_auto_add_disabled_only_records() {
        let yaml = r#"
discovery:
  enabled: true
  network_ranges: ["10.0.0.3"]
  auto_add_discovered: false
"#;
        let h = harness(yaml, vec![("10.0.0.3", found("PlugUS", 2))], FakeStore::default());

        let report = h.scanner.run_scan().await;
        assert_eq!(report.found, 1);
        assert_eq!(report.new, 0);
        assert!(h.registrar.targets.lock().is_empty());
        assert!(h.scanner.discovered_devices().contains_key("10.0.0.3"));
    }

    #[tokio::test]
    async fn test_no_ranges_is_a_noop() {
        let h = harness("discovery: {enabled: true}", vec![], FakeStore::default());
        let report = h.scanner.run_scan().await;
        assert_eq!(report, ScanReport::default());
        assert_eq!(*h.sink.scans.lock(), 0);
    }

    #[tokio::test]
    async fn test_persisted_targets_are_restored_and_not_reprobed() {
        let persisted = TargetDescriptor::new("shelly_10_0_0_3_plug", "10.0.0.3")
            .with_channels(vec![ChannelDescriptor::switch(0)])
            .mark_discovered();
        let store = FakeStore {
            initial: vec![persisted.clone()],
            ..FakeStore::default()
        };
        let h = harness(SCAN_CONFIG, vec![("10.0.0.3", found("PlugUS", 2))], store);

        assert_eq!(h.scanner.load_persisted().await, 1);
        assert_eq!(h.registrar.targets.lock().clone(), vec![persisted.clone()]);
        assert_eq!(h.scanner.discovered_targets(), vec![persisted]);

        let report = h.scanner.run_scan().await;
        assert_eq!(report.found, 0);
        assert!(!h.probe.probed.lock().contains(&"10.0.0.3".to_string()));
    }

    #[tokio::test]
    async fn test_probes_respect_scan_concurrency() {
        let yaml = r#"
discovery:
  enabled: true
  network_ranges: ["10.0.0.0/28"]
  scan_concurrency: 2
"#;
        let probe = FakeProbe::new(vec![("10.0.0.7", found("PlugUS", 2))])
            .with_delay(Duration::from_millis(50));
        let h = harness_with_probe(yaml, probe, FakeStore::default());

        let report = h.scanner.run_scan().await;
        assert_eq!(report.probed, 14);
        assert_eq!(h.probe.probed.lock().len(), 14);
        assert_eq!(report.new, 1);
        assert_eq!(h.probe.peak_in_flight.load(Ordering::SeqCst), 2);
        assert_eq!(h.probe.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_oversized_range_is_not_probed() {
        let yaml = r#"
discovery:
  enabled: true
  network_ranges: ["10.0.0.0/8", "10.1.0.1"]
"#;
        let h = harness(yaml, vec![], FakeStore::default());

        let report = h.scanner.run_scan().await;
        assert_eq!(report.candidates, 1);
        assert_eq!(h.probe.probed.lock().clone(), vec!["10.1.0.1".to_string()]);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let h = harness(SCAN_CONFIG, vec![("10.0.0.3", found("Pro4PM", 2))], FakeStore::default());
        let scanner = Arc::new(h.scanner);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(scanner.clone().run(cancel.clone()));

        for _ in 0..50 {
            if !h.registrar.targets.lock().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(h.registrar.targets.lock().len(), 1);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
    }
}

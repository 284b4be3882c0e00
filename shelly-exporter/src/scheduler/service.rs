//! The scheduler task.
//!
//! A single task owns every [`TargetState`]. Polls run as separate tasks and
//! report back through a `JoinSet`; configuration updates and runtime
//! commands arrive over channels and are applied between dispatch rounds, so
//! a poll never observes a half-applied reconciliation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use shelly_devices::{ClientPool, DriverRegistry};
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::{Id, JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::backoff::BackoffPolicy;
use super::handle::SchedulerHandle;
use super::messages::SchedulerCommand;
use super::poll::{IdentityUpdate, PollJob, PollOutcome, PollResult};
use super::state::{TargetSnapshot, TargetState};
use crate::config::{Config, TargetDescriptor, normalize_address};
use crate::metrics::MetricsSink;

/// How often due targets are looked for.
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Capacity of the command channel.
pub const DEFAULT_COMMAND_CAPACITY: usize = 64;

pub struct TargetScheduler {
    config_rx: watch::Receiver<Arc<Config>>,
    commands: mpsc::Receiver<SchedulerCommand>,
    config: Arc<Config>,
    policy: BackoffPolicy,
    pool: ClientPool,
    registry: Arc<DriverRegistry>,
    metrics: Arc<dyn MetricsSink>,
    semaphore: Arc<Semaphore>,
    states: HashMap<String, TargetState>,
    jobs: JoinSet<PollOutcome>,
    running: HashMap<Id, (String, u64)>,
    next_epoch: u64,
}

impl TargetScheduler {
    /// Build the scheduler and register the targets of the current config.
    ///
    /// The poll concurrency bound is fixed from the initial config.
    pub fn new(
        config_rx: watch::Receiver<Arc<Config>>,
        pool: ClientPool,
        registry: Arc<DriverRegistry>,
        metrics: Arc<dyn MetricsSink>,
    ) -> (Self, SchedulerHandle) {
        let (tx, commands) = mpsc::channel(DEFAULT_COMMAND_CAPACITY);
        let config = config_rx.borrow().clone();

        let mut scheduler = Self {
            config_rx,
            commands,
            policy: BackoffPolicy::from_config(&config),
            semaphore: Arc::new(Semaphore::new(config.max_concurrency)),
            config: config.clone(),
            pool,
            registry,
            metrics,
            states: HashMap::new(),
            jobs: JoinSet::new(),
            running: HashMap::new(),
            next_epoch: 0,
        };
        scheduler.reconcile(&config);

        (scheduler, SchedulerHandle::new(tx))
    }

    /// Run until cancelled, then wait for in-flight polls.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            targets = self.states.len(),
            max_concurrency = self.config.max_concurrency,
            "Starting target scheduler"
        );

        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut config_open = true;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                changed = self.config_rx.changed(), if config_open => {
                    if changed.is_ok() {
                        let config = self.config_rx.borrow_and_update().clone();
                        self.apply_config(config);
                    } else {
                        config_open = false;
                    }
                }
                Some(command) = self.commands.recv() => self.handle_command(command),
                Some(joined) = self.jobs.join_next_with_id(), if !self.jobs.is_empty() => {
                    self.on_joined(joined);
                }
                _ = ticker.tick() => self.dispatch_due(),
            }
        }

        debug!(in_flight = self.jobs.len(), "Scheduler stopping, waiting for in-flight polls");
        while let Some(joined) = self.jobs.join_next_with_id().await {
            self.on_joined(joined);
        }
        info!("Target scheduler stopped");
    }

    fn apply_config(&mut self, config: Arc<Config>) {
        self.policy = BackoffPolicy::from_config(&config);
        self.config = config.clone();
        self.reconcile(&config);
    }

    /// Align the target set with `config`.
    ///
    /// Configured names absent from `config` are removed, new names start
    /// unbound, and names present in both keep their runtime state.
    ///
    /// Discovered targets never appear in the config file, so they are left
    /// out of the diff and only go away through [`Self::remove_target`].
    fn reconcile(&mut self, config: &Config) {
        let wanted: HashSet<&str> = config.targets.iter().map(|t| t.name.as_str()).collect();

        let removed: Vec<String> = self
            .states
            .values()
            .filter(|s| !s.descriptor.discovered && !wanted.contains(s.name()))
            .map(|s| s.name().to_string())
            .collect();
        for name in &removed {
            self.states.remove(name);
            self.metrics.record_target_removed(name);
            info!(device = %name, "Removed target from config reload");
        }

        let now = Instant::now();
        let mut added = 0;
        for target in &config.targets {
            match self.states.get_mut(&target.name) {
                Some(state) => state.update_descriptor(target.clone()),
                None => {
                    self.insert_target(target.clone(), now);
                    added += 1;
                }
            }
        }

        info!(
            added,
            removed = removed.len(),
            total = self.states.len(),
            "Target set reconciled"
        );
    }

    fn insert_target(&mut self, target: TargetDescriptor, now: Instant) {
        self.next_epoch += 1;
        debug!(device = %target.name, address = %target.address, "Registered target");
        self.states.insert(
            target.name.clone(),
            TargetState::new(target, now, self.next_epoch),
        );
    }

    fn has_address(&self, address: &str) -> bool {
        let address = normalize_address(address);
        self.states
            .values()
            .any(|s| s.descriptor.normalized_address() == address)
    }

    fn add_target(&mut self, target: TargetDescriptor) -> bool {
        if self.states.contains_key(&target.name) {
            info!(device = %target.name, "Target already exists, skipping");
            return false;
        }
        if self.has_address(&target.address) {
            info!(device = %target.name, address = %target.address, "Address already monitored, skipping");
            return false;
        }
        info!(device = %target.name, address = %target.address, "Added target");
        self.insert_target(target, Instant::now());
        true
    }

    fn remove_target(&mut self, name: &str) -> bool {
        if self.states.remove(name).is_none() {
            return false;
        }
        self.metrics.record_target_removed(name);
        info!(device = %name, "Removed target");
        true
    }

    fn snapshot(&self) -> Vec<TargetSnapshot> {
        let now = Instant::now();
        let mut snapshots: Vec<_> = self.states.values().map(|s| s.snapshot(now)).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    fn handle_command(&mut self, command: SchedulerCommand) {
        // A dropped reply receiver only means the caller stopped waiting.
        match command {
            SchedulerCommand::AddTarget { target, reply } => {
                let _ = reply.send(self.add_target(target));
            }
            SchedulerCommand::RemoveTarget { name, reply } => {
                let _ = reply.send(self.remove_target(&name));
            }
            SchedulerCommand::HasTarget { name, reply } => {
                let _ = reply.send(self.states.contains_key(&name));
            }
            SchedulerCommand::HasAddress { address, reply } => {
                let _ = reply.send(self.has_address(&address));
            }
            SchedulerCommand::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    /// Start a poll for every due target while permits are available.
    fn dispatch_due(&mut self) {
        let now = Instant::now();
        let mut due: Vec<(Instant, String)> = self
            .states
            .values()
            .filter(|s| s.is_due(now))
            .map(|s| (s.next_poll, s.name().to_string()))
            .collect();
        due.sort();

        let refresh = self.config.device_info_refresh();
        let timeout = self.config.request_timeout();

        for (_, name) in due {
            let Ok(permit) = self.semaphore.clone().try_acquire_owned() else {
                debug!("Poll concurrency limit reached");
                break;
            };
            let Some(state) = self.states.get_mut(&name) else {
                continue;
            };

            let refresh_identity = state.needs_identity(now, refresh);
            state.begin_poll(refresh_identity);

            let job = PollJob {
                name: name.clone(),
                epoch: state.epoch,
                address: state.descriptor.address.clone(),
                credentials: self.config.target_credentials(&state.descriptor),
                channels: state.descriptor.channels.clone(),
                refresh_identity,
                driver: state.driver.clone(),
                identity: state.identity.clone(),
                timeout,
                pool: self.pool.clone(),
                registry: self.registry.clone(),
            };
            let epoch = state.epoch;
            let handle = self.jobs.spawn(job.run(permit));
            self.running.insert(handle.id(), (name, epoch));
        }
    }

    fn on_joined(&mut self, joined: Result<(Id, PollOutcome), JoinError>) {
        match joined {
            Ok((id, outcome)) => {
                self.running.remove(&id);
                self.apply_outcome(outcome);
            }
            Err(e) => {
                let Some((name, epoch)) = self.running.remove(&e.id()) else {
                    return;
                };
                error!(device = %name, error = %e, "Poll task failed");
                let now = Instant::now();
                if let Some(state) = self.states.get_mut(&name).filter(|s| s.epoch == epoch) {
                    let interval = self.config.target_poll_interval(&state.descriptor);
                    state.schedule_next(now, interval);
                }
            }
        }
    }

    fn apply_outcome(&mut self, outcome: PollOutcome) {
        let now = Instant::now();
        let Some(state) = self
            .states
            .get_mut(&outcome.name)
            .filter(|s| s.epoch == outcome.epoch)
        else {
            debug!(device = %outcome.name, "Dropping result for removed target");
            return;
        };

        match outcome.identity {
            Some(IdentityUpdate::Fetched { identity, driver }) => {
                state.record_identity(identity, driver, now);
            }
            Some(IdentityUpdate::Failed) => state.record_identity_failure(now),
            None => {}
        }

        match outcome.result {
            PollResult::Success(reading) => {
                state.record_success();
                self.metrics.record_reading(&state.descriptor, &reading);
            }
            PollResult::Failure(reading) => {
                let delay = state.record_failure(now, &self.policy);
                debug!(
                    device = %outcome.name,
                    failures = state.consecutive_failures,
                    backoff = ?delay,
                    "Backing off"
                );
                self.metrics.record_reading(&state.descriptor, &reading);
            }
            PollResult::Skipped => {}
        }

        let interval = self.config.target_poll_interval(&state.descriptor);
        state.schedule_next(now, interval);
    }
}

impl Drop for TargetScheduler {
    fn drop(&mut self) {
        if !self.jobs.is_empty() {
            warn!(in_flight = self.jobs.len(), "Aborting in-flight polls");
        }
    }
}

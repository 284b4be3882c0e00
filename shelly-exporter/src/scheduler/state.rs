//! Per-target runtime state, owned by the scheduler task.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use shelly_devices::{DeviceDriver, DeviceIdentity};

use super::backoff::BackoffPolicy;
use crate::config::TargetDescriptor;

/// Failures after which an unbound target re-fetches its identity early.
pub const FORCED_REFRESH_FAILURES: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetPhase {
    /// No identity fetched yet.
    Unbound,
    Identifying,
    /// Driver bound, waiting for the next poll.
    Ready,
    /// Identity fetched but no driver matched.
    Unsupported,
    Polling,
    Backoff,
}

impl TargetPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unbound => "unbound",
            Self::Identifying => "identifying",
            Self::Ready => "ready",
            Self::Unsupported => "unsupported",
            Self::Polling => "polling",
            Self::Backoff => "backoff",
        }
    }
}

impl fmt::Display for TargetPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct TargetState {
    pub descriptor: TargetDescriptor,
    pub driver: Option<Arc<dyn DeviceDriver>>,
    pub identity: Option<DeviceIdentity>,
    pub identity_fetched_at: Option<Instant>,
    pub next_poll: Instant,
    pub backoff_until: Option<Instant>,
    pub consecutive_failures: u32,
    /// At most one poll per target runs at a time.
    pub in_flight: bool,
    /// Distinguishes this state from an earlier one registered under the
    /// same name, so late poll results for a removed target are dropped.
    pub epoch: u64,
    pub phase: TargetPhase,
}

impl TargetState {
    pub fn new(descriptor: TargetDescriptor, now: Instant, epoch: u64) -> Self {
        Self {
            descriptor,
            driver: None,
            identity: None,
            identity_fetched_at: None,
            next_poll: now,
            backoff_until: None,
            consecutive_failures: 0,
            in_flight: false,
            epoch,
            phase: TargetPhase::Unbound,
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Whether both the poll time and any backoff deadline have passed.
    pub fn is_due(&self, now: Instant) -> bool {
        !self.in_flight
            && now >= self.next_poll
            && self.backoff_until.is_none_or(|until| now >= until)
    }

    /// Whether the next poll should fetch the identity first.
    pub fn needs_identity(&self, now: Instant, refresh: Duration) -> bool {
        let Some(fetched_at) = self.identity_fetched_at else {
            return true;
        };
        if now.saturating_duration_since(fetched_at) >= refresh {
            return true;
        }
        self.driver.is_none() && self.consecutive_failures >= FORCED_REFRESH_FAILURES
    }

    /// Mark the target as dispatched.
    pub fn begin_poll(&mut self, fetch_identity: bool) {
        self.in_flight = true;
        self.phase = if fetch_identity {
            TargetPhase::Identifying
        } else {
            TargetPhase::Polling
        };
    }

    pub fn record_identity(
        &mut self,
        identity: DeviceIdentity,
        driver: Option<Arc<dyn DeviceDriver>>,
        now: Instant,
    ) {
        self.phase = if driver.is_some() {
            TargetPhase::Ready
        } else {
            TargetPhase::Unsupported
        };
        self.identity = Some(identity);
        self.driver = driver;
        self.identity_fetched_at = Some(now);
    }

    /// Keep whatever driver is bound and wait a full refresh interval.
    pub fn record_identity_failure(&mut self, now: Instant) {
        self.identity_fetched_at = Some(now);
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.backoff_until = None;
        self.phase = TargetPhase::Ready;
    }

    /// Count a failed poll and return the backoff applied.
    pub fn record_failure(&mut self, now: Instant, policy: &BackoffPolicy) -> Duration {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let delay = policy.delay(self.consecutive_failures);
        self.backoff_until = Some(now + delay);
        self.phase = TargetPhase::Backoff;
        delay
    }

    /// Settle the phase of a poll that produced no status and release the
    /// in-flight slot.
    pub fn schedule_next(&mut self, now: Instant, interval: Duration) {
        self.next_poll = now + interval;
        self.in_flight = false;
        if matches!(self.phase, TargetPhase::Identifying | TargetPhase::Polling) {
            self.phase = match (&self.driver, &self.identity) {
                (Some(_), _) => TargetPhase::Ready,
                (None, Some(_)) => TargetPhase::Unsupported,
                (None, None) => TargetPhase::Unbound,
            };
        }
    }

    /// Swap in a new descriptor, keeping driver, identity and backoff.
    ///
    /// A changed address forces an identity refresh on the next poll.
    pub fn update_descriptor(&mut self, descriptor: TargetDescriptor) {
        if descriptor.normalized_address() != self.descriptor.normalized_address() {
            self.identity_fetched_at = None;
        }
        self.descriptor = descriptor;
    }

    pub fn snapshot(&self, now: Instant) -> TargetSnapshot {
        let backoff_remaining = self
            .backoff_until
            .map(|until| until.saturating_duration_since(now))
            .filter(|remaining| !remaining.is_zero());
        let phase = match self.phase {
            TargetPhase::Backoff if backoff_remaining.is_none() => TargetPhase::Ready,
            phase => phase,
        };

        TargetSnapshot {
            name: self.descriptor.name.clone(),
            address: self.descriptor.address.clone(),
            phase,
            driver: self.driver.as_ref().map(|d| d.id().to_string()),
            consecutive_failures: self.consecutive_failures,
            backoff_remaining,
            next_poll_in: self.next_poll.saturating_duration_since(now),
            discovered: self.descriptor.discovered,
        }
    }
}

/// Copy of one target's state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetSnapshot {
    pub name: String,
    pub address: String,
    pub phase: TargetPhase,
    pub driver: Option<String>,
    pub consecutive_failures: u32,
    pub backoff_remaining: Option<Duration>,
    pub next_poll_in: Duration,
    pub discovered: bool,
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use shelly_devices::DriverRegistry;

    use super::*;

    fn state(now: Instant) -> TargetState {
        TargetState::new(TargetDescriptor::new("pro", "10.0.0.5"), now, 1)
    }

    fn pro4pm() -> (DeviceIdentity, Option<Arc<dyn DeviceDriver>>) {
        let identity = DeviceIdentity::from_value(json!({"gen": 2, "app": "Pro4PM"})).unwrap();
        let driver = DriverRegistry::with_builtin_drivers().resolve(&identity);
        (identity, driver)
    }

    #[test]
    fn test_new_state_is_due_and_unbound() {
        let now = Instant::now();
        let state = state(now);
        assert!(state.is_due(now));
        assert!(state.needs_identity(now, Duration::from_secs(60)));
        assert_eq!(state.phase, TargetPhase::Unbound);
    }

    #[test]
    fn test_failure_sets_backoff_and_success_clears_it() {
        let now = Instant::now();
        let policy = BackoffPolicy::default();
        let mut state = state(now);

        for expected in 1..=3u32 {
            let delay = state.record_failure(now, &policy);
            assert_eq!(state.consecutive_failures, expected);
            assert_eq!(delay, policy.delay(expected));
            assert_eq!(state.backoff_until, Some(now + delay));
        }
        assert!(!state.is_due(now));
        assert!(state.is_due(now + Duration::from_secs(120)));

        state.record_success();
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.backoff_until, None);
        assert_eq!(state.phase, TargetPhase::Ready);
    }

    #[test]
    fn test_in_flight_is_never_due() {
        let now = Instant::now();
        let mut state = state(now);
        state.begin_poll(true);
        assert_eq!(state.phase, TargetPhase::Identifying);
        assert!(!state.is_due(now + Duration::from_secs(3600)));

        state.schedule_next(now, Duration::from_secs(10));
        assert!(!state.in_flight);
        assert_eq!(state.phase, TargetPhase::Unbound);
        assert!(!state.is_due(now));
        assert!(state.is_due(now + Duration::from_secs(10)));
    }

    #[test]
    fn test_identity_refresh_policy() {
        let now = Instant::now();
        let refresh = Duration::from_secs(600);
        let policy = BackoffPolicy::default();
        let mut state = state(now);

        state.record_identity_failure(now);
        assert!(!state.needs_identity(now, refresh));
        assert!(state.needs_identity(now + refresh, refresh));

        for _ in 0..FORCED_REFRESH_FAILURES {
            state.record_failure(now, &policy);
        }
        assert!(state.needs_identity(now, refresh));

        let (identity, driver) = pro4pm();
        state.record_identity(identity, driver, now);
        assert_eq!(state.phase, TargetPhase::Ready);
        assert!(!state.needs_identity(now, refresh));
    }

    #[test]
    fn test_identity_failure_keeps_bound_driver() {
        let now = Instant::now();
        let mut state = state(now);
        let (identity, driver) = pro4pm();
        state.record_identity(identity, driver, now);

        state.record_identity_failure(now + Duration::from_secs(1));
        assert_eq!(state.driver.as_ref().map(|d| d.id()), Some("pro4pm_gen2"));
    }

    #[test]
    fn test_unsupported_identity() {
        let now = Instant::now();
        let mut state = state(now);
        let identity = DeviceIdentity::from_value(json!({"gen": 9, "app": "Nope"})).unwrap();
        state.record_identity(identity, None, now);
        assert_eq!(state.phase, TargetPhase::Unsupported);
        assert!(state.driver.is_none());
    }

    #[test]
    fn test_update_descriptor_preserves_state() {
        let now = Instant::now();
        let mut state = state(now);
        let (identity, driver) = pro4pm();
        state.record_identity(identity, driver, now);
        state.record_failure(now, &BackoffPolicy::default());

        state.update_descriptor(TargetDescriptor::new("pro", "http://10.0.0.5/").with_poll_interval(5));
        assert!(state.driver.is_some());
        assert_eq!(state.consecutive_failures, 1);
        assert!(!state.needs_identity(now, Duration::from_secs(600)));

        state.update_descriptor(TargetDescriptor::new("pro", "10.0.0.6"));
        assert!(state.needs_identity(now, Duration::from_secs(600)));
        assert_eq!(state.consecutive_failures, 1);
    }

    #[test]
    fn test_snapshot() {
        let now = Instant::now();
        let mut state = state(now);
        let (identity, driver) = pro4pm();
        state.record_identity(identity, driver, now);
        state.record_failure(now, &BackoffPolicy::default());

        let snapshot = state.snapshot(now);
        assert_eq!(snapshot.phase, TargetPhase::Backoff);
        assert_eq!(snapshot.driver.as_deref(), Some("pro4pm_gen2"));
        assert_eq!(snapshot.backoff_remaining, Some(Duration::from_secs(30)));

        let later = state.snapshot(now + Duration::from_secs(31));
        assert_eq!(later.phase, TargetPhase::Ready);
        assert_eq!(later.backoff_remaining, None);
    }
}

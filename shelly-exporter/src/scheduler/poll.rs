//! One poll attempt, run as its own task.

use std::sync::Arc;
use std::time::{Duration, Instant};

use shelly_devices::{
    ChannelDescriptor, ClientPool, Credentials, DeviceDriver, DeviceIdentity, DeviceReading,
    DriverRegistry, build_reading,
};
use tokio::sync::OwnedSemaphorePermit;
use tracing::{Instrument, debug, info, info_span, warn};

/// Identity fetch result carried back to the scheduler.
#[derive(Debug)]
pub enum IdentityUpdate {
    Fetched {
        identity: DeviceIdentity,
        driver: Option<Arc<dyn DeviceDriver>>,
    },
    Failed,
}

#[derive(Debug)]
pub enum PollResult {
    /// No driver bound, nothing was polled.
    Skipped,
    Success(DeviceReading),
    Failure(DeviceReading),
}

#[derive(Debug)]
pub struct PollOutcome {
    pub name: String,
    pub epoch: u64,
    pub identity: Option<IdentityUpdate>,
    pub result: PollResult,
}

/// Everything a poll needs, copied out of the target state at dispatch.
pub struct PollJob {
    pub name: String,
    pub epoch: u64,
    pub address: String,
    pub credentials: Option<Credentials>,
    pub channels: Vec<ChannelDescriptor>,
    pub refresh_identity: bool,
    pub driver: Option<Arc<dyn DeviceDriver>>,
    pub identity: Option<DeviceIdentity>,
    pub timeout: Duration,
    pub pool: ClientPool,
    pub registry: Arc<DriverRegistry>,
}

impl PollJob {
    /// Run the poll while holding a concurrency permit.
    pub async fn run(self, permit: OwnedSemaphorePermit) -> PollOutcome {
        let span = info_span!("poll", device = %self.name);
        let outcome = self.poll().instrument(span).await;
        drop(permit);
        outcome
    }

    async fn poll(self) -> PollOutcome {
        let started = Instant::now();
        let PollJob {
            name,
            epoch,
            address,
            credentials,
            channels,
            refresh_identity,
            mut driver,
            mut identity,
            timeout,
            pool,
            registry,
        } = self;

        let client = match pool.client(&address, credentials) {
            Ok(client) => client.with_timeout(timeout),
            Err(e) => {
                warn!(address = %address, error = %e, "Cannot create RPC client");
                let reading = DeviceReading::unreachable(&name, started.elapsed(), e.to_string());
                return PollOutcome {
                    name,
                    epoch,
                    identity: None,
                    result: PollResult::Failure(reading),
                };
            }
        };

        let mut identity_update = None;
        if refresh_identity {
            match client.get_device_info().await {
                Ok(fetched) => {
                    let resolved = registry.resolve(&fetched);
                    match &resolved {
                        Some(d) => info!(
                            driver = d.id(),
                            generation = ?fetched.generation(),
                            app = ?fetched.app(),
                            "Selected driver"
                        ),
                        None => warn!(
                            generation = ?fetched.generation(),
                            app = ?fetched.app(),
                            "No driver for device"
                        ),
                    }
                    driver = resolved.clone();
                    identity = Some(fetched.clone());
                    identity_update = Some(IdentityUpdate::Fetched {
                        identity: fetched,
                        driver: resolved,
                    });
                }
                Err(e) => {
                    warn!(address = %address, error = %e, "Failed to fetch device info");
                    identity_update = Some(IdentityUpdate::Failed);
                }
            }
        }

        let Some(driver) = driver else {
            debug!("No driver bound, skipping poll");
            return PollOutcome {
                name,
                epoch,
                identity: identity_update,
                result: PollResult::Skipped,
            };
        };

        let result = match client.get_status().await {
            Ok(status) => {
                let identity = identity.unwrap_or_default();
                let reading = build_reading(
                    driver.as_ref(),
                    &name,
                    started.elapsed(),
                    &status,
                    &identity,
                    &channels,
                );
                debug!(
                    duration = ?reading.poll_duration,
                    channels = reading.channels.len(),
                    "Polled device"
                );
                PollResult::Success(reading)
            }
            Err(e) => {
                warn!(address = %address, kind = %e.kind(), error = %e, "Poll failed");
                PollResult::Failure(DeviceReading::unreachable(
                    &name,
                    started.elapsed(),
                    e.to_string(),
                ))
            }
        };

        PollOutcome {
            name,
            epoch,
            identity: identity_update,
            result,
        }
    }
}

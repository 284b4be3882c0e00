use std::time::Duration;

use async_trait::async_trait;
use shelly_devices::{ClientPool, Credentials, DeviceIdentity, RpcErrorKind};
use tracing::{debug, trace};

/// Result of probing one address.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    Found(DeviceIdentity),
    /// Something answered but rejected the credentials.
    AuthRequired,
    /// Timeout, transport error, bad status or a payload that is not a device.
    NotFound,
}

/// Asks one address for its identity.
#[async_trait]
pub trait IdentityProbe: Send + Sync {
    async fn probe(
        &self,
        address: &str,
        credentials: Option<&Credentials>,
        timeout: Duration,
    ) -> ProbeOutcome;
}

/// Probe issuing `Shelly.GetDeviceInfo` through a dedicated client pool.
#[derive(Debug, Clone)]
pub struct RpcProbe {
    pool: ClientPool,
}

impl RpcProbe {
    pub fn new(pool: ClientPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &ClientPool {
        &self.pool
    }
}

#[async_trait]
impl IdentityProbe for RpcProbe {
    async fn probe(
        &self,
        address: &str,
        credentials: Option<&Credentials>,
        timeout: Duration,
    ) -> ProbeOutcome {
        let client = match self.pool.client(address, credentials.cloned()) {
            Ok(client) => client.with_timeout(timeout),
            Err(e) => {
                debug!(address, error = %e, "Cannot probe address");
                return ProbeOutcome::NotFound;
            }
        };

        match client.get_device_info().await {
            Ok(identity) if identity.looks_like_device() => ProbeOutcome::Found(identity),
            Ok(_) => {
                trace!(address, "Answer is not a device identity");
                ProbeOutcome::NotFound
            }
            Err(e) if e.kind() == RpcErrorKind::Auth => {
                debug!(address, "Device requires authentication, skipping");
                ProbeOutcome::AuthRequired
            }
            Err(e) => {
                trace!(address, error = %e, "No device at address");
                ProbeOutcome::NotFound
            }
        }
    }
}

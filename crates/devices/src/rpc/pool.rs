use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use super::client::{Credentials, RpcClient};
use super::error::RpcError;

/// Default request timeout (3 seconds).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Default connection bound.
pub const DEFAULT_MAX_CONNECTIONS: usize = 100;

/// Configuration for a [`ClientPool`].
#[derive(Debug, Clone)]
pub struct ClientPoolConfig {
    /// Timeout applied to every request (connect + response).
    pub timeout: Duration,
    /// Sizes the keep-alive pool: half of it is kept idle per host.
    ///
    /// This does not cap open connections. Concurrent requests are bounded by
    /// the callers, the scheduler and scanner each holding their own limit.
    pub max_connections: usize,
}

impl Default for ClientPoolConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_REQUEST_TIMEOUT,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

/// Shared HTTP connection manager handing out per-device [`RpcClient`]s.
///
/// All handles share one `reqwest::Client`, so keep-alive connections are
/// reused across polls.
#[derive(Debug, Clone)]
pub struct ClientPool {
    http: Client,
    config: ClientPoolConfig,
    request_ids: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
}

impl ClientPool {
    pub fn new(config: ClientPoolConfig) -> Result<Self, RpcError> {
        let idle_per_host = (config.max_connections / 2).max(1);
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .pool_max_idle_per_host(idle_per_host)
            .build()
            .map_err(RpcError::Transport)?;

        debug!(
            timeout = ?config.timeout,
            max_connections = config.max_connections,
            "Created RPC client pool"
        );

        Ok(Self {
            http,
            config,
            request_ids: Arc::new(AtomicU64::new(0)),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn config(&self) -> &ClientPoolConfig {
        &self.config
    }

    /// Hand out a client for one device address.
    pub fn client(
        &self,
        address: &str,
        credentials: Option<Credentials>,
    ) -> Result<RpcClient, RpcError> {
        if self.is_closed() {
            return Err(RpcError::PoolClosed);
        }
        RpcClient::with_shared(
            self.http.clone(),
            address,
            credentials,
            self.request_ids.clone(),
            self.closed.clone(),
        )
    }

    /// Stop handing out work. Idempotent.
    ///
    /// Every handle, including ones handed out earlier, refuses new calls with
    /// [`RpcError::PoolClosed`]. Requests already in flight run to completion.
    /// The underlying connections are shared by all clones of the pool and its
    /// handles; they are released when the last of those is dropped, which the
    /// owner does right after closing.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("RPC client pool closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

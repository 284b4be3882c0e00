use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::trace;
use url::Url;

use super::error::RpcError;
use crate::identity::DeviceIdentity;

/// RPC method returning the device identity blob.
pub const METHOD_GET_DEVICE_INFO: &str = "Shelly.GetDeviceInfo";
/// RPC method returning the full status object.
pub const METHOD_GET_STATUS: &str = "Shelly.GetStatus";

/// HTTP Basic credentials for a device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Whether either field is set. Empty credentials are treated as "none".
    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty() || !self.password.is_empty()
    }
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    id: u64,
    method: &'a str,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    #[serde(default)]
    code: Option<Value>,
    #[serde(default)]
    message: Option<String>,
}

/// Normalize a configured device address into the device's `/rpc` endpoint.
///
/// Accepts bare hosts (`10.0.80.22`), `host:port` pairs and full URLs, with or
/// without a trailing slash.
pub fn rpc_endpoint(address: &str) -> Result<Url, RpcError> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(RpcError::InvalidAddress(address.to_string()));
    }

    let base = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    let base = base.trim_end_matches('/');

    Url::parse(&format!("{base}/rpc")).map_err(|e| RpcError::InvalidAddress(format!("{address}: {e}")))
}

/// Lightweight per-device RPC handle.
///
/// Handles are cheap to clone and share the HTTP connection pool, request-id
/// sequence and closed flag of the [`ClientPool`](super::ClientPool) that
/// created them.
#[derive(Debug, Clone)]
pub struct RpcClient {
    http: Client,
    endpoint: Url,
    credentials: Option<Credentials>,
    timeout: Option<Duration>,
    request_ids: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
}

impl RpcClient {
    /// Create a standalone client with its own request-id sequence.
    pub fn new(
        http: Client,
        address: &str,
        credentials: Option<Credentials>,
    ) -> Result<Self, RpcError> {
        Self::with_shared(
            http,
            address,
            credentials,
            Arc::new(AtomicU64::new(0)),
            Arc::new(AtomicBool::new(false)),
        )
    }

    pub(crate) fn with_shared(
        http: Client,
        address: &str,
        credentials: Option<Credentials>,
        request_ids: Arc<AtomicU64>,
        closed: Arc<AtomicBool>,
    ) -> Result<Self, RpcError> {
        Ok(Self {
            http,
            endpoint: rpc_endpoint(address)?,
            credentials: credentials.filter(Credentials::has_credentials),
            timeout: None,
            request_ids,
            closed,
        })
    }

    /// Override the pool-wide timeout for calls made through this handle.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Issue one RPC call and return its `result` object.
    ///
    /// No retries happen here. A missing `result` yields an empty object.
    pub async fn call(&self, method: &str) -> Result<Value, RpcError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RpcError::PoolClosed);
        }

        let id = self.request_ids.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(endpoint = %self.endpoint, method, id, "RPC request");

        let mut request = self
            .http
            .post(self.endpoint.clone())
            .json(&RpcRequest { id, method });
        if let Some(credentials) = &self.credentials {
            request = request.basic_auth(&credentials.username, Some(&credentials.password));
        }
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(RpcError::Auth(status.as_u16()));
        }
        if !status.is_success() {
            return Err(RpcError::Status(status.as_u16()));
        }

        let body: RpcResponse = response.json().await?;
        if let Some(error) = body.error {
            let code = match error.code {
                Some(Value::String(s)) => s,
                Some(other) => other.to_string(),
                None => "unknown".to_string(),
            };
            return Err(RpcError::Rpc {
                code,
                message: error.message.unwrap_or_else(|| "Unknown error".to_string()),
            });
        }

        Ok(body.result.unwrap_or_else(|| Value::Object(Map::new())))
    }

    /// Fetch the device identity blob (`Shelly.GetDeviceInfo`).
    pub async fn get_device_info(&self) -> Result<DeviceIdentity, RpcError> {
        let result = self.call(METHOD_GET_DEVICE_INFO).await?;
        DeviceIdentity::from_value(result).ok_or_else(|| {
            RpcError::InvalidResponse("device info result is not an object".to_string())
        })
    }

    /// Fetch the raw status object (`Shelly.GetStatus`).
    pub async fn get_status(&self) -> Result<Value, RpcError> {
        self.call(METHOD_GET_STATUS).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_endpoint_normalization() {
        assert_eq!(
            rpc_endpoint("10.0.80.22").unwrap().as_str(),
            "http://10.0.80.22/rpc"
        );
        assert_eq!(
            rpc_endpoint("http://10.0.80.22/").unwrap().as_str(),
            "http://10.0.80.22/rpc"
        );
        assert_eq!(
            rpc_endpoint("127.0.0.1:8080").unwrap().as_str(),
            "http://127.0.0.1:8080/rpc"
        );
        assert_eq!(
            rpc_endpoint("https://plug.local").unwrap().as_str(),
            "https://plug.local/rpc"
        );
    }

    #[test]
    fn test_rpc_endpoint_rejects_empty() {
        assert!(matches!(
            rpc_endpoint("   "),
            Err(RpcError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_empty_credentials_are_dropped() {
        let client = RpcClient::new(Client::new(), "10.0.0.1", Some(Credentials::default())).unwrap();
        assert!(client.credentials.is_none());

        let client = RpcClient::new(
            Client::new(),
            "10.0.0.1",
            Some(Credentials::new("admin", "secret")),
        )
        .unwrap();
        assert!(client.credentials.is_some());
    }
}

use thiserror::Error;

/// Coarse classification of an RPC failure.
///
/// Retry and backoff policy only needs to know which of these three buckets a
/// failure falls into; the concrete [`RpcError`] variant carries the detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcErrorKind {
    /// Credentials missing or rejected (HTTP 401/403).
    Auth,
    /// No response within the configured timeout.
    Timeout,
    /// Any other transport, HTTP status or protocol-level failure.
    Client,
}

impl RpcErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Timeout => "timeout",
            Self::Client => "client",
        }
    }
}

impl std::fmt::Display for RpcErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("authentication failed: HTTP {0}")]
    Auth(u16),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("HTTP error: status {0}")]
    Status(u16),
    #[error("RPC error {code}: {message}")]
    Rpc { code: String, message: String },
    #[error("request error: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("invalid device address: {0}")]
    InvalidAddress(String),
    #[error("client pool closed")]
    PoolClosed,
}

impl RpcError {
    /// Map this error onto the auth / timeout / client taxonomy.
    pub fn kind(&self) -> RpcErrorKind {
        match self {
            Self::Auth(_) => RpcErrorKind::Auth,
            Self::Timeout(_) => RpcErrorKind::Timeout,
            _ => RpcErrorKind::Client,
        }
    }

    pub fn is_auth(&self) -> bool {
        self.kind() == RpcErrorKind::Auth
    }

    pub fn is_timeout(&self) -> bool {
        self.kind() == RpcErrorKind::Timeout
    }
}

impl From<reqwest::Error> for RpcError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            return Self::Timeout(error.to_string());
        }
        if let Some(status) = error.status() {
            let code = status.as_u16();
            if code == 401 || code == 403 {
                return Self::Auth(code);
            }
            return Self::Status(code);
        }
        if error.is_decode() {
            return Self::InvalidResponse(error.to_string());
        }
        Self::Transport(error)
    }
}

//! JSON-RPC over HTTP transport.
//!
//! One fixed request shape: `POST <address>/rpc` with `{"id", "method"}`,
//! answered by either a `result` object or an `error` object. Failures are
//! classified into [`RpcErrorKind`] so callers can apply a single backoff
//! policy without inspecting transport details.

mod client;
mod error;
mod pool;

pub use client::{Credentials, METHOD_GET_DEVICE_INFO, METHOD_GET_STATUS, RpcClient, rpc_endpoint};
pub use error::{RpcError, RpcErrorKind};
pub use pool::{ClientPool, ClientPoolConfig, DEFAULT_MAX_CONNECTIONS, DEFAULT_REQUEST_TIMEOUT};

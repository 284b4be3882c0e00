use thiserror::Error;

/// Failure reported by a driver while scoring an identity.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("malformed device identity: {0}")]
    InvalidIdentity(String),
    #[error("{0}")]
    Other(String),
}

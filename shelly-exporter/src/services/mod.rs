//! Wiring of the long-running services.

mod engine;

pub use engine::{DEFAULT_SHUTDOWN_TIMEOUT, Engine};

use std::sync::Arc;

use tracing::{debug, warn};

use super::DeviceDriver;
use super::models::{
    BluGwGen2, BluGwGen3, Dimmer0110VpmGen3, PlugUsGen2, PlusWallDimmerGen2, Pro2PmGen2,
    Pro4PmGen2, Shelly1PmGen4,
};
use crate::identity::DeviceIdentity;

macro_rules! driver_registry {
    ( $( $driver:expr ),+ $(,)? ) => {
        vec![ $( Arc::new($driver) as Arc<dyn DeviceDriver> ),+ ]
    };
}

/// Built-in drivers in registration order. Earlier entries win ties.
fn builtin_drivers() -> Vec<Arc<dyn DeviceDriver>> {
    driver_registry![
        Pro4PmGen2,
        Pro2PmGen2,
        Shelly1PmGen4,
        PlugUsGen2,
        Dimmer0110VpmGen3,
        PlusWallDimmerGen2,
        BluGwGen2,
        BluGwGen3,
    ]
}

/// Ordered collection of drivers, resolved by score.
#[derive(Debug, Clone, Default)]
pub struct DriverRegistry {
    drivers: Vec<Arc<dyn DeviceDriver>>,
}

impl DriverRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in driver.
    pub fn with_builtin_drivers() -> Self {
        let registry = Self {
            drivers: builtin_drivers(),
        };
        debug!(drivers = registry.len(), "Initialized driver registry");
        registry
    }

    pub fn register(&mut self, driver: Arc<dyn DeviceDriver>) {
        debug!(driver = driver.id(), name = driver.name(), "Registered driver");
        self.drivers.push(driver);
    }

    pub fn drivers(&self) -> &[Arc<dyn DeviceDriver>] {
        &self.drivers
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn DeviceDriver>> {
        self.drivers.iter().find(|d| d.id() == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    /// Pick the highest scoring driver for an identity.
    ///
    /// Ties go to the earliest registered driver. A driver that fails to
    /// score is logged and counted as 0. Returns `None` when nothing scores
    /// above 0.
    pub fn resolve(&self, identity: &DeviceIdentity) -> Option<Arc<dyn DeviceDriver>> {
        let mut best: Option<(&Arc<dyn DeviceDriver>, u32)> = None;

        for driver in &self.drivers {
            let score = match driver.score(identity) {
                Ok(score) => score,
                Err(e) => {
                    warn!(driver = driver.id(), error = %e, "Driver failed to score device");
                    0
                }
            };
            let best_score = best.map_or(0, |(_, s)| s);
            if score > best_score {
                best = Some((driver, score));
            }
        }

        match best {
            Some((driver, score)) => {
                debug!(
                    driver = driver.id(),
                    score,
                    generation = ?identity.generation(),
                    app = ?identity.app(),
                    "Selected driver"
                );
                Some(driver.clone())
            }
            None => {
                debug!(
                    generation = ?identity.generation(),
                    app = ?identity.app(),
                    model = ?identity.model(),
                    "No driver matches device"
                );
                None
            }
        }
    }
}

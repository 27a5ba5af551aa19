//! Manager configuration.

use std::net::SocketAddr;

use crate::error::{Error, Result};

/// Default manager port.
pub const DEFAULT_MANAGER_PORT: u16 = 42000;

/// Configuration for the manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Control channel listen address
    pub bind: SocketAddr,

    /// Seed for free-peer sampling; entropy when unset
    pub seed: Option<u64>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], DEFAULT_MANAGER_PORT)),
            seed: None,
        }
    }
}

impl ManagerConfig {
    /// Create config from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("RINGSTORE_MANAGER_ADDR") {
            config.bind = addr
                .parse()
                .map_err(|_| Error::Config(format!("invalid RINGSTORE_MANAGER_ADDR: {}", addr)))?;
        }

        if let Ok(seed) = std::env::var("RINGSTORE_MANAGER_SEED") {
            config.seed = Some(
                seed.parse()
                    .map_err(|_| Error::Config(format!("invalid RINGSTORE_MANAGER_SEED: {}", seed)))?,
            );
        }

        Ok(config)
    }
}

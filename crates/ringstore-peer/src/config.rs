//! Peer configuration.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Manager port peers contact by default.
pub const DEFAULT_MANAGER_PORT: u16 = 42000;

/// Configuration for a peer.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Registered peer name
    pub name: String,

    /// Manager control address
    pub manager: SocketAddr,

    /// Local control socket address
    pub control: SocketAddr,

    /// Local data socket address
    pub data: SocketAddr,

    /// Directory holding `details-<key>.csv` files
    pub data_dir: PathBuf,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            name: "peer1".to_string(),
            manager: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_MANAGER_PORT)),
            control: SocketAddr::from((Ipv4Addr::LOCALHOST, 42001)),
            data: SocketAddr::from((Ipv4Addr::LOCALHOST, 42002)),
            data_dir: PathBuf::from("."),
        }
    }
}

fn parse_addr(var: &str, value: &str) -> Result<SocketAddr> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("invalid {}: {}", var, value)))
}

impl PeerConfig {
    /// Create config from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(name) = std::env::var("RINGSTORE_PEER_NAME") {
            config.name = name;
        }
        if let Ok(addr) = std::env::var("RINGSTORE_MANAGER_ADDR") {
            config.manager = parse_addr("RINGSTORE_MANAGER_ADDR", &addr)?;
        }
        if let Ok(addr) = std::env::var("RINGSTORE_CONTROL_ADDR") {
            config.control = parse_addr("RINGSTORE_CONTROL_ADDR", &addr)?;
        }
        if let Ok(addr) = std::env::var("RINGSTORE_DATA_ADDR") {
            config.data = parse_addr("RINGSTORE_DATA_ADDR", &addr)?;
        }
        if let Ok(dir) = std::env::var("RINGSTORE_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        Ok(config)
    }

    /// IPv4 address other peers reach this one at.
    ///
    /// Both sockets must share it, since the registry stores one address
    /// per peer.
    pub fn advertise(&self) -> Result<Ipv4Addr> {
        match (self.control, self.data) {
            (SocketAddr::V4(control), SocketAddr::V4(data)) if control.ip() == data.ip() => {
                if data.ip().is_unspecified() {
                    return Err(Error::Config(
                        "data address must be a concrete IPv4 address".to_string(),
                    ));
                }
                Ok(*data.ip())
            }
            _ => Err(Error::Config(format!(
                "control {} and data {} must share one IPv4 address",
                self.control, self.data
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_manager() {
        let config = PeerConfig::default();
        assert_eq!(config.manager.port(), 42000);
        assert_eq!(config.advertise().unwrap(), Ipv4Addr::LOCALHOST);
    }

    #[test]
    fn advertise_rejects_split_or_wildcard_addresses() {
        let mut config = PeerConfig::default();
        config.data = "10.0.0.7:42002".parse().unwrap();
        assert!(matches!(config.advertise(), Err(Error::Config(_))));

        config.control = "0.0.0.0:42001".parse().unwrap();
        config.data = "0.0.0.0:42002".parse().unwrap();
        assert!(matches!(config.advertise(), Err(Error::Config(_))));
    }
}

//! Ringstore Transfer - Datagram transports
//!
//! This crate provides:
//! - The [`Transport`] trait: send and receive single datagrams
//! - [`UdpTransport`], a socket2-configured tokio UDP socket
//! - [`ChannelNetwork`] / [`ChannelTransport`], an in-memory network for tests
//!
//! # Example
//!
//! ```rust,ignore
//! use ringstore_transfer::{Transport, TransportConfig, UdpTransport};
//!
//! let transport = UdpTransport::bind(TransportConfig::bound_to("0.0.0.0:42000".parse()?)).await?;
//! transport.send_to(b"register peer1 10.0.0.7 42001 42002", manager).await?;
//! ```

pub mod channel;
pub mod transport;

pub use channel::{ChannelNetwork, ChannelTransport};
pub use transport::{Transport, TransportConfig, UdpTransport, MAX_DATAGRAM};

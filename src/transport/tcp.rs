//! Raw TCP transport.
//!
//! Many controllers are reachable through a transparent WiFi-to-serial
//! bridge listening on a plain TCP port (23 by convention).
//!
//! # Example
//!
//! ```ignore
//! use aurora_client::transport::tcp;
//! use aurora_client::DeviceBuilder;
//!
//! let (reader, writer) = tcp::connect("192.168.4.1:23").await?;
//! let device = DeviceBuilder::new(tcp::KIND).spawn(reader, writer);
//! ```

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};

use super::TransportKind;
use crate::error::Result;

/// Default port used by transparent TCP bridges.
pub const DEFAULT_PORT: u16 = 23;

/// Capability tag for TCP links.
pub const KIND: TransportKind = TransportKind::Tcp;

/// Connect to a device and split the stream into read and write halves.
///
/// Nagle is disabled: command frames are tiny and latency-bound.
pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<(OwnedReadHalf, OwnedWriteHalf)> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    let peer = stream.peer_addr()?;
    tracing::debug!("Connected to {}", peer);
    Ok(stream.into_split())
}

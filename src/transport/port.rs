//! Port trait and transport capability tag.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default deadline for direct serial links.
pub const SERIAL_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default deadline for bridged, radio, and TCP links.
pub const BRIDGED_TIMEOUT: Duration = Duration::from_millis(3000);

/// Capability tag supplied by the transport adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Local serial port (USB CDC or UART).
    Serial,
    /// Transparent radio bridge (BLE UART modules and similar).
    Bridge,
    /// Raw TCP socket, usually a WiFi-to-serial bridge.
    Tcp,
    /// Anything else.
    #[default]
    Unknown,
}

impl TransportKind {
    /// Deadline used when no explicit timeout is configured.
    ///
    /// Serial links answer quickly; everything that hops through a bridge
    /// gets more slack.
    pub fn default_timeout(self) -> Duration {
        match self {
            TransportKind::Serial => SERIAL_TIMEOUT,
            TransportKind::Bridge | TransportKind::Tcp | TransportKind::Unknown => BRIDGED_TIMEOUT,
        }
    }
}

/// Duplex byte sink consumed by the session.
pub trait Port {
    /// Whether the underlying transport is open.
    fn is_open(&self) -> bool;

    /// Write bytes to the transport.
    ///
    /// Must not block. Implementations backed by async I/O queue the bytes.
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Transport capability tag.
    fn kind(&self) -> TransportKind;

    /// Close the transport. Later writes are refused and `is_open` is false.
    fn close(&mut self);
}

impl<P: Port + ?Sized> Port for Box<P> {
    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write(bytes)
    }

    fn kind(&self) -> TransportKind {
        (**self).kind()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

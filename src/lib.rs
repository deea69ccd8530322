//! # aurora-client
//!
//! Host-side driver for the NLED Aurora protocol.
//!
//! This crate lets a host talk to NLED lighting controllers over serial,
//! radio bridges, or TCP: the three-step handshake, 5-byte command frames,
//! device→host payloads, and packetized uploads with per-packet
//! acknowledge, all with timeout and retry.
//!
//! ## Architecture
//!
//! - **Session** (sans-IO): a synchronous state machine fed with inbound
//!   chunks and deadline expiries, writing through a [`Port`]
//! - **Device** (tokio): one task per connection that owns a session, reads
//!   the transport, and fires deadlines
//!
//! ## Example
//!
//! ```ignore
//! use aurora_client::{commands, transport::tcp, DeviceBuilder};
//!
//! #[tokio::main]
//! async fn main() -> aurora_client::Result<()> {
//!     let (reader, writer) = tcp::connect("192.168.4.1:23").await?;
//!     let device = DeviceBuilder::new(tcp::KIND).spawn(reader, writer)?;
//!
//!     device
//!         .dispatch(commands::request_device_info(|info| {
//!             println!("device info: {:?}", info);
//!         }))
//!         .await?;
//!
//!     device.wait_for_shutdown().await
//! }
//! ```

pub mod commands;
pub mod config;
pub mod error;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod writer;

mod device;

pub use config::SessionConfig;
pub use device::{DeviceBuilder, DeviceHandle};
pub use error::{AuroraError, Result};
pub use session::{
    AckEffect, Command, Dispatch, OnAck, PayloadOutcome, Progress, Segment, Session,
    SessionHooks, State, Upload,
};
pub use transport::{Port, TransportKind};

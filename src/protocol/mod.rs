//! Protocol module - wire markers, command frame, and the inbound byte window.
//!
//! This module implements the byte-level side of the Aurora protocol:
//! - handshake and acknowledge markers
//! - 5-byte command frame encoding
//! - fixed-depth window for matching markers across fragmented reads

mod wire_format;
mod window;

pub use window::{ByteWindow, InboundByte, WINDOW_DEPTH};
pub use wire_format::{
    command_ack, CommandFrame, AUTHENTICATE, AUTHENTICATE_ACK, COMMAND_ACK_PREFIX,
    COMMAND_ACK_SIZE, ERROR, FRAME_SIZE, PACKET_ACK, REQUEST, REQUEST_ACK, UNLOCK_SIZE,
};

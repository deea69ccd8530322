//! Wire markers and the command frame.
//!
//! Every transaction starts with a fixed ASCII handshake:
//! ```text
//! host   ──► "NLED11"          request
//! device ◄── "a9"              request ack
//! host   ──► "nled99"          authenticate
//! device ◄── "f0"              authenticate ack
//! host   ──► [cmd,d1,d2,d3,d4] command frame
//! device ◄── "cmd" 0x00 cmd    command ack   (or "ERR")
//! ```
//!
//! Markers below are listed in wire order (oldest byte first). The inbound
//! window stores the newest byte at index 0, so `a9` shows up as
//! `window[1] == b'a'`, `window[0] == b'9'`.

/// Command request, first bytes sent by the host.
pub const REQUEST: &[u8] = b"NLED11";

/// Device acknowledges the request.
pub const REQUEST_ACK: &[u8] = b"a9";

/// Authentication token sent after the request ack.
pub const AUTHENTICATE: &[u8] = b"nled99";

/// Device acknowledges authentication.
pub const AUTHENTICATE_ACK: &[u8] = b"f0";

/// Device-reported error.
pub const ERROR: &[u8] = b"ERR";

/// Acknowledge for one uploaded packet.
pub const PACKET_ACK: &[u8] = b"zAck";

/// Prefix of the command acknowledge; followed by `0x00` and the command id.
pub const COMMAND_ACK_PREFIX: &[u8] = b"cmd";

/// Command acknowledge length in bytes.
pub const COMMAND_ACK_SIZE: usize = 5;

/// Command frame length in bytes.
pub const FRAME_SIZE: usize = 5;

/// Length of the full unlock sequence (`NLED11nled99`).
pub const UNLOCK_SIZE: usize = 12;

/// Build the command acknowledge marker for `cmd`, in wire order.
#[inline]
pub fn command_ack(cmd: u8) -> [u8; COMMAND_ACK_SIZE] {
    [
        COMMAND_ACK_PREFIX[0],
        COMMAND_ACK_PREFIX[1],
        COMMAND_ACK_PREFIX[2],
        0x00,
        cmd,
    ]
}

/// The 5-byte command frame: identifier plus four data bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFrame {
    /// Command identifier.
    pub cmd: u8,
    /// Fixed-width argument bytes.
    pub data: [u8; 4],
}

impl CommandFrame {
    /// Create a new command frame.
    pub fn new(cmd: u8, data: [u8; 4]) -> Self {
        Self { cmd, data }
    }

    /// Encode the frame to wire bytes.
    ///
    /// # Example
    ///
    /// ```
    /// use aurora_client::protocol::CommandFrame;
    ///
    /// let frame = CommandFrame::new(69, [0, 1, 0, 16]);
    /// assert_eq!(frame.encode(), [69, 0, 1, 0, 16]);
    /// ```
    pub fn encode(&self) -> [u8; FRAME_SIZE] {
        [self.cmd, self.data[0], self.data[1], self.data[2], self.data[3]]
    }

    /// Encode the unlock sequence followed by the frame, for fast mode.
    ///
    /// ```
    /// use aurora_client::protocol::CommandFrame;
    ///
    /// let bytes = CommandFrame::new(4, [0; 4]).encode_unlocked();
    /// assert_eq!(&bytes[..12], b"NLED11nled99");
    /// assert_eq!(&bytes[12..], &[4, 0, 0, 0, 0]);
    /// ```
    pub fn encode_unlocked(&self) -> [u8; UNLOCK_SIZE + FRAME_SIZE] {
        let mut buf = [0u8; UNLOCK_SIZE + FRAME_SIZE];
        buf[..REQUEST.len()].copy_from_slice(REQUEST);
        buf[REQUEST.len()..UNLOCK_SIZE].copy_from_slice(AUTHENTICATE);
        buf[UNLOCK_SIZE..].copy_from_slice(&self.encode());
        buf
    }
}

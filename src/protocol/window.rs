//! Inbound byte window for delivery-boundary-agnostic marker matching.
//!
//! Inbound data can be split across any number of transport events, so the
//! state machine never looks at a chunk as a packet. Each byte is pushed into
//! a fixed-depth window of the most recent bytes (newest at index 0) and
//! markers are matched against its tail.
//!
//! # Example
//!
//! ```
//! use aurora_client::protocol::ByteWindow;
//!
//! let mut window = ByteWindow::new();
//! for byte in b"xxa9" {
//!     window.push(*byte);
//! }
//!
//! assert_eq!(window[0], b'9');
//! assert_eq!(window[1], b'a');
//! assert!(window.matches(b"a9"));
//! ```

use std::ops::Index;

/// Window depth. Must cover the widest marker (5-byte command ack).
pub const WINDOW_DEPTH: usize = 10;

/// A single inbound byte, normalized to an unsigned 8-bit value.
///
/// Transports deliver either raw bytes or single-character text; both end up
/// as the same `u8` in the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboundByte(pub u8);

impl From<u8> for InboundByte {
    #[inline]
    fn from(b: u8) -> Self {
        InboundByte(b)
    }
}

impl From<&u8> for InboundByte {
    #[inline]
    fn from(b: &u8) -> Self {
        InboundByte(*b)
    }
}

impl From<char> for InboundByte {
    /// Keeps the low 8 bits of the code point.
    #[inline]
    fn from(c: char) -> Self {
        InboundByte((c as u32 & 0xFF) as u8)
    }
}

/// Fixed-depth ring of the most recently received bytes.
///
/// Always exactly [`WINDOW_DEPTH`] bytes long; pushing never allocates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteWindow {
    bytes: [u8; WINDOW_DEPTH],
}

impl ByteWindow {
    /// Create a zero-filled window.
    pub fn new() -> Self {
        Self {
            bytes: [0; WINDOW_DEPTH],
        }
    }

    /// Insert a byte at the front, evicting the oldest one.
    #[inline]
    pub fn push(&mut self, byte: impl Into<InboundByte>) -> u8 {
        let InboundByte(b) = byte.into();
        self.bytes.copy_within(0..WINDOW_DEPTH - 1, 1);
        self.bytes[0] = b;
        b
    }

    /// Most recently pushed byte.
    #[inline]
    pub fn newest(&self) -> u8 {
        self.bytes[0]
    }

    /// Read the byte at `index` (0 = newest). `None` past the window depth.
    #[inline]
    pub fn get(&self, index: usize) -> Option<u8> {
        self.bytes.get(index).copied()
    }

    /// Check whether the trailing bytes equal `marker`, given in wire order.
    ///
    /// The last byte of `marker` is compared against `window[0]`, the first
    /// one against `window[marker.len() - 1]`.
    #[inline]
    pub fn matches(&self, marker: &[u8]) -> bool {
        if marker.is_empty() || marker.len() > WINDOW_DEPTH {
            return false;
        }
        marker
            .iter()
            .rev()
            .zip(self.bytes.iter())
            .all(|(expected, actual)| expected == actual)
    }

    /// Window depth.
    #[inline]
    pub fn len(&self) -> usize {
        WINDOW_DEPTH
    }

    /// Always false; the window has a fixed, non-zero depth.
    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Zero-fill the window.
    pub fn clear(&mut self) {
        self.bytes = [0; WINDOW_DEPTH];
    }

    /// Window contents, newest first.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
}

impl Default for ByteWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<usize> for ByteWindow {
    type Output = u8;

    fn index(&self, index: usize) -> &u8 {
        &self.bytes[index]
    }
}

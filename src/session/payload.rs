//! Payload transfer engine.
//!
//! - [`RxBuffer`] accumulates device→host bytes until the expected length.
//! - [`Upload`] describes a host→device transfer as one or more [`Segment`]s,
//!   each sliced into fixed-size packets that the device acknowledges one by
//!   one with `zAck`.
//!
//! Packets are addressed by a single counter across all segments. With an
//! index table followed by a sequence table, packet `n` comes from the index
//! segment while `n < index.packets()`, and from the sequence segment at
//! `n - index.packets()` afterwards. Each segment keeps its own packet size;
//! the boundary is computed in packets, never in bytes.
//!
//! # Example
//!
//! ```
//! use aurora_client::{Segment, Upload};
//!
//! let index = Segment::new(vec![1u8; 8], 4, 2);
//! let sequence = Segment::new(vec![2u8; 30], 10, 3);
//! let upload = Upload::merged(index, sequence).unwrap();
//!
//! assert_eq!(upload.total_packets(), 5);
//! assert_eq!(upload.packet(1).unwrap().len(), 4);
//! assert_eq!(upload.packet(2).unwrap().len(), 10);
//! assert!(upload.packet(5).is_none());
//! ```

use std::time::Duration;

use bytes::Bytes;

use crate::error::{AuroraError, Result};

/// Default number of received bytes between progress/deadline checkpoints.
pub const DEFAULT_CHECKPOINT_BYTES: usize = 1024;

/// One source buffer of an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    data: Bytes,
    packet_size: usize,
    packets: usize,
}

impl Segment {
    /// Create a segment with a device-defined packet size and packet count.
    ///
    /// The count is taken as given; the device expects exactly this many
    /// packets even if the buffer would slice differently.
    pub fn new(data: impl Into<Bytes>, packet_size: usize, packets: usize) -> Self {
        Self {
            data: data.into(),
            packet_size,
            packets,
        }
    }

    /// Slice `data` into as many `packet_size` packets as it takes.
    pub fn chunked(data: impl Into<Bytes>, packet_size: usize) -> Self {
        let data = data.into();
        let packets = if packet_size == 0 {
            0
        } else {
            data.len().div_ceil(packet_size)
        };
        Self::new(data, packet_size, packets)
    }

    /// Send the whole buffer as a single packet.
    pub fn whole(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let len = data.len();
        Self::new(data, len, 1)
    }

    /// Packet size in bytes.
    #[inline]
    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    /// Number of packets this segment contributes.
    #[inline]
    pub fn packets(&self) -> usize {
        self.packets
    }

    /// Segment data.
    #[inline]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Packet `index` of this segment. Slice bounds clamp to the buffer.
    fn slice(&self, index: usize) -> Bytes {
        let len = self.data.len();
        let start = index.saturating_mul(self.packet_size).min(len);
        let end = start.saturating_add(self.packet_size).min(len);
        self.data.slice(start..end)
    }

    /// An empty segment is allowed; it contributes no packets.
    fn validate(&self) -> Result<()> {
        if self.packets > 0 && self.packet_size == 0 {
            return Err(AuroraError::InvalidUpload("packet size is zero".into()));
        }
        Ok(())
    }
}

/// A host→device packetized transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    segments: Vec<Segment>,
    first_packet_timeout: Option<Duration>,
}

impl Upload {
    /// Build an upload from one or more segments, sent in order.
    pub fn new(segments: Vec<Segment>) -> Result<Self> {
        if segments.is_empty() {
            return Err(AuroraError::InvalidUpload("no segments".into()));
        }
        for segment in &segments {
            segment.validate()?;
        }
        if segments.iter().all(|segment| segment.packets == 0) {
            return Err(AuroraError::InvalidUpload("upload has no packets".into()));
        }
        Ok(Self {
            segments,
            first_packet_timeout: None,
        })
    }

    /// Single-buffer upload.
    pub fn single(segment: Segment) -> Result<Self> {
        Self::new(vec![segment])
    }

    /// Index table followed by sequence table.
    pub fn merged(index: Segment, sequence: Segment) -> Result<Self> {
        Self::new(vec![index, sequence])
    }

    /// Wait longer for the first `zAck`.
    ///
    /// Devices erase flash before accepting the first packet of large
    /// uploads, which can take several seconds.
    pub fn first_packet_timeout(mut self, timeout: Duration) -> Self {
        self.first_packet_timeout = Some(timeout);
        self
    }

    /// Deadline override for the first packet, if any.
    pub fn first_packet_deadline(&self) -> Option<Duration> {
        self.first_packet_timeout
    }

    /// Total packets across all segments.
    pub fn total_packets(&self) -> usize {
        self.segments.iter().map(Segment::packets).sum()
    }

    /// Segments in send order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Packet addressed by the global counter `index`. Empty segments are skipped.
    pub fn packet(&self, mut index: usize) -> Option<Bytes> {
        for segment in self.segments.iter().filter(|segment| segment.packets > 0) {
            if index < segment.packets {
                return Some(segment.slice(index));
            }
            index -= segment.packets;
        }
        None
    }
}

/// Result of pushing one byte into the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RxStatus {
    /// More bytes needed.
    Pending,
    /// Another checkpoint's worth of bytes arrived; carries the total so far.
    Checkpoint(usize),
    /// The expected length was reached with this byte.
    Complete,
}

/// Device→host payload accumulator.
#[derive(Debug, Default)]
pub(crate) struct RxBuffer {
    buf: Vec<u8>,
    expected: usize,
    checkpoint: usize,
}

impl RxBuffer {
    pub(crate) fn new(checkpoint: usize) -> Self {
        Self {
            buf: Vec::new(),
            expected: 0,
            checkpoint: checkpoint.max(1),
        }
    }

    /// Drop collected bytes and forget the expected length.
    pub(crate) fn reset(&mut self) {
        self.buf.clear();
        self.expected = 0;
    }

    /// Start collecting `expected` bytes.
    pub(crate) fn begin(&mut self, expected: usize) {
        self.buf.clear();
        self.buf.reserve(expected);
        self.expected = expected;
    }

    pub(crate) fn push(&mut self, byte: u8) -> RxStatus {
        if self.buf.len() >= self.expected {
            return RxStatus::Pending;
        }
        self.buf.push(byte);

        let received = self.buf.len();
        if received == self.expected {
            RxStatus::Complete
        } else if received % self.checkpoint == 0 {
            RxStatus::Checkpoint(received)
        } else {
            RxStatus::Pending
        }
    }

    #[inline]
    pub(crate) fn expected(&self) -> usize {
        self.expected
    }

    #[inline]
    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}

/// What to do after a packet acknowledge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TxStatus {
    /// Send this packet next.
    Next(Bytes),
    /// Every packet has been acknowledged.
    Complete,
}

/// Host→device upload in progress.
#[derive(Debug, Default)]
pub(crate) struct TxTransfer {
    upload: Option<Upload>,
    acked: usize,
}

impl TxTransfer {
    pub(crate) fn reset(&mut self) {
        self.upload = None;
        self.acked = 0;
    }

    /// Install `upload` and return packet 0.
    pub(crate) fn start(&mut self, upload: Upload) -> Bytes {
        let first = upload.packet(0).unwrap_or_default();
        self.upload = Some(upload);
        self.acked = 0;
        first
    }

    /// Count one acknowledge and pick the next packet.
    pub(crate) fn on_ack(&mut self) -> TxStatus {
        let Some(upload) = &self.upload else {
            return TxStatus::Complete;
        };
        self.acked += 1;
        if self.acked >= upload.total_packets() {
            return TxStatus::Complete;
        }
        match upload.packet(self.acked) {
            Some(packet) => TxStatus::Next(packet),
            None => TxStatus::Complete,
        }
    }

    #[inline]
    pub(crate) fn is_active(&self) -> bool {
        self.upload.is_some()
    }

    #[inline]
    pub(crate) fn acked(&self) -> usize {
        self.acked
    }

    pub(crate) fn total(&self) -> usize {
        self.upload.as_ref().map_or(0, Upload::total_packets)
    }
}

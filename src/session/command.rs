//! Command descriptors and their continuations.
//!
//! A [`Command`] carries everything the session needs to run a transaction
//! and to replay it from scratch on retry: the 5-byte frame plus what to do
//! after each protocol milestone. What happens after the command acknowledge
//! is plain data ([`OnAck`]), so the next step of the state machine can always
//! be derived from the descriptor instead of from captured closure state.
//!
//! # Example
//!
//! ```
//! use aurora_client::{Command, PayloadOutcome};
//!
//! let cmd = Command::new(69, [0, 0, 0, 16])
//!     .expect_payload(16)
//!     .on_payload(|values| {
//!         println!("channel values: {:?}", values);
//!         PayloadOutcome::Done
//!     });
//!
//! assert_eq!(cmd.id(), 69);
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::payload::Upload;
use crate::protocol::CommandFrame;

/// Notification callback.
pub type Callback = Arc<dyn Fn() + Send + Sync>;

/// Called with the complete received payload.
pub type PayloadCallback = Arc<dyn Fn(&[u8]) -> PayloadOutcome + Send + Sync>;

/// What the session does after a payload callback returns.
pub enum PayloadOutcome {
    /// Transaction complete.
    Done,
    /// Transaction complete; dispatch this command next.
    ///
    /// Used by two-step transfers where the first payload tells the host how
    /// large the second one will be.
    Then(Command),
}

impl fmt::Debug for PayloadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadOutcome::Done => f.write_str("Done"),
            PayloadOutcome::Then(cmd) => f.debug_tuple("Then").field(cmd).finish(),
        }
    }
}

/// Continuation selected by the command acknowledge.
#[derive(Clone)]
pub enum OnAck {
    /// Run the callback and end the transaction.
    Finish(Callback),
    /// Collect exactly `len` payload bytes from the device.
    Receive {
        /// Expected payload length in bytes.
        len: usize,
    },
    /// Upload packets, each acknowledged by `zAck`.
    Transmit(Upload),
}

impl fmt::Debug for OnAck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OnAck::Finish(_) => f.write_str("Finish"),
            OnAck::Receive { len } => f.debug_struct("Receive").field("len", len).finish(),
            OnAck::Transmit(upload) => f
                .debug_struct("Transmit")
                .field("packets", &upload.total_packets())
                .finish(),
        }
    }
}

/// Session-level effect applied when the device acknowledges a command.
///
/// Runs before the [`OnAck`] continuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckEffect {
    /// Live frames of up to this many bytes may be written. Zero leaves live
    /// control.
    LiveChannels(u16),
    /// The device resets or hands its link to another program: close the
    /// port and drop the queue.
    ClosePort,
}

/// A command and its continuations.
///
/// Absent continuations default to ending the transaction. Cloning is cheap;
/// callbacks are shared.
#[derive(Clone)]
pub struct Command {
    frame: CommandFrame,
    on_ack: Option<OnAck>,
    on_payload: Option<PayloadCallback>,
    on_packet_ack: Option<Callback>,
    effect: Option<AckEffect>,
    timeout: Option<Duration>,
}

impl Command {
    /// Create a command with no continuations.
    ///
    /// The transaction ends as soon as the device acknowledges it.
    pub fn new(id: u8, data: [u8; 4]) -> Self {
        Self {
            frame: CommandFrame::new(id, data),
            on_ack: None,
            on_payload: None,
            on_packet_ack: None,
            effect: None,
            timeout: None,
        }
    }

    /// Run `f` when the device acknowledges, then end the transaction.
    pub fn on_ack<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_ack = Some(OnAck::Finish(Arc::new(f)));
        self
    }

    /// After the acknowledge, collect `len` payload bytes.
    pub fn expect_payload(mut self, len: usize) -> Self {
        self.on_ack = Some(OnAck::Receive { len });
        self
    }

    /// After the acknowledge, run a packetized upload.
    pub fn upload(mut self, upload: Upload) -> Self {
        self.on_ack = Some(OnAck::Transmit(upload));
        self
    }

    /// Called with the full payload once `expect_payload` bytes arrived.
    pub fn on_payload<F>(mut self, f: F) -> Self
    where
        F: Fn(&[u8]) -> PayloadOutcome + Send + Sync + 'static,
    {
        self.on_payload = Some(Arc::new(f));
        self
    }

    /// Called once the final upload packet is acknowledged.
    pub fn on_packet_ack<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_packet_ack = Some(Arc::new(f));
        self
    }

    /// Apply `effect` to the session when the device acknowledges.
    pub fn ack_effect(mut self, effect: AckEffect) -> Self {
        self.effect = Some(effect);
        self
    }

    /// Use a longer (or shorter) deadline for this command.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Command identifier.
    #[inline]
    pub fn id(&self) -> u8 {
        self.frame.cmd
    }

    /// Data bytes.
    #[inline]
    pub fn data(&self) -> [u8; 4] {
        self.frame.data
    }

    /// The frame sent on the wire.
    #[inline]
    pub fn frame(&self) -> CommandFrame {
        self.frame
    }

    /// Continuation after the command acknowledge.
    pub fn ack_continuation(&self) -> Option<&OnAck> {
        self.on_ack.as_ref()
    }

    /// Session effect applied on the acknowledge.
    #[inline]
    pub fn effect(&self) -> Option<AckEffect> {
        self.effect
    }

    pub(crate) fn payload_callback(&self) -> Option<&PayloadCallback> {
        self.on_payload.as_ref()
    }

    pub(crate) fn packet_ack_callback(&self) -> Option<&Callback> {
        self.on_packet_ack.as_ref()
    }

    /// Per-command deadline override.
    pub fn timeout_override(&self) -> Option<Duration> {
        self.timeout
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("id", &self.frame.cmd)
            .field("data", &self.frame.data)
            .field("on_ack", &self.on_ack)
            .field("on_payload", &self.on_payload.is_some())
            .field("on_packet_ack", &self.on_packet_ack.is_some())
            .field("effect", &self.effect)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::payload::Segment;

    #[test]
    fn test_plain_command_has_no_continuations() {
        let cmd = Command::new(15, [200, 0, 0, 0]);
        assert_eq!(cmd.id(), 15);
        assert_eq!(cmd.data(), [200, 0, 0, 0]);
        assert_eq!(cmd.frame().encode(), [15, 200, 0, 0, 0]);
        assert!(cmd.ack_continuation().is_none());
        assert!(cmd.payload_callback().is_none());
        assert!(cmd.packet_ack_callback().is_none());
        assert!(cmd.timeout_override().is_none());
        assert!(cmd.effect().is_none());
    }

    #[test]
    fn test_effect_is_independent_of_continuation() {
        let cmd = Command::new(60, [1, 0, 0, 8])
            .ack_effect(AckEffect::LiveChannels(8))
            .on_ack(|| {});

        assert_eq!(cmd.effect(), Some(AckEffect::LiveChannels(8)));
        assert!(matches!(cmd.ack_continuation(), Some(OnAck::Finish(_))));
        assert!(format!("{:?}", cmd).contains("LiveChannels(8)"));
    }

    #[test]
    fn test_last_ack_continuation_wins() {
        let upload = Upload::single(Segment::whole(vec![1u8, 2, 3])).unwrap();
        let cmd = Command::new(101, [0; 4]).expect_payload(4).upload(upload);

        assert!(matches!(cmd.ack_continuation(), Some(OnAck::Transmit(_))));
    }

    #[test]
    fn test_clone_shares_callbacks() {
        let cmd = Command::new(4, [0; 4]).on_payload(|_| PayloadOutcome::Done);
        let copy = cmd.clone();

        let a = cmd.payload_callback().unwrap();
        let b = copy.payload_callback().unwrap();
        assert!(Arc::ptr_eq(a, b));
    }

    #[test]
    fn test_debug_output() {
        let cmd = Command::new(69, [0, 0, 0, 7]).expect_payload(7);
        let s = format!("{:?}", cmd);
        assert!(s.contains("id: 69"));
        assert!(s.contains("Receive"));
    }
}

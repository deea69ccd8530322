//! Protocol states and transaction progress.

use std::fmt;

/// Protocol state machine position.
///
/// Discriminants match the state numbers used in device documentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum State {
    /// No transaction on the wire.
    #[default]
    Idle = 0,
    /// About to send `NLED11`.
    SendRequest = 1,
    /// Waiting for `a9`.
    RecvRequestAck = 2,
    /// Waiting for `f0`.
    RecvAuthAck = 3,
    /// Waiting for the command acknowledge (or `ERR`).
    RecvCmdAck = 4,
    /// Collecting device→host payload bytes.
    RecvPayloadRx = 5,
    /// Waiting for `zAck` after an uploaded packet.
    RecvPayloadTxAck = 6,
    /// Continuous streaming. Reserved; no command enters it yet.
    StreamPayload = 7,
}

impl State {
    /// Name used in log output.
    pub fn name(self) -> &'static str {
        match self {
            State::Idle => "Idle",
            State::SendRequest => "SendRequest",
            State::RecvRequestAck => "RecvRequestAck",
            State::RecvAuthAck => "RecvAuthAck",
            State::RecvCmdAck => "RecvCmdAck",
            State::RecvPayloadRx => "RecvPayloadRx",
            State::RecvPayloadTxAck => "RecvPayloadTxAck",
            State::StreamPayload => "StreamPayload",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), *self as u8)
    }
}

/// Upload/download progress as seen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// 0..=100.
    Percent(u8),
    /// The last transaction exhausted its retries.
    Error,
    /// The last transaction was aborted by the caller.
    Aborted,
}

impl Progress {
    /// `ceil(done * 100 / total)`, clamped to 100. A zero total counts as done.
    pub fn ratio(done: usize, total: usize) -> Self {
        if total == 0 {
            return Progress::Percent(100);
        }
        let pct = (done.saturating_mul(100) + total - 1) / total;
        Progress::Percent(pct.min(100) as u8)
    }

    /// True for the error and abort sentinels.
    pub fn is_terminal_failure(self) -> bool {
        matches!(self, Progress::Error | Progress::Aborted)
    }
}

impl Default for Progress {
    fn default() -> Self {
        Progress::Percent(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_numbers() {
        assert_eq!(State::Idle as u8, 0);
        assert_eq!(State::RecvCmdAck as u8, 4);
        assert_eq!(State::StreamPayload as u8, 7);
        assert_eq!(State::default(), State::Idle);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(State::RecvPayloadRx.to_string(), "RecvPayloadRx(5)");
    }

    #[test]
    fn test_progress_ratio_rounds_up() {
        assert_eq!(Progress::ratio(1024, 3000), Progress::Percent(35));
        assert_eq!(Progress::ratio(1, 3), Progress::Percent(34));
        assert_eq!(Progress::ratio(3, 3), Progress::Percent(100));
        assert_eq!(Progress::ratio(0, 10), Progress::Percent(0));
        assert_eq!(Progress::ratio(5, 0), Progress::Percent(100));
    }

    #[test]
    fn test_progress_sentinels() {
        assert!(Progress::Error.is_terminal_failure());
        assert!(Progress::Aborted.is_terminal_failure());
        assert!(!Progress::Percent(100).is_terminal_failure());
    }
}

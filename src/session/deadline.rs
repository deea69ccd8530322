//! Timeout and retry bookkeeping.
//!
//! A session has at most one live deadline. Arming a new one bumps the
//! generation, which turns any previously handed-out deadline stale: a timer
//! that fires with an old generation is ignored. This lets the runtime keep a
//! single `sleep_until` without having to cancel anything explicitly.

use std::time::{Duration, Instant};

/// Default number of attempts before a transaction fails.
pub const DEFAULT_MAX_RETRIES: u8 = 3;

/// A pending expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    /// Identifies this arming. Stale generations are ignored on expiry.
    pub generation: u64,
    /// When the deadline expires.
    pub at: Instant,
}

/// Holds the one live deadline of a session.
#[derive(Debug, Default)]
pub(crate) struct DeadlineSlot {
    current: Option<Deadline>,
    generation: u64,
}

impl DeadlineSlot {
    /// Arm (or re-arm) the deadline, replacing any previous one.
    pub(crate) fn arm(&mut self, timeout: Duration) -> Deadline {
        self.generation = self.generation.wrapping_add(1);
        let deadline = Deadline {
            generation: self.generation,
            at: Instant::now() + timeout,
        };
        self.current = Some(deadline);
        deadline
    }

    pub(crate) fn clear(&mut self) {
        self.current = None;
    }

    pub(crate) fn current(&self) -> Option<Deadline> {
        self.current
    }

    /// Consume the deadline if `generation` is the live one.
    pub(crate) fn take(&mut self, generation: u64) -> bool {
        match self.current {
            Some(d) if d.generation == generation => {
                self.current = None;
                true
            }
            _ => false,
        }
    }
}

/// Outcome of recording a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RetryDecision {
    /// Replay the command; carries the attempt number (1-based).
    Retry(u8),
    /// The ceiling has been reached.
    Exhausted,
}

/// Counts failed attempts of the active transaction.
#[derive(Debug)]
pub(crate) struct RetryCounter {
    count: u8,
    max: u8,
}

impl RetryCounter {
    pub(crate) fn new(max: u8) -> Self {
        Self { count: 0, max }
    }

    pub(crate) fn record_failure(&mut self) -> RetryDecision {
        self.count = self.count.saturating_add(1);
        if self.count < self.max {
            RetryDecision::Retry(self.count)
        } else {
            RetryDecision::Exhausted
        }
    }

    pub(crate) fn reset(&mut self) {
        self.count = 0;
    }

    #[inline]
    pub(crate) fn count(&self) -> u8 {
        self.count
    }
}

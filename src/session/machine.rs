//! The protocol state machine.
//!
//! [`Session`] is sans-IO: it never reads, sleeps, or spawns. The owner feeds
//! it inbound chunks ([`Session::receive`]), fires its deadline
//! ([`Session::on_deadline`]), and issues commands ([`Session::dispatch`]).
//! Every call runs to completion synchronously; all writes go through the
//! attached [`Port`].
//!
//! ```text
//! Idle ─dispatch─► SendRequest ─"NLED11"─► RecvRequestAck ─a9/"nled99"─► RecvAuthAck
//!                                                                          │ f0 / frame
//!   ▲                                                                      ▼
//!   └──── reset ◄── RecvPayloadRx ◄─Receive─ RecvCmdAck ─Transmit─► RecvPayloadTxAck
//!                                            │ ERR: replay handshake
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::command::{AckEffect, Callback, Command, OnAck, PayloadOutcome};
use super::deadline::{Deadline, DeadlineSlot, RetryCounter, RetryDecision};
use super::payload::{RxBuffer, RxStatus, TxStatus, TxTransfer};
use super::queue::{CommandQueue, Enqueued};
use super::state::{Progress, State};
use crate::config::SessionConfig;
use crate::error::{AuroraError, Result};
use crate::protocol::{
    command_ack, ByteWindow, InboundByte, AUTHENTICATE, AUTHENTICATE_ACK, ERROR, PACKET_ACK,
    REQUEST, REQUEST_ACK,
};
use crate::transport::{Port, TransportKind};

/// Result of a successful [`Session::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The session was idle; the handshake has been sent.
    Started,
    /// Appended to the queue at `position`.
    Queued {
        /// Zero-based queue position.
        position: usize,
    },
    /// Replaced a queued command with the same id at `position`.
    Coalesced {
        /// Zero-based queue position.
        position: usize,
    },
}

/// Session-level notifications.
#[derive(Clone, Default)]
pub struct SessionHooks {
    on_no_transport: Option<Callback>,
    on_timeout: Option<Callback>,
}

impl SessionHooks {
    /// Create hooks with no callbacks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fired whenever a command or write is attempted without an open port.
    pub fn on_no_transport<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_no_transport = Some(Arc::new(f));
        self
    }

    /// Fired once when a transaction exhausts its retries.
    pub fn on_timeout<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_timeout = Some(Arc::new(f));
        self
    }
}

/// One device connection: protocol state, active command, queue, buffers.
pub struct Session<P: Port> {
    port: Option<P>,
    config: SessionConfig,
    timeout: Duration,
    hooks: SessionHooks,
    state: State,
    active: Option<Command>,
    retries: RetryCounter,
    progress: Progress,
    window: ByteWindow,
    deadline: DeadlineSlot,
    rx: RxBuffer,
    tx: TxTransfer,
    queue: CommandQueue,
    live_channels: usize,
}

impl<P: Port> Session<P> {
    /// Create a session with no port attached.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            port: None,
            timeout: config.timeout_for(TransportKind::Unknown),
            hooks: SessionHooks::default(),
            state: State::Idle,
            active: None,
            retries: RetryCounter::new(config.max_retries),
            progress: Progress::default(),
            window: ByteWindow::new(),
            deadline: DeadlineSlot::default(),
            rx: RxBuffer::new(config.checkpoint_bytes),
            tx: TxTransfer::default(),
            queue: CommandQueue::new(config.queue_capacity),
            live_channels: 0,
            config,
        }
    }

    /// Create a session attached to `port`.
    pub fn with_port(port: P, config: SessionConfig) -> Self {
        let mut session = Self::new(config);
        session.attach(port);
        session
    }

    /// Install session-level hooks.
    pub fn with_hooks(mut self, hooks: SessionHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Attach (or replace) the port. The deadline follows the port's kind.
    pub fn attach(&mut self, port: P) {
        self.timeout = self.config.timeout_for(port.kind());
        tracing::debug!(
            "Port attached ({:?}), timeout {:?}",
            port.kind(),
            self.timeout
        );
        self.port = Some(port);
    }

    /// The attached port.
    pub fn port(&self) -> Option<&P> {
        self.port.as_ref()
    }

    // ------------------------------------------------------------------
    // Caller entry points
    // ------------------------------------------------------------------

    /// Start `cmd`, or queue it if a transaction is in flight.
    ///
    /// # Errors
    ///
    /// - [`AuroraError::NoTransport`] if no open port is attached; the
    ///   no-transport hook fires as well.
    /// - [`AuroraError::Busy`] if busy and queueing is disabled.
    /// - [`AuroraError::QueueFull`] if busy and the queue is at capacity.
    pub fn dispatch(&mut self, cmd: Command) -> Result<Dispatch> {
        if !self.port_open() {
            tracing::warn!("Port not available, cannot send command {}", cmd.id());
            self.notify_no_transport();
            return Err(AuroraError::NoTransport);
        }

        if self.is_busy() {
            if !self.config.enable_queue {
                tracing::debug!("Command in progress, dropping command {}", cmd.id());
                return Err(AuroraError::Busy(cmd.id()));
            }
            let id = cmd.id();
            return match self.queue.push(cmd)? {
                Enqueued::Appended(position) => {
                    tracing::debug!("Command in progress, queued {} at {}", id, position);
                    Ok(Dispatch::Queued { position })
                }
                Enqueued::Replaced(position) => {
                    tracing::debug!("Command {} already queued at {}, updated", id, position);
                    Ok(Dispatch::Coalesced { position })
                }
            };
        }

        self.begin(cmd);
        Ok(Dispatch::Started)
    }

    /// Feed one inbound chunk. Bytes are processed strictly in order.
    ///
    /// Accepts raw bytes or single-character text:
    ///
    /// ```ignore
    /// session.receive(b"a9");
    /// session.receive("f0".chars());
    /// ```
    pub fn receive<I>(&mut self, chunk: I)
    where
        I: IntoIterator,
        I::Item: Into<InboundByte>,
    {
        if self.state == State::StreamPayload {
            tracing::trace!("Stream state, chunk bypasses window");
            return;
        }
        for byte in chunk {
            self.window.push(byte);
            self.step();
        }
    }

    /// Fire the deadline with the given generation.
    ///
    /// Returns `false` (and does nothing) if that deadline is no longer live.
    pub fn on_deadline(&mut self, generation: u64) -> bool {
        if !self.deadline.take(generation) {
            return false;
        }
        self.expire();
        true
    }

    /// Fire the live deadline if it is due at `now`.
    pub fn poll_deadline(&mut self, now: Instant) -> bool {
        match self.deadline.current() {
            Some(d) if now >= d.at => self.on_deadline(d.generation),
            _ => false,
        }
    }

    /// Abort the transaction in flight, whatever its state.
    pub fn abort(&mut self) {
        if let Some(cmd) = &self.active {
            tracing::debug!("Aborting command {} in {}", cmd.id(), self.state);
        }
        self.reset();
        self.progress = Progress::Aborted;
        self.run_queue();
    }

    /// Write raw bytes outside of any transaction.
    ///
    /// Returns `Ok(false)` without writing if a transaction is in flight.
    pub fn write_idle(&mut self, bytes: &[u8]) -> Result<bool> {
        if !self.port_open() {
            self.notify_no_transport();
            return Err(AuroraError::NoTransport);
        }
        if self.is_busy() {
            return Ok(false);
        }
        if let Some(port) = self.port.as_mut() {
            port.write(bytes)?;
        }
        Ok(true)
    }

    /// Write one live control frame.
    ///
    /// The frame may not be longer than the channel count opened by the last
    /// acknowledged live mode command. Otherwise behaves as [`write_idle`].
    ///
    /// # Errors
    ///
    /// - [`AuroraError::LiveFrameTooLarge`] if the frame does not fit.
    /// - [`AuroraError::NoTransport`] if no open port is attached.
    ///
    /// [`write_idle`]: Session::write_idle
    pub fn write_live(&mut self, frame: &[u8]) -> Result<bool> {
        if frame.len() > self.live_channels {
            tracing::warn!(
                "Live frame of {} bytes rejected, {} channels open",
                frame.len(),
                self.live_channels
            );
            return Err(AuroraError::LiveFrameTooLarge {
                len: frame.len(),
                channels: self.live_channels,
            });
        }
        self.write_idle(frame)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Current protocol state.
    #[inline]
    pub fn state(&self) -> State {
        self.state
    }

    /// Progress of the current or last transaction.
    #[inline]
    pub fn progress(&self) -> Progress {
        self.progress
    }

    /// Failed attempts of the current transaction.
    #[inline]
    pub fn retry_count(&self) -> u8 {
        self.retries.count()
    }

    /// True while a transaction is in flight, including one parked after
    /// its last `ERR` and waiting for the deadline.
    #[inline]
    pub fn is_busy(&self) -> bool {
        self.state != State::Idle || self.active.is_some()
    }

    /// The command in flight.
    pub fn active_command(&self) -> Option<&Command> {
        self.active.as_ref()
    }

    /// Ids of queued commands, head first.
    pub fn queued(&self) -> Vec<u8> {
        self.queue.ids()
    }

    /// Channels opened for live control, 0 when live control is off.
    #[inline]
    pub fn live_channels(&self) -> usize {
        self.live_channels
    }

    /// Drop every queued command.
    pub fn clear_queue(&mut self) {
        self.queue.clear();
    }

    /// The live deadline, if any.
    pub fn deadline(&self) -> Option<Deadline> {
        self.deadline.current()
    }

    /// Payload collected by the current or last receive transaction.
    pub fn payload(&self) -> &[u8] {
        self.rx.as_slice()
    }

    /// Upload packets acknowledged so far in the current transaction.
    pub fn packets_acked(&self) -> usize {
        self.tx.acked()
    }

    /// The inbound byte window.
    pub fn window(&self) -> &ByteWindow {
        &self.window
    }

    /// Base deadline in effect for the attached port.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // State machine
    // ------------------------------------------------------------------

    fn step(&mut self) {
        match self.state {
            State::Idle => {
                tracing::trace!("Idle, dropping byte {:#04x}", self.window.newest());
            }
            // Transient: `begin` sends the request and moves on immediately.
            State::SendRequest => {}
            State::RecvRequestAck => {
                if self.window.matches(REQUEST_ACK) {
                    self.send(AUTHENTICATE);
                    self.advance(State::RecvAuthAck);
                }
            }
            State::RecvAuthAck => {
                if self.window.matches(AUTHENTICATE_ACK) {
                    self.send_frame();
                    self.advance(State::RecvCmdAck);
                }
            }
            State::RecvCmdAck => {
                let Some(id) = self.active.as_ref().map(Command::id) else {
                    self.reset();
                    return;
                };
                if self.window.matches(&command_ack(id)) {
                    self.on_command_ack();
                } else if self.window.matches(ERROR) {
                    self.on_device_error(id);
                }
            }
            State::RecvPayloadRx => match self.rx.push(self.window.newest()) {
                RxStatus::Pending => {}
                RxStatus::Checkpoint(received) => {
                    self.progress = Progress::ratio(received, self.rx.expected());
                    self.arm(None);
                }
                RxStatus::Complete => self.on_payload_complete(),
            },
            State::RecvPayloadTxAck => {
                if self.window.matches(PACKET_ACK) && self.tx.is_active() {
                    self.on_packet_ack();
                }
            }
            State::StreamPayload => {}
        }
    }

    /// Start a transaction from scratch. Also used for replays.
    fn begin(&mut self, cmd: Command) {
        tracing::debug!("Command {} {:?}", cmd.id(), cmd.data());
        self.active = Some(cmd);
        self.tx.reset();

        if self.config.fast_mode {
            self.state = State::RecvCmdAck;
            self.arm(None);
            self.send_frame_unlocked();
        } else {
            self.state = State::SendRequest;
            self.arm(None);
            self.send(REQUEST);
            self.advance(State::RecvRequestAck);
        }
    }

    fn send_frame(&mut self) {
        let Some(frame) = self.active.as_ref().map(Command::frame) else {
            return;
        };
        self.rx.reset();
        self.tx.reset();
        self.progress = Progress::Percent(0);
        self.send(&frame.encode());
    }

    fn send_frame_unlocked(&mut self) {
        let Some(frame) = self.active.as_ref().map(Command::frame) else {
            return;
        };
        self.rx.reset();
        self.tx.reset();
        self.progress = Progress::Percent(0);
        self.send(&frame.encode_unlocked());
    }

    fn on_command_ack(&mut self) {
        let Some(cmd) = self.active.clone() else {
            return;
        };
        tracing::debug!("Command {} acknowledged", cmd.id());
        if let Some(effect) = cmd.effect() {
            self.apply(effect);
        }

        match cmd.ack_continuation() {
            None => self.complete(),
            Some(OnAck::Finish(callback)) => {
                callback();
                self.complete();
            }
            Some(OnAck::Receive { len }) => {
                self.rx.begin(*len);
                if *len == 0 {
                    self.on_payload_complete();
                } else {
                    self.advance(State::RecvPayloadRx);
                }
            }
            Some(OnAck::Transmit(upload)) => {
                let first = self.tx.start(upload.clone());
                self.state = State::RecvPayloadTxAck;
                self.arm(upload.first_packet_deadline());
                tracing::debug!(
                    "Upload started, {} packets, first {} bytes",
                    self.tx.total(),
                    first.len()
                );
                self.send(&first);
            }
        }
    }

    fn apply(&mut self, effect: AckEffect) {
        match effect {
            AckEffect::LiveChannels(channels) => {
                tracing::debug!("Live control open for {} channels", channels);
                self.live_channels = usize::from(channels);
            }
            AckEffect::ClosePort => {
                tracing::debug!("Closing port, {} queued commands dropped", self.queue.len());
                self.queue.clear();
                self.live_channels = 0;
                if let Some(port) = self.port.as_mut() {
                    port.close();
                }
            }
        }
    }

    fn on_payload_complete(&mut self) {
        let callback = self
            .active
            .as_ref()
            .and_then(|cmd| cmd.payload_callback().cloned());
        tracing::debug!("Payload complete, {} bytes", self.rx.as_slice().len());

        let Some(callback) = callback else {
            self.progress = Progress::Percent(100);
            self.complete();
            return;
        };

        let outcome = callback(self.rx.as_slice());
        self.progress = Progress::Percent(100);
        self.reset();

        // A follow-up goes ahead of anything queued.
        if let PayloadOutcome::Then(next) = outcome {
            let id = next.id();
            match self.dispatch(next) {
                Ok(_) => return,
                Err(e) => tracing::warn!("Follow-up command {} not sent: {}", id, e),
            }
        }
        self.run_queue();
    }

    fn on_packet_ack(&mut self) {
        match self.tx.on_ack() {
            TxStatus::Next(packet) => {
                self.progress = Progress::ratio(self.tx.acked(), self.tx.total());
                self.arm(None);
                tracing::trace!("Packet {} of {} acknowledged", self.tx.acked(), self.tx.total());
                self.send(&packet);
            }
            TxStatus::Complete => {
                tracing::debug!("Upload complete, {} packets", self.tx.acked());
                self.progress = Progress::Percent(100);
                let callback = self
                    .active
                    .as_ref()
                    .and_then(|cmd| cmd.packet_ack_callback().cloned());
                if let Some(callback) = callback {
                    callback();
                }
                self.complete();
            }
        }
    }

    fn on_device_error(&mut self, id: u8) {
        self.state = State::Idle;
        match self.retries.record_failure() {
            RetryDecision::Retry(attempt) => {
                tracing::warn!("Device reported ERR for command {}, retry {}", id, attempt);
                self.replay();
            }
            RetryDecision::Exhausted => {
                // Parked: still busy, the armed deadline decides.
                tracing::warn!("Command {} retries failed, waiting for timeout", id);
            }
        }
    }

    fn expire(&mut self) {
        let Some(id) = self.active.as_ref().map(Command::id) else {
            self.reset();
            return;
        };
        let state = self.state;
        self.state = State::Idle;

        match self.retries.record_failure() {
            RetryDecision::Retry(attempt) => {
                tracing::warn!("Command {} timed out in {}, retry {}", id, state, attempt);
                self.replay();
            }
            RetryDecision::Exhausted => {
                tracing::error!(
                    "Command {} timed out in {} after {} attempts",
                    id,
                    state,
                    self.retries.count()
                );
                self.reset();
                self.progress = Progress::Error;
                if let Some(hook) = self.hooks.on_timeout.clone() {
                    hook();
                }
                self.run_queue();
            }
        }
    }

    fn replay(&mut self) {
        if let Some(cmd) = self.active.take() {
            self.begin(cmd);
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn advance(&mut self, state: State) {
        tracing::trace!("{} -> {}", self.state, state);
        self.state = state;
        self.arm(None);
    }

    fn arm(&mut self, extra: Option<Duration>) {
        let timeout = extra
            .or_else(|| self.active.as_ref().and_then(Command::timeout_override))
            .unwrap_or(self.timeout);
        self.deadline.arm(timeout);
    }

    fn send(&mut self, bytes: &[u8]) {
        match self.port.as_mut() {
            Some(port) if port.is_open() => {
                if let Err(e) = port.write(bytes) {
                    tracing::warn!("Write of {} bytes failed: {}", bytes.len(), e);
                }
            }
            _ => {
                tracing::warn!("Port not open, {} bytes not sent", bytes.len());
                self.notify_no_transport();
            }
        }
    }

    fn port_open(&self) -> bool {
        self.port.as_ref().is_some_and(Port::is_open)
    }

    fn notify_no_transport(&self) {
        if let Some(hook) = &self.hooks.on_no_transport {
            hook();
        }
    }

    /// Clear everything that belongs to the transaction. Progress and the
    /// received payload survive until the next command frame.
    fn reset(&mut self) {
        self.state = State::Idle;
        self.active = None;
        self.window.clear();
        self.deadline.clear();
        self.retries.reset();
        self.tx.reset();
    }

    fn complete(&mut self) {
        self.reset();
        self.run_queue();
    }

    fn run_queue(&mut self) {
        while let Some(cmd) = self.queue.pop() {
            let id = cmd.id();
            tracing::debug!("Sending queued command {} ({} left)", id, self.queue.len());
            match self.dispatch(cmd) {
                Ok(_) => break,
                Err(e) => tracing::warn!("Queued command {} dropped: {}", id, e),
            }
        }
    }
}

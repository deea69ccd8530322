//! Device builder and runtime loop.
//!
//! The [`DeviceBuilder`] configures a session and spawns it onto a
//! transport. The running device is driven by one task:
//! 1. Spawn the writer task for the write half
//! 2. Read chunks from the read half and feed them to the session
//! 3. Fire the session deadline when it expires
//! 4. Serve requests from [`DeviceHandle`]s
//!
//! # Example
//!
//! ```ignore
//! use aurora_client::{commands, transport::tcp, DeviceBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (reader, writer) = tcp::connect("192.168.4.1:23").await?;
//!     let device = DeviceBuilder::new(tcp::KIND)
//!         .fast_mode(true)
//!         .spawn(reader, writer)?;
//!
//!     device.dispatch(commands::simple(commands::INTENSITY, [128, 0, 0, 0])).await?;
//!     device.wait_for_shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::SessionConfig;
use crate::error::{AuroraError, Result};
use crate::session::{Command, Dispatch, Progress, Session, SessionHooks, State};
use crate::transport::{Port, TransportKind};
use crate::writer::{spawn_writer_task, WriterConfig, WriterPort};

/// Default capacity of the request channel.
pub const DEFAULT_REQUEST_CAPACITY: usize = 64;

/// Size of the read buffer.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Builder for configuring and spawning a device session.
pub struct DeviceBuilder {
    kind: TransportKind,
    config: SessionConfig,
    hooks: SessionHooks,
    writer_config: WriterConfig,
    request_capacity: usize,
}

impl DeviceBuilder {
    /// Create a builder for a transport of the given kind.
    pub fn new(kind: TransportKind) -> Self {
        Self {
            kind,
            config: SessionConfig::default(),
            hooks: SessionHooks::default(),
            writer_config: WriterConfig::default(),
            request_capacity: DEFAULT_REQUEST_CAPACITY,
        }
    }

    /// Replace the whole session configuration.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Session-level hooks.
    pub fn hooks(mut self, hooks: SessionHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Send unlock and frame in one write.
    ///
    /// Default: false
    pub fn fast_mode(mut self, enabled: bool) -> Self {
        self.config.fast_mode = enabled;
        self
    }

    /// Override the transport kind's default deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Attempts before a transaction fails.
    ///
    /// Default: 3
    pub fn max_retries(mut self, retries: u8) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Queue commands while busy instead of dropping them.
    ///
    /// Default: true
    pub fn enable_queue(mut self, enabled: bool) -> Self {
        self.config.enable_queue = enabled;
        self
    }

    /// Writer task configuration.
    pub fn writer_config(mut self, config: WriterConfig) -> Self {
        self.writer_config = config;
        self
    }

    /// Validate the configuration and start the device task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<R, W>(self, reader: R, writer: W) -> Result<DeviceHandle>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        self.config.validate()?;

        let (writer, writer_task) = spawn_writer_task(writer, self.writer_config);
        let port = WriterPort::new(writer, self.kind);
        let session = Session::with_port(port.clone(), self.config).with_hooks(self.hooks);

        let (tx, rx) = mpsc::channel(self.request_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            if let Err(e) = run(session, port, reader, rx, shutdown_tx, writer_task).await {
                tracing::error!("Device loop error: {}", e);
            }
        });

        Ok(DeviceHandle {
            tx,
            shutdown: shutdown_rx,
        })
    }
}

enum Request {
    Dispatch(Command, oneshot::Sender<Result<Dispatch>>),
    WriteIdle(Vec<u8>, oneshot::Sender<Result<bool>>),
    WriteLive(Vec<u8>, oneshot::Sender<Result<bool>>),
    Abort(oneshot::Sender<()>),
    Progress(oneshot::Sender<Progress>),
    State(oneshot::Sender<State>),
    Queued(oneshot::Sender<Vec<u8>>),
}

/// Handle to a running device. Cheap to clone.
#[derive(Clone)]
pub struct DeviceHandle {
    tx: mpsc::Sender<Request>,
    shutdown: watch::Receiver<bool>,
}

impl DeviceHandle {
    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Request) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| AuroraError::ConnectionClosed)?;
        reply_rx.await.map_err(|_| AuroraError::ConnectionClosed)
    }

    /// Start or queue a command. See [`Session::dispatch`].
    pub async fn dispatch(&self, cmd: Command) -> Result<Dispatch> {
        self.request(|reply| Request::Dispatch(cmd, reply)).await?
    }

    /// Write raw bytes while no transaction is in flight.
    pub async fn write_idle(&self, bytes: impl Into<Vec<u8>>) -> Result<bool> {
        let bytes = bytes.into();
        self.request(|reply| Request::WriteIdle(bytes, reply)).await?
    }

    /// Write one live control frame. See [`Session::write_live`].
    pub async fn write_live(&self, frame: impl Into<Vec<u8>>) -> Result<bool> {
        let frame = frame.into();
        self.request(|reply| Request::WriteLive(frame, reply)).await?
    }

    /// Abort the transaction in flight.
    pub async fn abort(&self) -> Result<()> {
        self.request(Request::Abort).await
    }

    /// Progress of the current or last transaction.
    pub async fn progress(&self) -> Result<Progress> {
        self.request(Request::Progress).await
    }

    /// Current protocol state.
    pub async fn state(&self) -> Result<State> {
        self.request(Request::State).await
    }

    /// Ids of queued commands.
    pub async fn queued(&self) -> Result<Vec<u8>> {
        self.request(Request::Queued).await
    }

    /// Wait until the transport closes.
    pub async fn wait_for_shutdown(&self) -> Result<()> {
        let mut shutdown = self.shutdown.clone();
        let _ = shutdown.wait_for(|closed| *closed).await;
        Ok(())
    }
}

/// Device loop: reader, deadline, and requests.
///
/// Reader EOF, or a command that closes the port on its acknowledge, signals
/// shutdown; requests are still answered (with no-transport errors) until
/// every handle is dropped.
async fn run<R>(
    mut session: Session<WriterPort>,
    port: WriterPort,
    mut reader: R,
    mut rx: mpsc::Receiver<Request>,
    shutdown: watch::Sender<bool>,
    writer_task: JoinHandle<Result<()>>,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut reading = true;

    loop {
        let deadline = session.deadline();
        let expiry = async {
            match deadline {
                Some(d) => tokio::time::sleep_until(tokio::time::Instant::from_std(d.at)).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            read = reader.read(&mut buf), if reading => match read {
                Ok(0) => {
                    tracing::debug!("Transport closed");
                    reading = false;
                    close(&mut session, &port, &shutdown);
                }
                Ok(n) => {
                    session.receive(&buf[..n]);
                    if !port.is_open() {
                        tracing::debug!("Port closed by session");
                        reading = false;
                        close(&mut session, &port, &shutdown);
                    }
                }
                Err(e) => {
                    tracing::warn!("Read error: {}", e);
                    reading = false;
                    close(&mut session, &port, &shutdown);
                }
            },
            _ = expiry => {
                if let Some(d) = deadline {
                    session.on_deadline(d.generation);
                }
            }
            request = rx.recv() => match request {
                Some(request) => serve(&mut session, request),
                None => break,
            },
        }
    }

    drop(session);
    drop(port);
    match writer_task.await {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!("Writer task panicked: {}", e);
            Err(AuroraError::ConnectionClosed)
        }
    }
}

fn close(session: &mut Session<WriterPort>, port: &WriterPort, shutdown: &watch::Sender<bool>) {
    port.close();
    // Queued commands were never sent; drop them before the abort drains the queue.
    session.clear_queue();
    if session.is_busy() {
        session.abort();
    }
    let _ = shutdown.send(true);
}

fn serve(session: &mut Session<WriterPort>, request: Request) {
    match request {
        Request::Dispatch(cmd, reply) => {
            let _ = reply.send(session.dispatch(cmd));
        }
        Request::WriteIdle(bytes, reply) => {
            let _ = reply.send(session.write_idle(&bytes));
        }
        Request::WriteLive(frame, reply) => {
            let _ = reply.send(session.write_live(&frame));
        }
        Request::Abort(reply) => {
            session.abort();
            let _ = reply.send(());
        }
        Request::Progress(reply) => {
            let _ = reply.send(session.progress());
        }
        Request::State(reply) => {
            let _ = reply.send(session.state());
        }
        Request::Queued(reply) => {
            let _ = reply.send(session.queued());
        }
    }
}

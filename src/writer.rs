//! Dedicated writer task for outbound bytes.
//!
//! The session writes synchronously through [`Port::write`], but the device
//! connection is async. [`WriterPort`] bridges the two: each write becomes a
//! [`Bytes`] chunk pushed onto an mpsc channel, and a dedicated task drains
//! the channel onto the transport.
//!
//! # Architecture
//!
//! ```text
//! Session ─► WriterPort::write ─► mpsc::Sender<Bytes> ─► Writer Task ─► transport
//! ```
//!
//! Chunks that are ready together (a packet right after a handshake marker,
//! say) are batched into a single vectored write.

use std::io::IoSlice;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{AuroraError, Result};
use crate::transport::{Port, TransportKind};

/// Default maximum chunks waiting to be written.
pub const DEFAULT_MAX_PENDING_CHUNKS: usize = 256;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Maximum chunks to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Maximum pending chunks before writes are refused.
    pub max_pending_chunks: usize,
    /// Channel capacity for the chunk queue.
    pub channel_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_pending_chunks: DEFAULT_MAX_PENDING_CHUNKS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Handle for sending chunks to the writer task.
///
/// Cheap to clone.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<Bytes>,
    pending: Arc<AtomicUsize>,
    max_pending: usize,
}

impl WriterHandle {
    fn new(tx: mpsc::Sender<Bytes>, pending: Arc<AtomicUsize>, max_pending: usize) -> Self {
        Self {
            tx,
            pending,
            max_pending,
        }
    }

    /// Queue a chunk without waiting.
    ///
    /// Fails with `WouldBlock` if the writer is too far behind, or with
    /// `ConnectionClosed` if the writer task has exited.
    pub fn try_send(&self, chunk: Bytes) -> Result<()> {
        if self.pending.load(Ordering::Acquire) >= self.max_pending {
            return Err(would_block());
        }

        self.pending.fetch_add(1, Ordering::AcqRel);

        self.tx.try_send(chunk).map_err(|e| {
            self.pending.fetch_sub(1, Ordering::Release);
            match e {
                mpsc::error::TrySendError::Full(_) => would_block(),
                mpsc::error::TrySendError::Closed(_) => AuroraError::ConnectionClosed,
            }
        })
    }

    /// Chunks queued but not yet written.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Whether the writer task has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

fn would_block() -> AuroraError {
    AuroraError::Io(std::io::Error::new(
        std::io::ErrorKind::WouldBlock,
        "writer queue full",
    ))
}

/// [`Port`] backed by the writer task.
///
/// The open flag is shared between clones: reader EOF or a session that
/// closes its port clears it, after which writes are refused.
#[derive(Clone)]
pub struct WriterPort {
    writer: WriterHandle,
    open: Arc<AtomicBool>,
    kind: TransportKind,
}

impl WriterPort {
    /// Wrap a writer handle. The port starts open.
    pub fn new(writer: WriterHandle, kind: TransportKind) -> Self {
        Self {
            writer,
            open: Arc::new(AtomicBool::new(true)),
            kind,
        }
    }

    /// Mark the port closed for every clone.
    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
    }

    /// The underlying writer handle.
    pub fn writer(&self) -> &WriterHandle {
        &self.writer
    }
}

impl Port for WriterPort {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.writer.is_closed()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if !self.open.load(Ordering::Acquire) {
            return Err(AuroraError::NoTransport);
        }
        self.writer.try_send(Bytes::copy_from_slice(bytes))
    }

    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn close(&mut self) {
        self.open.store(false, Ordering::Release);
    }
}

/// Spawn the writer task and return a handle for sending chunks.
///
/// The task ends cleanly once every [`WriterHandle`] is dropped.
pub fn spawn_writer_task<W>(
    writer: W,
    config: WriterConfig,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let pending = Arc::new(AtomicUsize::new(0));

    let handle = WriterHandle::new(tx, pending.clone(), config.max_pending_chunks);
    let task = tokio::spawn(writer_loop(rx, writer, pending));

    (handle, task)
}

async fn writer_loop<W>(
    mut rx: mpsc::Receiver<Bytes>,
    mut writer: W,
    pending: Arc<AtomicUsize>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let first = match rx.recv().await {
            Some(chunk) => chunk,
            None => return Ok(()),
        };

        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);

        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(chunk) => batch.push(chunk),
                Err(_) => break,
            }
        }

        let batch_size = batch.len();
        if let Err(e) = write_batch(&mut writer, &batch).await {
            tracing::error!("Writer failed: {}", e);
            return Err(e);
        }

        pending.fetch_sub(batch_size, Ordering::Release);
    }
}

/// Write a batch of chunks with write_vectored, continuing after partial writes.
async fn write_batch<W>(writer: &mut W, batch: &[Bytes]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total_size: usize = batch.iter().map(Bytes::len).sum();
    if total_size == 0 {
        return Ok(());
    }

    let mut total_written = 0;
    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(AuroraError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// IoSlices for whatever remains after skipping `skip_bytes`.
fn build_remaining_slices(batch: &[Bytes], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len());
    let mut offset = 0;

    for chunk in batch {
        let end = offset + chunk.len();
        if skip_bytes < end && !chunk.is_empty() {
            let start = skip_bytes.saturating_sub(offset);
            slices.push(IoSlice::new(&chunk[start..]));
        }
        offset = end;
    }

    slices
}

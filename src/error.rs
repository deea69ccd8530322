//! Error types for aurora-client.

use thiserror::Error;

/// Main error type for all aurora operations.
#[derive(Debug, Error)]
pub enum AuroraError {
    /// I/O error on the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while loading configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No transport attached, or the transport is closed.
    #[error("No transport available")]
    NoTransport,

    /// A transaction is in flight and queueing is disabled.
    #[error("Session busy, command {0} dropped")]
    Busy(u8),

    /// The command queue reached its configured capacity.
    #[error("Command queue full ({0} entries)")]
    QueueFull(usize),

    /// Upload description is inconsistent (no segments, zero packet size, ...).
    #[error("Invalid upload: {0}")]
    InvalidUpload(String),

    /// Live frame longer than the channel count opened for live control.
    #[error("Live frame of {len} bytes exceeds {channels} open channels")]
    LiveFrameTooLarge {
        /// Frame length in bytes.
        len: usize,
        /// Channels opened by the last live mode command.
        channels: usize,
    },

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The device task or connection has gone away.
    #[error("Connection closed")]
    ConnectionClosed,
}

/// Result type alias using AuroraError.
pub type Result<T> = std::result::Result<T, AuroraError>;

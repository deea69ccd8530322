//! Session configuration.
//!
//! All fields have defaults, so a config file only needs the values it
//! changes:
//!
//! ```
//! use aurora_client::SessionConfig;
//!
//! let config = SessionConfig::from_json(r#"{ "fast_mode": true, "timeout_ms": 5000 }"#).unwrap();
//! assert!(config.fast_mode);
//! assert_eq!(config.max_retries, 3);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AuroraError, Result};
use crate::session::{DEFAULT_CHECKPOINT_BYTES, DEFAULT_MAX_RETRIES, DEFAULT_QUEUE_CAPACITY};
use crate::transport::TransportKind;

/// Configuration for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Deadline in milliseconds. `None` uses the transport kind's default.
    pub timeout_ms: Option<u64>,
    /// Attempts before a transaction fails (ERR or silence).
    pub max_retries: u8,
    /// Send unlock sequence and frame in one write, skipping the handshake.
    pub fast_mode: bool,
    /// Queue commands while busy instead of dropping them.
    pub enable_queue: bool,
    /// Maximum queued commands.
    pub queue_capacity: usize,
    /// Received bytes between progress updates and deadline re-arms.
    pub checkpoint_bytes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: None,
            max_retries: DEFAULT_MAX_RETRIES,
            fast_mode: false,
            enable_queue: true,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            checkpoint_bytes: DEFAULT_CHECKPOINT_BYTES,
        }
    }
}

impl SessionConfig {
    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: SessionConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the session cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(AuroraError::Config("max_retries must be at least 1".into()));
        }
        if self.checkpoint_bytes == 0 {
            return Err(AuroraError::Config("checkpoint_bytes must be non-zero".into()));
        }
        if self.timeout_ms == Some(0) {
            return Err(AuroraError::Config("timeout_ms must be non-zero".into()));
        }
        Ok(())
    }

    /// Effective deadline for `kind`.
    pub fn timeout_for(&self, kind: TransportKind) -> Duration {
        self.timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| kind.default_timeout())
    }
}

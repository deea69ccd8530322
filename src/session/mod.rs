//! Session module - one device connection's protocol engine.
//!
//! - [`State`] and [`Progress`]: where the transaction is and how far along
//! - [`Command`]: frame plus continuations, replayable on retry
//! - [`Upload`]/[`Segment`]: packetized host→device transfers
//! - [`Session`]: the state machine tying it all together

mod command;
mod deadline;
mod machine;
mod payload;
mod queue;
mod state;

pub use command::{AckEffect, Callback, Command, OnAck, PayloadCallback, PayloadOutcome};
pub use deadline::{Deadline, DEFAULT_MAX_RETRIES};
pub use machine::{Dispatch, Session, SessionHooks};
pub use payload::{Segment, Upload, DEFAULT_CHECKPOINT_BYTES};
pub use queue::DEFAULT_QUEUE_CAPACITY;
pub use state::{Progress, State};

//! Transport module - the byte port the session writes to.
//!
//! The session never opens, closes, or enumerates transports. It only needs
//! a [`Port`]: something it can write bytes to, that reports whether it is
//! open, and that carries an explicit [`TransportKind`] tag chosen by the
//! adapter at construction time.
//!
//! Inbound bytes flow the other way: whoever owns the transport reads chunks
//! and feeds them to [`Session::receive`](crate::Session::receive).

mod port;
pub mod tcp;

pub use port::{Port, TransportKind};

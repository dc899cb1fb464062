//! Wire protocol for hookwire client↔peer communication.
//!
//! Messages are serialized with [`postcard`] and framed with a 4-byte
//! big-endian length prefix, suitable for any reliable byte stream
//! (Unix socket, TCP, pipe pair).

mod codec;
mod message;

pub use codec::{MAX_FRAME, recv, send};
pub use message::{Event, PROTOCOL_VERSION, Reply, Request};

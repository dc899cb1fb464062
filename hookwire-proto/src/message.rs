//! Protocol message types for client↔peer communication.

use serde::{Deserialize, Serialize};

/// Protocol version exchanged in the [`Request::Hello`] handshake.
pub const PROTOCOL_VERSION: u32 = 1;

/// One classified event pushed by the peer.
///
/// Events carry no correlation id: a [`Event::Status`] / [`Event::Output`]
/// pair belongs to whichever command was sent last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Event {
    /// Unsolicited notification, e.g. `["tag_changed", "1", "2"]`.
    Hook(Vec<String>),
    /// Exit status of the most recently sent command.
    Status(i32),
    /// Captured output of the most recently sent command.
    Output(String),
}

impl Event {
    /// Short name of the active variant, for logging.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Hook(_) => "hook",
            Self::Status(_) => "status",
            Self::Output(_) => "output",
        }
    }
}

/// Message sent from client to peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Request {
    /// Opens a session. Must be the first frame on a connection.
    Hello {
        /// Client protocol version.
        version: u32,
    },
    /// Runs a command. The peer answers with exactly one
    /// [`Event::Status`] and one [`Event::Output`], in either order.
    Command(Vec<String>),
}

/// Message sent from peer to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Reply {
    /// Handshake acknowledgement for [`Request::Hello`].
    Welcome {
        /// Peer protocol version.
        version: u32,
    },
    /// A classified event on the shared stream.
    Event(Event),
}

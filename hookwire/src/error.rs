//! Error types for hookwire operations.

/// Alias for `Result<T, hookwire::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by connection operations.
///
/// A missing peer is not an error: [`Connection::connect`] returns `Ok(None)`.
///
/// [`Connection::connect`]: crate::Connection::connect
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The transport failed while an operation was in progress.
    ///
    /// Fatal to the connection; every pending and later operation on it
    /// reports the same reason.
    #[error("{op}: connection lost: {reason}")]
    ConnectionLost {
        /// The public operation that observed the failure.
        op: &'static str,
        /// Why the transport stopped.
        reason: String,
    },

    /// The peer speaks a different protocol version.
    #[error("protocol version mismatch: client v{ours}, peer v{theirs}")]
    VersionMismatch {
        /// Version sent by this client.
        ours: u32,
        /// Version announced by the peer.
        theirs: u32,
    },

    /// An I/O error while opening or closing the transport.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Builds a [`Error::ConnectionLost`] from any displayable cause.
    pub(crate) fn lost(op: &'static str, reason: impl ToString) -> Self {
        Self::ConnectionLost {
            op,
            reason: reason.to_string(),
        }
    }

    /// Returns `true` if the connection is gone and must be discarded.
    pub const fn is_connection_lost(&self) -> bool {
        matches!(self, Self::ConnectionLost { .. })
    }
}

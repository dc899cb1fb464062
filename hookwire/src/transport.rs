//! The raw event source a [`Connection`] is built on.
//!
//! A transport delivers one interleaved, already-classified [`Event`] stream
//! and accepts one-way command sends. It knows nothing about subscriptions
//! or command matching; that is the job of the bus and the gate.
//!
//! [`Connection`]: crate::Connection

use std::future::Future;
use std::io;

use crate::{Event, Result};

/// A connection to a single peer process.
///
/// Implementations must be shareable across tasks: the bus reader calls
/// [`receive`](Transport::receive) while other tasks call
/// [`send`](Transport::send) concurrently.
pub trait Transport: Send + Sync + Sized + 'static {
    /// Where to find the peer.
    type Endpoint: Sync + ?Sized;

    /// Establishes the transport.
    ///
    /// Returns `Ok(None)` when no peer is reachable at `endpoint`; anything
    /// partially acquired before that decision must already be released.
    fn open(endpoint: &Self::Endpoint) -> impl Future<Output = Result<Option<Self>>> + Send;

    /// Sends one command. One-way: no acknowledgement is awaited, but
    /// successive sends reach the peer in call order.
    fn send(&self, args: Vec<String>) -> impl Future<Output = io::Result<()>> + Send;

    /// Waits for the next event.
    ///
    /// Must be cancel-safe: dropping the future before it completes may not
    /// lose an event. The bus relies on this to stop without waiting for
    /// the peer.
    fn receive(&self) -> impl Future<Output = io::Result<Event>> + Send;

    /// Returns the next event if one is already queued.
    fn try_receive(&self) -> io::Result<Option<Event>>;

    /// Releases transport resources. Called at most once per transport.
    fn close(&self) -> impl Future<Output = io::Result<()>> + Send;
}

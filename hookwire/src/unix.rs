//! Unix domain socket transport speaking the `hookwire-proto` framing.
//!
//! # Platform
//!
//! This module is only available on Unix (Linux / macOS).

#![cfg(unix)]

use std::io;

use hookwire_proto::{PROTOCOL_VERSION, Reply, Request};
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::Endpoint;
use crate::transport::Transport;
use crate::{Connection, Error, Event, Result};

/// A [`Connection`] over a [`UnixTransport`].
pub type UnixConnection = Connection<UnixTransport>;

/// Frames decoded by the background reader, in arrival order.
type Queue = mpsc::UnboundedReceiver<io::Result<Event>>;

/// Event source backed by a Unix socket to the peer.
///
/// A decoder task owns the read half and queues classified events, which
/// keeps [`receive`](Transport::receive) cancel-safe.
#[derive(Debug)]
pub struct UnixTransport {
    /// Write half; the lock keeps frames whole and in call order.
    writer: Mutex<BufWriter<OwnedWriteHalf>>,
    /// Events queued by the decoder task.
    events: Mutex<Queue>,
    /// The decoder task.
    decoder: JoinHandle<()>,
}

impl Transport for UnixTransport {
    type Endpoint = Endpoint;

    async fn open(endpoint: &Endpoint) -> Result<Option<Self>> {
        let stream = match UnixStream::connect(endpoint.path()).await {
            Ok(s) => s,
            Err(e) if is_absent(&e) => {
                debug!(path = %endpoint.path().display(), error = %e, "no peer listening");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        // Dropping either half on an early return closes the socket.
        let (reader, writer) = stream.into_split();
        let mut r = BufReader::new(reader);
        let mut w = BufWriter::new(writer);

        match handshake(&mut r, &mut w).await {
            Ok(()) => {}
            Err(Error::Io(e)) if is_absent(&e) => {
                debug!(error = %e, "peer hung up during handshake");
                return Ok(None);
            }
            Err(e) => return Err(e),
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let decoder = tokio::spawn(decode(r, tx));
        debug!(path = %endpoint.path().display(), "connected to peer");
        Ok(Some(Self {
            writer: Mutex::new(w),
            events: Mutex::new(rx),
            decoder,
        }))
    }

    async fn send(&self, args: Vec<String>) -> io::Result<()> {
        let mut w = self.writer.lock().await;
        hookwire_proto::send(&mut *w, &Request::Command(args)).await
    }

    async fn receive(&self) -> io::Result<Event> {
        let mut events = self.events.lock().await;
        match events.recv().await {
            Some(item) => item,
            None => Err(peer_closed()),
        }
    }

    fn try_receive(&self) -> io::Result<Option<Event>> {
        // Someone is already waiting in `receive`; nothing is ours to take.
        let Ok(mut events) = self.events.try_lock() else {
            return Ok(None);
        };
        match events.try_recv() {
            Ok(item) => item.map(Some),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(peer_closed()),
        }
    }

    async fn close(&self) -> io::Result<()> {
        self.decoder.abort();
        self.writer.lock().await.shutdown().await
    }
}

impl Drop for UnixTransport {
    fn drop(&mut self) {
        self.decoder.abort();
    }
}

/// Sends `Hello` and checks the peer's `Welcome`.
async fn handshake(
    r: &mut BufReader<OwnedReadHalf>,
    w: &mut BufWriter<OwnedWriteHalf>,
) -> Result<()> {
    hookwire_proto::send(
        w,
        &Request::Hello {
            version: PROTOCOL_VERSION,
        },
    )
    .await?;

    match hookwire_proto::recv::<Reply>(r).await? {
        Reply::Welcome { version } if version == PROTOCOL_VERSION => Ok(()),
        Reply::Welcome { version } => Err(Error::VersionMismatch {
            ours: PROTOCOL_VERSION,
            theirs: version,
        }),
        other => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("expected welcome, got {other:?}"),
        )
        .into()),
    }
}

/// Reads frames until EOF or error, queueing every event.
async fn decode(mut r: BufReader<OwnedReadHalf>, tx: mpsc::UnboundedSender<io::Result<Event>>) {
    loop {
        match hookwire_proto::recv::<Reply>(&mut r).await {
            Ok(Reply::Event(event)) => {
                if tx.send(Ok(event)).is_err() {
                    return;
                }
            }
            Ok(other) => debug!(reply = ?other, "ignoring unexpected reply"),
            Err(e) => {
                let _ = tx.send(Err(e));
                return;
            }
        }
    }
}

/// Errors meaning "nobody is there" rather than "something broke".
fn is_absent(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::NotFound
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}

/// Error reported once the decoder has stopped.
fn peer_closed() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "peer closed the connection")
}

//! Scripted in-memory transport shared by the integration tests.

#![allow(dead_code, clippy::missing_docs_in_private_items, clippy::unwrap_used)]

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use hookwire::{Event, Result, Transport};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

/// Transport half handed to the connection.
#[derive(Debug)]
pub struct FakeTransport {
    events: tokio::sync::Mutex<mpsc::UnboundedReceiver<io::Result<Event>>>,
    sent: mpsc::UnboundedSender<Vec<String>>,
    closes: Arc<AtomicUsize>,
}

/// Test-side half: plays the peer.
#[derive(Debug)]
pub struct Peer {
    events: mpsc::UnboundedSender<io::Result<Event>>,
    sent: mpsc::UnboundedReceiver<Vec<String>>,
    closes: Arc<AtomicUsize>,
}

/// Creates a connected transport/peer pair.
pub fn pair() -> (FakeTransport, Peer) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (sent_tx, sent_rx) = mpsc::unbounded_channel();
    let closes = Arc::new(AtomicUsize::new(0));
    let transport = FakeTransport {
        events: tokio::sync::Mutex::new(event_rx),
        sent: sent_tx,
        closes: Arc::clone(&closes),
    };
    let peer = Peer {
        events: event_tx,
        sent: sent_rx,
        closes,
    };
    (transport, peer)
}

impl Peer {
    pub fn emit(&self, event: Event) {
        self.events.send(Ok(event)).unwrap();
    }

    pub fn hook(&self, payload: &[&str]) {
        self.emit(Event::Hook(payload.iter().map(|s| (*s).to_owned()).collect()));
    }

    pub fn fail(&self, reason: &str) {
        self.events
            .send(Err(io::Error::new(io::ErrorKind::ConnectionReset, reason.to_owned())))
            .unwrap();
    }

    /// Waits for the next command the client sent.
    pub async fn next_command(&mut self) -> Vec<String> {
        self.sent.recv().await.expect("client side dropped")
    }

    /// Panics if the client has sent a command nobody read yet.
    pub fn assert_quiet(&mut self) {
        if let Ok(cmd) = self.sent.try_recv() {
            panic!("unexpected command on the wire: {cmd:?}");
        }
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl Transport for FakeTransport {
    type Endpoint = FakeEndpoint;

    async fn open(endpoint: &FakeEndpoint) -> Result<Option<Self>> {
        endpoint.opens.fetch_add(1, Ordering::SeqCst);
        Ok(endpoint.transport.lock().unwrap().take())
    }

    async fn send(&self, args: Vec<String>) -> io::Result<()> {
        self.sent
            .send(args)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"))
    }

    async fn receive(&self) -> io::Result<Event> {
        match self.events.lock().await.recv().await {
            Some(item) => item,
            None => Err(io::Error::new(io::ErrorKind::UnexpectedEof, "peer gone")),
        }
    }

    fn try_receive(&self) -> io::Result<Option<Event>> {
        let Ok(mut events) = self.events.try_lock() else {
            return Ok(None);
        };
        match events.try_recv() {
            Ok(item) => item.map(Some),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                Err(io::Error::new(io::ErrorKind::UnexpectedEof, "peer gone"))
            }
        }
    }

    async fn close(&self) -> io::Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Endpoint that hands out a prepared transport, or none at all.
#[derive(Debug, Default)]
pub struct FakeEndpoint {
    transport: Mutex<Option<FakeTransport>>,
    pub opens: AtomicUsize,
}

impl FakeEndpoint {
    pub fn reachable(transport: FakeTransport) -> Self {
        Self {
            transport: Mutex::new(Some(transport)),
            opens: AtomicUsize::new(0),
        }
    }

    pub fn unreachable() -> Self {
        Self::default()
    }
}

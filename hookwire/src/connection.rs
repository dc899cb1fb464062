//! A live connection to one peer: commands, hooks, and teardown.
//!
//! Only one connection to a given peer may exist at a time. That is a
//! precondition on callers; nothing in-process enforces it.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::bus::{EventBus, Subscription};
use crate::gate::Gate;
use crate::transport::Transport;
use crate::{Error, Event, Result};

/// A transport, the bus draining it, and the command gate.
///
/// All methods take `&self`; share the connection across tasks with an
/// [`Arc`] or by borrowing it into scoped tasks.
#[derive(Debug)]
pub struct Connection<T: Transport> {
    /// The event source and command sink.
    transport: Arc<T>,
    /// Fan-out of `transport`'s events.
    bus: EventBus,
    /// Serializes command round-trips.
    gate: Gate,
}

impl<T: Transport> Connection<T> {
    /// Opens the transport and starts the bus.
    ///
    /// Returns `Ok(None)` if no peer is reachable at `endpoint`.
    pub async fn connect(endpoint: &T::Endpoint) -> Result<Option<Self>> {
        match T::open(endpoint).await? {
            Some(transport) => Ok(Some(Self::from_transport(transport))),
            None => {
                debug!("no peer reachable");
                Ok(None)
            }
        }
    }

    /// Starts a connection over an already opened transport.
    pub fn from_transport(transport: T) -> Self {
        let transport = Arc::new(transport);
        let bus = EventBus::start(Arc::clone(&transport));
        Self {
            transport,
            bus,
            gate: Gate::new(),
        }
    }

    /// Stops the bus, then closes the transport.
    ///
    /// Operations still pending on other tasks fail with
    /// [`Error::ConnectionLost`].
    pub async fn disconnect(mut self) -> Result<()> {
        self.bus.stop().await;
        self.transport.close().await?;
        debug!("disconnected");
        Ok(())
    }

    /// Subscribes to every event arriving from now on.
    pub fn subscribe(&self) -> Subscription {
        self.bus.subscribe()
    }

    /// Runs one command and returns its exit status and output.
    ///
    /// Round-trips are serialized: a second caller waits until this one has
    /// collected both its status and its output. Hooks and duplicate replies
    /// seen meanwhile are discarded. Assumes the peer answers each command
    /// with exactly one status and one output before answering the next.
    pub async fn execute<I, S>(&self, args: I) -> Result<(i32, String)>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();

        let _turn = self.gate.acquire().await;
        // Subscribe before sending so no reply can slip past.
        let mut replies = self.bus.subscribe();
        debug!(?args, "sending command");
        self.transport
            .send(args)
            .await
            .map_err(|e| Error::lost("execute", e))?;

        let mut status = None;
        let mut output = None;
        loop {
            match replies.next_for("execute").await? {
                Event::Status(code) if status.is_none() => status = Some(code),
                Event::Output(text) if output.is_none() => output = Some(text),
                other => trace!(kind = other.kind(), "command discarding event"),
            }
            if let (Some(code), Some(text)) = (status, output.as_mut()) {
                debug!(code, "command finished");
                return Ok((code, std::mem::take(text)));
            }
        }
    }

    /// Waits for the next hook and returns its payload.
    ///
    /// Does not touch the command gate, so it runs freely alongside
    /// [`execute`](Self::execute). To avoid missing a hook that arrives
    /// before this call is first polled, use [`subscribe`](Self::subscribe)
    /// followed by [`Subscription::next_hook`].
    pub async fn wait_hook(&self) -> Result<Vec<String>> {
        self.subscribe().next_hook().await
    }
}

/// Connects, runs `action`, and disconnects on every exit path.
///
/// Returns `Ok(None)` if no peer is reachable. A failure to close the
/// transport afterwards is logged, not returned. On panic or cancellation
/// the connection is dropped, which aborts the bus reader.
///
/// ```no_run
/// # #[cfg(unix)]
/// # async fn demo() -> hookwire::Result<()> {
/// use hookwire::{Endpoint, UnixTransport, with_connection};
///
/// let endpoint = Endpoint::from_env();
/// let out = with_connection::<UnixTransport, _, _>(&endpoint, async |conn| {
///     conn.execute(["echo", "foo"]).await
/// })
/// .await?;
/// if let Some(result) = out {
///     let (code, text) = result?;
///     assert_eq!((code, text.as_str()), (0, "foo\n"));
/// }
/// # Ok(())
/// # }
/// ```
pub async fn with_connection<T, F, R>(endpoint: &T::Endpoint, action: F) -> Result<Option<R>>
where
    T: Transport,
    F: AsyncFnOnce(&Connection<T>) -> R,
{
    let Some(conn) = Connection::<T>::connect(endpoint).await? else {
        return Ok(None);
    };
    let out = action(&conn).await;
    if let Err(e) = conn.disconnect().await {
        warn!(error = %e, "failed to close transport");
    }
    Ok(Some(out))
}

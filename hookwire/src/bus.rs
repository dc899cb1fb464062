//! Fan-out of a transport's event stream to independent subscriptions.
//!
//! Exactly one reader task drains the [`Transport`]; every event it receives
//! is pushed to every live [`Subscription`] in arrival order. Each
//! subscription has its own unbounded queue, so a slow reader never holds
//! up the bus or its siblings and nothing is ever dropped.
//!
//! ```text
//!                          ┌──────────────┐
//!                      ┌──►│ Subscription │  execute()
//! ┌───────────┐  ┌─────┴┐  └──────────────┘
//! │ Transport │─►│ pump ├─►┌──────────────┐
//! └───────────┘  └─────┬┘  │ Subscription │  wait_hook()
//!                      └──►└──────────────┘
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::transport::Transport;
use crate::{Error, Event, Result};

/// Reason reported to subscribers after an orderly shutdown.
const CLOSED: &str = "connection closed";

/// Live subscribers plus the bus's terminal state.
#[derive(Debug, Default)]
struct Registry {
    /// Id handed to the next subscription.
    next_id: u64,
    /// Queue senders keyed by subscription id.
    senders: HashMap<u64, mpsc::UnboundedSender<Event>>,
    /// Set once the reader has stopped. Never overwritten.
    closed: Option<Arc<str>>,
}

/// State shared by the bus, its reader task and every subscription.
///
/// Subscribe and publish both hold the registry lock, so a subscription
/// created concurrently with a publish lands strictly before or after it.
#[derive(Debug, Default)]
struct Shared {
    /// Subscriber registry.
    registry: Mutex<Registry>,
}

impl Shared {
    /// Locks the registry. A panic while holding the lock leaves it consistent.
    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a new subscription that sees every later publish.
    fn subscribe(self: &Arc<Self>) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut reg = self.lock();
        let id = reg.next_id;
        reg.next_id += 1;
        // After shutdown the sender is dropped here and `next()` fails at once.
        if reg.closed.is_none() {
            reg.senders.insert(id, tx);
        }
        drop(reg);
        trace!(id, "subscription registered");
        Subscription {
            id,
            rx,
            shared: Arc::clone(self),
        }
    }

    /// Delivers `event` to every registered subscription.
    fn publish(&self, event: &Event) {
        let mut reg = self.lock();
        trace!(kind = event.kind(), subscribers = reg.senders.len(), "publishing event");
        reg.senders.retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    /// Marks the bus terminal and disconnects every subscription.
    ///
    /// Queued events stay readable; only the first reason is kept.
    fn close(&self, reason: &str) {
        let mut reg = self.lock();
        if reg.closed.is_none() {
            reg.closed = Some(reason.into());
        }
        reg.senders.clear();
    }

    /// Why the bus stopped.
    fn reason(&self) -> Arc<str> {
        self.lock()
            .closed
            .clone()
            .unwrap_or_else(|| Arc::from(CLOSED))
    }

    /// Removes a dropped subscription.
    fn unsubscribe(&self, id: u64) {
        self.lock().senders.remove(&id);
    }
}

/// Single reader of a [`Transport`], republishing to all subscriptions.
///
/// Must be started from within a tokio runtime. Dropping the bus without
/// calling [`stop`](Self::stop) aborts the reader task.
#[derive(Debug)]
pub struct EventBus {
    /// Registry shared with the reader and subscriptions.
    shared: Arc<Shared>,
    /// Fires the reader's shutdown branch.
    shutdown: Option<oneshot::Sender<()>>,
    /// The reader task, taken by `stop` or `drop`.
    reader: Option<JoinHandle<()>>,
}

impl EventBus {
    /// Spawns the reader task over `transport`.
    pub fn start<T: Transport>(transport: Arc<T>) -> Self {
        let shared = Arc::new(Shared::default());
        let (tx, rx) = oneshot::channel();
        let reader = tokio::spawn(pump(transport, Arc::clone(&shared), rx));
        debug!("event bus started");
        Self {
            shared,
            shutdown: Some(tx),
            reader: Some(reader),
        }
    }

    /// Returns a subscription to every event published from now on.
    ///
    /// Never blocks and never replays earlier events.
    pub fn subscribe(&self) -> Subscription {
        self.shared.subscribe()
    }

    /// Stops the reader task and waits for it to exit.
    ///
    /// Does not wait for an in-flight receive to complete. Idempotent.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(reader) = self.reader.take() {
            if let Err(e) = reader.await {
                warn!(error = %e, "event bus reader did not exit cleanly");
            }
            debug!("event bus stopped");
        }
        self.shared.close(CLOSED);
    }

    /// Returns `true` while the reader task is still running.
    pub fn is_running(&self) -> bool {
        self.reader.as_ref().is_some_and(|r| !r.is_finished())
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.shared.close(CLOSED);
    }
}

/// Reader loop: receive, publish, repeat until shut down or the source fails.
async fn pump<T: Transport>(
    transport: Arc<T>,
    shared: Arc<Shared>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                shared.close(CLOSED);
                return;
            }
            received = transport.receive() => {
                match received {
                    Ok(event) => shared.publish(&event),
                    Err(e) => {
                        warn!(error = %e, "event source failed, stopping event bus");
                        shared.close(&e.to_string());
                        return;
                    }
                }
            }
        }
    }
}

/// A private, ordered view of the bus from its creation onward.
///
/// Dropping the subscription unregisters it.
#[derive(Debug)]
pub struct Subscription {
    /// Registry key.
    id: u64,
    /// Events published since creation, oldest first.
    rx: mpsc::UnboundedReceiver<Event>,
    /// Back-reference for unregistering and failure reasons.
    shared: Arc<Shared>,
}

impl Subscription {
    /// Waits for the next event.
    ///
    /// Fails with [`Error::ConnectionLost`] once the bus has stopped and
    /// every event published before that has been read.
    pub async fn next(&mut self) -> Result<Event> {
        self.next_for("next").await
    }

    /// Waits for the next hook, discarding everything else.
    pub async fn next_hook(&mut self) -> Result<Vec<String>> {
        loop {
            match self.next_for("wait_hook").await? {
                Event::Hook(payload) => return Ok(payload),
                other => trace!(kind = other.kind(), "hook waiter discarding event"),
            }
        }
    }

    /// [`next`](Self::next), reporting a lost connection against `op`.
    pub(crate) async fn next_for(&mut self, op: &'static str) -> Result<Event> {
        match self.rx.recv().await {
            Some(event) => Ok(event),
            None => Err(Error::lost(op, self.shared.reason())),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.shared.unsubscribe(self.id);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io;
    use std::time::Duration;

    use super::*;

    /// Plays back a fixed script, then blocks forever.
    #[derive(Debug, Default)]
    struct Script(Mutex<VecDeque<io::Result<Event>>>);

    impl Script {
        fn new(items: impl IntoIterator<Item = io::Result<Event>>) -> Arc<Self> {
            Arc::new(Self(Mutex::new(items.into_iter().collect())))
        }
    }

    impl Transport for Script {
        type Endpoint = ();

        async fn open(_endpoint: &()) -> Result<Option<Self>> {
            Ok(Some(Self::default()))
        }

        async fn send(&self, _args: Vec<String>) -> io::Result<()> {
            Ok(())
        }

        async fn receive(&self) -> io::Result<Event> {
            let next = self.0.lock().unwrap().pop_front();
            match next {
                Some(item) => item,
                None => std::future::pending().await,
            }
        }

        fn try_receive(&self) -> io::Result<Option<Event>> {
            self.0.lock().unwrap().pop_front().transpose()
        }

        async fn close(&self) -> io::Result<()> {
            Ok(())
        }
    }

    fn drain(sub: &mut Subscription) -> Vec<Event> {
        std::iter::from_fn(|| sub.rx.try_recv().ok()).collect()
    }

    #[test]
    fn each_subscription_sees_the_suffix_after_its_creation() {
        let shared = Arc::new(Shared::default());
        let created_at = [0usize, 3, 3, 7, 10];
        let total = 10;

        let mut subs = Vec::new();
        for i in 0..=total {
            for &at in &created_at {
                if at == i {
                    subs.push((at, shared.subscribe()));
                }
            }
            if i < total {
                shared.publish(&Event::Status(i32::try_from(i).unwrap()));
            }
        }

        for (at, sub) in &mut subs {
            let expected: Vec<Event> = (*at..total)
                .map(|i| Event::Status(i32::try_from(i).unwrap()))
                .collect();
            assert_eq!(drain(sub), expected, "subscription created at {at}");
        }
    }

    #[test]
    fn reading_one_subscription_does_not_consume_another() {
        let shared = Arc::new(Shared::default());
        let mut a = shared.subscribe();
        let mut b = shared.subscribe();
        shared.publish(&Event::Output("x".into()));

        assert_eq!(drain(&mut a), vec![Event::Output("x".into())]);
        assert_eq!(drain(&mut b), vec![Event::Output("x".into())]);
    }

    #[test]
    fn dropping_a_subscription_unregisters_it() {
        let shared = Arc::new(Shared::default());
        let a = shared.subscribe();
        let _b = shared.subscribe();
        assert_eq!(shared.lock().senders.len(), 2);

        drop(a);
        assert_eq!(shared.lock().senders.len(), 1);
    }

    #[tokio::test]
    async fn queued_events_survive_close_then_reason_is_reported() {
        let shared = Arc::new(Shared::default());
        let mut sub = shared.subscribe();
        shared.publish(&Event::Status(3));
        shared.close("peer went away");
        shared.close("second reason is ignored");

        assert_eq!(sub.next().await.unwrap(), Event::Status(3));
        match sub.next().await.unwrap_err() {
            Error::ConnectionLost { op, reason } => {
                assert_eq!(op, "next");
                assert_eq!(reason, "peer went away");
            }
            other => panic!("unexpected error: {other}"),
        }

        // Late subscribers fail immediately with the same reason.
        let mut late = shared.subscribe();
        assert!(late.next().await.unwrap_err().to_string().contains("peer went away"));
    }

    #[tokio::test]
    async fn reader_failure_is_visible_to_blocked_subscribers() {
        let script = Script::new([
            Ok(Event::Hook(vec!["a".into()])),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer")),
        ]);
        // Subscribe before the reader gets a chance to run.
        let bus = EventBus::start(script);
        let mut sub = bus.subscribe();

        assert_eq!(sub.next().await.unwrap(), Event::Hook(vec!["a".into()]));
        let err = sub.next_hook().await.unwrap_err();
        assert!(err.is_connection_lost());
        assert!(err.to_string().contains("reset by peer"), "{err}");
    }

    #[tokio::test]
    async fn stop_does_not_wait_for_a_blocked_receive() {
        let mut bus = EventBus::start(Script::new([]));
        let mut sub = bus.subscribe();
        tokio::task::yield_now().await;
        assert!(bus.is_running());

        tokio::time::timeout(Duration::from_secs(5), bus.stop())
            .await
            .expect("stop blocked on receive");
        assert!(!bus.is_running());
        bus.stop().await;

        let err = sub.next().await.unwrap_err();
        assert!(err.to_string().contains(CLOSED), "{err}");
    }

    #[tokio::test]
    async fn dropping_the_bus_releases_subscribers() {
        let bus = EventBus::start(Script::new([]));
        let mut sub = bus.subscribe();
        drop(bus);
        assert!(sub.next().await.unwrap_err().is_connection_lost());
    }
}

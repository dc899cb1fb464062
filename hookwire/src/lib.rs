//! Concurrent commands and hooks over a single peer event stream.
//!
//! A peer process pushes one interleaved stream of [`Event`]s: hooks it
//! emits on its own, plus a status and an output for every command a client
//! sends. Nothing on the wire says which event belongs to whom. `hookwire`
//! turns that stream into two capabilities any number of tasks may use at
//! once:
//!
//! - [`Connection::execute`] sends a command and returns exactly its
//!   `(status, output)`. Round-trips are serialized by a [`Gate`].
//! - [`Connection::wait_hook`] returns the next hook. It never waits on the
//!   gate.
//!
//! Both consume from their own [`Subscription`] to an [`EventBus`] that is
//! the sole reader of the [`Transport`].
//!
//! # Quick start
//!
//! ```no_run
//! # #[cfg(unix)]
//! # async fn demo() -> hookwire::Result<()> {
//! use hookwire::{Endpoint, UnixConnection};
//!
//! let Some(conn) = UnixConnection::connect(&Endpoint::from_env()).await? else {
//!     return Ok(()); // no peer running
//! };
//!
//! let mut hooks = conn.subscribe();
//! let (code, text) = conn.execute(["echo", "foo"]).await?;
//! println!("{code}: {text}");
//! println!("hook: {:?}", hooks.next_hook().await?);
//!
//! conn.disconnect().await
//! # }
//! ```

mod bus;
mod config;
mod connection;
mod error;
mod gate;
mod transport;
#[cfg(unix)]
mod unix;

pub use bus::{EventBus, Subscription};
pub use config::{ENV_SOCKET, Endpoint};
pub use connection::{Connection, with_connection};
pub use error::{Error, Result};
pub use gate::{Gate, GateGuard};
pub use hookwire_proto::Event;
pub use transport::Transport;
#[cfg(unix)]
pub use unix::{UnixConnection, UnixTransport};

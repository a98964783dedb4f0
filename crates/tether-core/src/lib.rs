//! Tether liveness supervision
//!
//! Wraps an already-established full-duplex message connection and turns a
//! stalled or dead peer into an error instead of a hung caller.
//!
//! # Architecture
//!
//! The wrapped transport owns framing, deadlines and the receive loop. This
//! crate only decides *when* deadlines move and *who* may write:
//!
//! ```text
//!             write() / ping()                  read()
//!                   │                              │
//!                   ▼                              │
//!          ┌─────────────────┐                     │
//!          │ WriteSerializer │◄──── pong reply     │
//!          └────────┬────────┘          ▲          │
//!                   │                   │          │
//!                   ▼                   │          ▼
//!          ┌──────────────────────────────────────────┐
//!          │              DuplexTransport             │
//!          └──────────────────────────────────────────┘
//!                               │ inbound ping/pong
//!                               ▼
//!                       HeartbeatHandler ── re-arms read deadline
//! ```
//!
//! Every inbound ping or pong pushes the read deadline out by the configured
//! ping wait, so an idle but alive peer is never mistaken for a dead one. A
//! peer that goes silent surfaces as [`TransportError::DeadlineExceeded`]
//! from [`Connection::read`] within a bounded time.
//!
//! # Components
//!
//! - [`connection`]: Connection facade (read, write, ping)
//! - `heartbeat`: Inbound ping/pong handling and deadline re-arming
//! - [`serializer`]: Mutual exclusion over outbound writes
//! - [`keepalive`]: Periodic outbound pings
//! - [`transport`]: Injected duplex transport abstraction
//! - [`config`]: Heartbeat timing configuration
//! - [`error`]: Error types

pub mod config;
pub mod connection;
pub mod error;
mod heartbeat;
pub mod keepalive;
pub mod message;
pub mod serializer;
pub mod transport;

#[cfg(test)]
mod testing;

pub use config::HeartbeatConfig;
pub use connection::Connection;
pub use error::{ConfigError, ConnectionError, TransportError};
pub use keepalive::Keepalive;
pub use message::{ControlSignal, Message, MessageKind};
pub use transport::{ControlHandler, DuplexTransport};

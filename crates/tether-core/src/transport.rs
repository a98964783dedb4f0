//! Duplex transport abstraction.
//!
//! Abstracts over message-oriented, full-duplex connections that carry both
//! application messages and ping/pong control frames (WebSocket-style).
//! Production wraps a real socket, tests use in-memory pipes or Turmoil.
//!
//! Handshakes, framing and address resolution all live behind this trait.

use std::{net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::Instant;

use crate::{
    error::TransportError,
    message::{ControlSignal, Message, MessageKind},
};

/// An established full-duplex message connection.
///
/// Reads and writes are independent directions and may run concurrently.
/// Implementations are NOT required to tolerate concurrent writers: two
/// overlapping `send_*` calls may interleave on the wire. The
/// [`crate::Connection`] facade serializes all writes for that reason.
///
/// Deadlines are absolute. Once a read deadline elapses the transport is
/// expected to fail pending and future reads with
/// [`TransportError::DeadlineExceeded`].
#[async_trait]
pub trait DuplexTransport: Send + Sync + 'static {
    /// Send an application message.
    ///
    /// Fails with [`TransportError::DeadlineExceeded`] if the write does not
    /// complete before `deadline`.
    async fn send_message(
        &self,
        kind: MessageKind,
        payload: Bytes,
        deadline: Instant,
    ) -> Result<(), TransportError>;

    /// Send a ping or pong control frame.
    async fn send_control(
        &self,
        signal: ControlSignal,
        payload: Bytes,
        deadline: Instant,
    ) -> Result<(), TransportError>;

    /// Receive the next application message.
    ///
    /// Blocks until a message arrives, the connection closes, or the current
    /// read deadline elapses. Control frames never surface here; they go to
    /// the registered [`ControlHandler`]s.
    async fn receive_message(&self) -> Result<Message, TransportError>;

    /// Replace the read deadline.
    ///
    /// Takes effect for reads already in progress.
    fn set_read_deadline(&self, deadline: Instant) -> Result<(), TransportError>;

    /// Register the handler invoked when the peer sends a ping.
    ///
    /// Called from the transport's own receive path, independent of
    /// [`Self::receive_message`]. An error returned by the handler is fatal
    /// for the connection.
    fn on_inbound_ping(&self, handler: Arc<dyn ControlHandler>);

    /// Register the handler invoked when the peer sends a pong.
    fn on_inbound_pong(&self, handler: Arc<dyn ControlHandler>);

    /// Local endpoint address.
    fn local_endpoint(&self) -> SocketAddr;
}

/// Callback for inbound control frames.
///
/// One handler may be registered for both signals; `signal` says which one
/// arrived.
#[async_trait]
pub trait ControlHandler: Send + Sync + 'static {
    /// React to an inbound control frame.
    async fn on_control(&self, signal: ControlSignal, payload: Bytes) -> Result<(), TransportError>;
}

//! Connection facade.
//!
//! [`Connection`] is the only entry point that touches the wrapped transport.
//! Construction arms the first read deadline and installs the heartbeat
//! handler; after that:
//!
//! - `write` and `ping` go through the [`WriteSerializer`]
//! - `read` goes straight to the transport (single reader, independent
//!   direction)
//! - inbound ping/pong frames re-arm the read deadline from the transport's
//!   receive path
//!
//! Errors are the transport's own, passed through untouched. There is no
//! retry and no reconnection: once an operation fails with a dead peer the
//! caller builds a new connection over a new transport.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use bytes::Bytes;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{
    config::HeartbeatConfig,
    error::{ConnectionError, TransportError},
    heartbeat::HeartbeatHandler,
    message::{ControlSignal, Message, MessageKind},
    serializer::WriteSerializer,
    transport::{ControlHandler, DuplexTransport},
};

/// State shared by the facade, its clones, and the heartbeat handler.
pub(crate) struct Shared<T> {
    pub(crate) transport: T,
    pub(crate) config: HeartbeatConfig,
    pub(crate) writes: WriteSerializer,
}

/// Liveness-supervised connection over a [`DuplexTransport`].
///
/// Cloning is cheap and yields another handle to the same transport, so
/// several tasks can write concurrently; the write lock keeps their frames
/// whole. Only one task should call [`Connection::read`] at a time.
pub struct Connection<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Connection<T> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl<T: DuplexTransport> Connection<T> {
    /// Wrap an established transport with the given ping wait and default
    /// control timings.
    ///
    /// # Errors
    ///
    /// Returns `Config` for a zero `ping_wait`, or `Transport` if the initial
    /// read deadline cannot be set.
    pub fn new(transport: T, ping_wait: Duration) -> Result<Self, ConnectionError> {
        Self::with_config(transport, HeartbeatConfig::new(ping_wait))
    }

    /// Wrap an established transport with a full heartbeat configuration.
    pub fn with_config(transport: T, config: HeartbeatConfig) -> Result<Self, ConnectionError> {
        config.validate()?;

        let shared = Arc::new(Shared { transport, config, writes: WriteSerializer::new() });

        let deadline = Instant::now() + shared.config.ping_wait;
        shared.transport.set_read_deadline(deadline)?;

        // Weak back-reference: the transport owns the handler, so a strong
        // one would keep the connection alive forever.
        let handler: Arc<dyn ControlHandler> =
            Arc::new(HeartbeatHandler::new(Arc::downgrade(&shared)));
        shared.transport.on_inbound_ping(Arc::clone(&handler));
        shared.transport.on_inbound_pong(handler);

        debug!(
            local = %shared.transport.local_endpoint(),
            ping_wait = ?shared.config.ping_wait,
            "connection supervised"
        );

        Ok(Self { shared })
    }

    /// Send an application message.
    ///
    /// Waits for the write lock, then writes with a deadline of
    /// `now + ping_wait`. A write that misses its deadline fails; it is not
    /// retried.
    pub async fn write(
        &self,
        kind: MessageKind,
        payload: impl Into<Bytes>,
    ) -> Result<(), TransportError> {
        let payload = payload.into();
        let shared = &*self.shared;

        let result = shared
            .writes
            .with_write_lock(|| async move {
                let deadline = Instant::now() + shared.config.ping_wait;
                shared.transport.send_message(kind, payload, deadline).await
            })
            .await;

        if let Err(err) = &result {
            warn!(error = %err, ?kind, "message write failed");
        }
        result
    }

    /// Send a complete [`Message`].
    pub async fn write_message(&self, message: Message) -> Result<(), TransportError> {
        self.write(message.kind, message.payload).await
    }

    /// Receive the next application message.
    ///
    /// Fails with [`TransportError::DeadlineExceeded`] once neither data nor
    /// heartbeat traffic has arrived within the rolling read deadline. Does
    /// not take the write lock.
    pub async fn read(&self) -> Result<Message, TransportError> {
        self.shared.transport.receive_message().await
    }

    /// Probe the peer with a ping.
    ///
    /// Written under the write lock with the short control deadline. The
    /// answering pong is handled by the heartbeat handler, not returned here.
    pub async fn ping(&self) -> Result<(), TransportError> {
        let shared = &*self.shared;

        let result = shared
            .writes
            .with_write_lock(|| async move {
                let deadline = Instant::now() + shared.config.control_deadline;
                shared.transport.send_control(ControlSignal::Ping, Bytes::new(), deadline).await
            })
            .await;

        match &result {
            Ok(()) => debug!("wrote ping"),
            Err(err) => warn!(error = %err, "ping write failed"),
        }
        result
    }

    /// Local endpoint of the wrapped transport.
    pub fn local_address(&self) -> SocketAddr {
        self.shared.transport.local_endpoint()
    }

    /// Configured ping wait.
    pub fn ping_wait(&self) -> Duration {
        self.shared.config.ping_wait
    }

    /// Heartbeat configuration fixed at construction.
    pub fn config(&self) -> &HeartbeatConfig {
        &self.shared.config
    }
}

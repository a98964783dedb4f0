//! Inbound heartbeat handling.
//!
//! Installed on the transport at construction and invoked from its receive
//! path whenever the peer sends a control frame. Both signals re-arm the read
//! deadline; they differ only in the reply and the window:
//!
//! | inbound | reply | new read deadline               |
//! |---------|-------|---------------------------------|
//! | ping    | pong  | receipt + ping_wait             |
//! | pong    | none  | receipt + ping_wait + margin    |
//!
//! The window itself comes from [`HeartbeatConfig::read_window`] so the
//! asymmetric margin lives in exactly one place.
//!
//! [`HeartbeatConfig::read_window`]: crate::HeartbeatConfig::read_window

use std::sync::Weak;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{
    connection::Shared,
    error::TransportError,
    message::ControlSignal,
    transport::{ControlHandler, DuplexTransport},
};

/// Control frame handler bound to one connection.
pub(crate) struct HeartbeatHandler<T> {
    shared: Weak<Shared<T>>,
}

impl<T> HeartbeatHandler<T> {
    pub(crate) fn new(shared: Weak<Shared<T>>) -> Self {
        Self { shared }
    }
}

#[async_trait]
impl<T: DuplexTransport> ControlHandler for HeartbeatHandler<T> {
    async fn on_control(&self, signal: ControlSignal, payload: Bytes) -> Result<(), TransportError> {
        let received_at = Instant::now();

        let Some(shared) = self.shared.upgrade() else {
            debug!(signal = signal.as_str(), "control frame after connection dropped");
            return Err(TransportError::Closed);
        };

        if signal == ControlSignal::Ping {
            debug!("ping received, sending pong");
            reply_pong(&shared, payload).await?;
        }

        let deadline = received_at + shared.config.read_window(signal);
        shared.transport.set_read_deadline(deadline)?;
        debug!(signal = signal.as_str(), ?deadline, "read deadline extended");

        Ok(())
    }
}

/// Answer a ping, echoing its payload.
///
/// RFC 6455 asks for the echo. Some older peers reply with an empty pong
/// instead, and nothing here depends on the payload coming back.
async fn reply_pong<T: DuplexTransport>(
    shared: &Shared<T>,
    payload: Bytes,
) -> Result<(), TransportError> {
    shared
        .writes
        .with_write_lock(|| async move {
            let deadline = Instant::now() + shared.config.control_deadline;
            shared.transport.send_control(ControlSignal::Pong, payload, deadline).await
        })
        .await
        .inspect_err(|err| warn!(error = %err, "pong reply failed"))
}

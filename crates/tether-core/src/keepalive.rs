//! Periodic outbound pings.
//!
//! The heartbeat handler is passive: it only reacts to what the peer sends.
//! [`Keepalive`] is the active half. It pings the peer every
//! [`HeartbeatConfig::ping_interval`] so that the peer's pongs keep our read
//! deadline moving even when no application data flows.
//!
//! The loop stops at the first failed ping. It never reconnects.
//!
//! [`HeartbeatConfig::ping_interval`]: crate::HeartbeatConfig::ping_interval

use tokio::{
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, warn};

use crate::{connection::Connection, error::TransportError, transport::DuplexTransport};

/// Handle to a running keepalive loop.
///
/// Dropping the handle stops the loop.
#[derive(Debug)]
pub struct Keepalive {
    task: Option<JoinHandle<TransportError>>,
}

impl<T: DuplexTransport> Connection<T> {
    /// Start pinging the peer every `ping_interval`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_keepalive(&self) -> Keepalive {
        let connection = self.clone();
        let interval = self.config().ping_interval();

        let task = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if let Err(err) = connection.ping().await {
                    warn!(error = %err, "keepalive stopped");
                    return err;
                }
                debug!(next_in = ?interval, "keepalive ping sent");
            }
        });

        Keepalive { task: Some(task) }
    }
}

impl Keepalive {
    /// Stop the loop.
    pub fn stop(self) {
        drop(self);
    }

    /// Wait for the loop to end on its own and return the ping error that
    /// stopped it.
    ///
    /// Returns `None` if the task was cancelled or panicked.
    pub async fn finished(mut self) -> Option<TransportError> {
        let task = self.task.take()?;
        task.await.ok()
    }

    /// True once the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for Keepalive {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        message::ControlSignal,
        testing::{RecordingTransport, Sent},
    };

    fn pings(transport: &RecordingTransport) -> usize {
        transport
            .writes()
            .into_iter()
            .filter(|(sent, _)| matches!(sent, Sent::Control(ControlSignal::Ping, _)))
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn pings_every_interval() {
        let transport = RecordingTransport::default();
        let conn = Connection::new(transport.clone(), Duration::from_secs(10)).unwrap();

        let keepalive = conn.spawn_keepalive();

        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(pings(&transport), 0);

        time::sleep(Duration::from_secs(14)).await;
        assert_eq!(pings(&transport), 2);
        assert!(!keepalive.is_finished());

        keepalive.stop();
        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(pings(&transport), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_first_failed_ping() {
        let transport = RecordingTransport::default();
        let conn = Connection::new(transport.clone(), Duration::from_secs(10)).unwrap();
        transport.fail_writes();

        let keepalive = conn.spawn_keepalive();
        let error = keepalive.finished().await;

        assert!(matches!(error, Some(TransportError::Closed)));
        assert_eq!(pings(&transport), 0);
    }
}

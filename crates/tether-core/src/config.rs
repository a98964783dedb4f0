//! Heartbeat timing configuration.

use std::time::Duration;

use crate::{error::ConfigError, message::ControlSignal};

/// Heartbeat timing for a [`crate::Connection`].
///
/// Fixed at construction. Changing the cadence means building a new
/// connection over a new transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Base read-deadline window, re-armed on every inbound ping or pong.
    /// Also the write deadline for data messages.
    pub ping_wait: Duration,
    /// Deadline for writing a ping or pong control frame
    pub control_deadline: Duration,
    /// Extra slack added to the read deadline when a pong arrives
    pub pong_margin: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_wait: Duration::from_secs(60),
            control_deadline: Duration::from_secs(1),
            pong_margin: Duration::from_secs(1),
        }
    }
}

impl HeartbeatConfig {
    /// Default configuration with the given ping wait.
    pub fn new(ping_wait: Duration) -> Self {
        Self { ping_wait, ..Default::default() }
    }

    /// Override the control frame write deadline.
    #[must_use]
    pub fn with_control_deadline(mut self, control_deadline: Duration) -> Self {
        self.control_deadline = control_deadline;
        self
    }

    /// Override the pong margin.
    #[must_use]
    pub fn with_pong_margin(mut self, pong_margin: Duration) -> Self {
        self.pong_margin = pong_margin;
        self
    }

    /// Check that the configuration can supervise a connection.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ping_wait.is_zero() {
            return Err(ConfigError::ZeroPingWait);
        }
        if self.control_deadline.is_zero() {
            return Err(ConfigError::ZeroControlDeadline);
        }
        Ok(())
    }

    /// Read-deadline window armed after receiving `signal`.
    ///
    /// A ping is itself proof of liveness and gets exactly `ping_wait`. A pong
    /// answers a probe whose round trip we budget generously, so it gets
    /// `ping_wait + pong_margin`.
    pub fn read_window(&self, signal: ControlSignal) -> Duration {
        match signal {
            ControlSignal::Ping => self.ping_wait,
            ControlSignal::Pong => self.ping_wait + self.pong_margin,
        }
    }

    /// Interval between keepalive pings (9/10 of `ping_wait`).
    ///
    /// Shorter than `ping_wait` so the peer's pong lands before our own read
    /// deadline expires.
    pub fn ping_interval(&self) -> Duration {
        self.ping_wait * 9 / 10
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = HeartbeatConfig::default();
        assert_eq!(config.ping_wait, Duration::from_secs(60));
        assert_eq!(config.control_deadline, Duration::from_secs(1));
        assert_eq!(config.pong_margin, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn pong_window_carries_margin() {
        let config = HeartbeatConfig::new(Duration::from_secs(2));
        assert_eq!(config.read_window(ControlSignal::Ping), Duration::from_secs(2));
        assert_eq!(config.read_window(ControlSignal::Pong), Duration::from_secs(3));

        let config = config.with_pong_margin(Duration::from_millis(250));
        assert_eq!(config.read_window(ControlSignal::Pong), Duration::from_millis(2250));
    }

    #[test]
    fn ping_interval_is_shorter_than_wait() {
        let config = HeartbeatConfig::new(Duration::from_secs(10));
        assert_eq!(config.ping_interval(), Duration::from_secs(9));
    }

    #[test]
    fn rejects_zero_durations() {
        let config = HeartbeatConfig::new(Duration::ZERO);
        assert_eq!(config.validate(), Err(ConfigError::ZeroPingWait));

        let config =
            HeartbeatConfig::new(Duration::from_secs(1)).with_control_deadline(Duration::ZERO);
        assert_eq!(config.validate(), Err(ConfigError::ZeroControlDeadline));
    }
}

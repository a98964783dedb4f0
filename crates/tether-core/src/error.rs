//! Error types for liveness supervision.

use std::io;

use thiserror::Error;

/// Errors produced by a [`crate::DuplexTransport`].
///
/// The connection facade returns these verbatim; it never translates,
/// suppresses or retries them.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection is closed, by either side or by an earlier fatal error
    #[error("connection closed")]
    Closed,

    /// A read or write deadline elapsed
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Underlying I/O failure
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// The peer violated the framing protocol
    #[error("protocol violation: {0}")]
    Protocol(String),
}

impl TransportError {
    /// True if this error is the expiry of a read or write deadline.
    pub fn is_deadline(&self) -> bool {
        matches!(self, Self::DeadlineExceeded)
    }
}

/// Invalid heartbeat configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// `ping_wait` must be non-zero, otherwise every read expires immediately
    #[error("ping wait must be greater than zero")]
    ZeroPingWait,

    /// `control_deadline` must be non-zero, otherwise no ping or pong can be
    /// written
    #[error("control frame deadline must be greater than zero")]
    ZeroControlDeadline,
}

/// Errors raised while constructing a [`crate::Connection`].
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Rejected configuration
    #[error("invalid heartbeat config: {0}")]
    Config(#[from] ConfigError),

    /// Arming the initial read deadline failed
    #[error(transparent)]
    Transport(#[from] TransportError),
}

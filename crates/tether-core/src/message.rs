//! Message and control signal types carried by a duplex transport.

use bytes::Bytes;

/// Kind of an application data message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// UTF-8 text payload
    Text,
    /// Opaque binary payload
    Binary,
}

/// Protocol-level control signal used for liveness probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlSignal {
    /// Liveness probe; the peer answers with [`ControlSignal::Pong`]
    Ping,
    /// Answer to a probe; terminal for that round trip
    Pong,
}

impl ControlSignal {
    /// Lowercase name for log output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Pong => "pong",
        }
    }
}

/// A complete application message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message kind
    pub kind: MessageKind,
    /// Message payload
    pub payload: Bytes,
}

impl Message {
    /// Create a message of the given kind.
    pub fn new(kind: MessageKind, payload: impl Into<Bytes>) -> Self {
        Self { kind, payload: payload.into() }
    }

    /// Create a text message.
    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self::new(MessageKind::Text, payload)
    }

    /// Create a binary message.
    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self::new(MessageKind::Binary, payload)
    }
}

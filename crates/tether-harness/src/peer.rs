//! Frame-level remote peer.
//!
//! Scripts the far end of a connection without any heartbeat handling of its
//! own: tests decide exactly which frames go out and inspect every frame that
//! comes in, control frames included.

use bytes::BytesMut;
use tether_core::{ControlSignal, MessageKind, TransportError};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::codec::{self, Frame};

/// Raw frame endpoint over a byte stream.
pub struct RawPeer<S> {
    stream: S,
}

impl<S> RawPeer<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a byte stream.
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Write one frame.
    pub async fn send(&mut self, frame: &Frame) -> Result<(), TransportError> {
        let mut buf = BytesMut::new();
        frame.encode(&mut buf)?;
        self.stream.write_all(&buf).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Write a ping.
    pub async fn ping(&mut self, payload: &'static [u8]) -> Result<(), TransportError> {
        self.send(&Frame::control(ControlSignal::Ping, payload)).await
    }

    /// Write a pong.
    pub async fn pong(&mut self) -> Result<(), TransportError> {
        self.send(&Frame::control(ControlSignal::Pong, &b""[..])).await
    }

    /// Write a text message.
    pub async fn text(&mut self, text: &'static str) -> Result<(), TransportError> {
        self.send(&Frame::message(MessageKind::Text, text)).await
    }

    /// Read the next frame; `None` once the other side has closed.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>, TransportError> {
        codec::read_frame(&mut self.stream).await
    }

    /// Consume the peer and return the stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

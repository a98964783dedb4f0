//! Minimal message framing.
//!
//! ```text
//! ┌────────┬──────────────────┬─────────────┐
//! │ opcode │ length (u32, BE) │ payload ... │
//! │ 1 byte │ 4 bytes          │ length      │
//! └────────┴──────────────────┴─────────────┘
//! ```
//!
//! Opcodes follow WebSocket numbering. Payloads are capped at 16 MB.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tether_core::{ControlSignal, Message, MessageKind, TransportError};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Frame opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// Text message
    Text = 0x1,
    /// Binary message
    Binary = 0x2,
    /// Ping control frame
    Ping = 0x9,
    /// Pong control frame
    Pong = 0xA,
}

/// What a frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Application data
    Message(MessageKind),
    /// Heartbeat control
    Control(ControlSignal),
}

impl Opcode {
    /// Decode an opcode byte.
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x1 => Some(Self::Text),
            0x2 => Some(Self::Binary),
            0x9 => Some(Self::Ping),
            0xA => Some(Self::Pong),
            _ => None,
        }
    }

    /// Classify as data or control.
    pub fn kind(self) -> FrameKind {
        match self {
            Self::Text => FrameKind::Message(MessageKind::Text),
            Self::Binary => FrameKind::Message(MessageKind::Binary),
            Self::Ping => FrameKind::Control(ControlSignal::Ping),
            Self::Pong => FrameKind::Control(ControlSignal::Pong),
        }
    }
}

impl From<MessageKind> for Opcode {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Text => Self::Text,
            MessageKind::Binary => Self::Binary,
        }
    }
}

impl From<ControlSignal> for Opcode {
    fn from(signal: ControlSignal) -> Self {
        match signal {
            ControlSignal::Ping => Self::Ping,
            ControlSignal::Pong => Self::Pong,
        }
    }
}

/// Framing errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Opcode byte is not one we know
    #[error("unknown opcode {0:#04x}")]
    UnknownOpcode(u8),

    /// Declared payload exceeds [`Frame::MAX_PAYLOAD`]
    #[error("payload of {0} bytes exceeds limit")]
    PayloadTooLarge(usize),
}

impl From<CodecError> for TransportError {
    fn from(err: CodecError) -> Self {
        Self::Protocol(err.to_string())
    }
}

/// One frame on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame opcode
    pub opcode: Opcode,
    /// Frame payload
    pub payload: Bytes,
}

impl Frame {
    /// Header size in bytes.
    pub const HEADER_SIZE: usize = 5;

    /// Largest accepted payload.
    pub const MAX_PAYLOAD: usize = 16 * 1024 * 1024;

    /// Create a frame.
    pub fn new(opcode: Opcode, payload: impl Into<Bytes>) -> Self {
        Self { opcode, payload: payload.into() }
    }

    /// Data frame for a message.
    pub fn message(kind: MessageKind, payload: impl Into<Bytes>) -> Self {
        Self::new(kind.into(), payload)
    }

    /// Control frame.
    pub fn control(signal: ControlSignal, payload: impl Into<Bytes>) -> Self {
        Self::new(signal.into(), payload)
    }

    /// Encoded header for this frame.
    pub fn header(&self) -> Result<[u8; Self::HEADER_SIZE], CodecError> {
        let len = self.payload.len();
        if len > Self::MAX_PAYLOAD {
            return Err(CodecError::PayloadTooLarge(len));
        }

        let mut header = [0u8; Self::HEADER_SIZE];
        header[0] = self.opcode as u8;
        header[1..].copy_from_slice(&(len as u32).to_be_bytes());
        Ok(header)
    }

    /// Append the encoded frame to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), CodecError> {
        let header = self.header()?;
        dst.reserve(header.len() + self.payload.len());
        dst.put_slice(&header);
        dst.put_slice(&self.payload);
        Ok(())
    }

    /// Decode one frame from the front of `src`.
    ///
    /// Returns `Ok(None)` and leaves `src` untouched if the frame is not yet
    /// complete.
    pub fn decode(src: &mut BytesMut) -> Result<Option<Self>, CodecError> {
        if src.len() < Self::HEADER_SIZE {
            return Ok(None);
        }

        let (opcode, len) = parse_header(&src[..Self::HEADER_SIZE])?;
        if src.len() < Self::HEADER_SIZE + len {
            return Ok(None);
        }

        src.advance(Self::HEADER_SIZE);
        let payload = src.split_to(len).freeze();
        Ok(Some(Self { opcode, payload }))
    }

    /// What this frame carries.
    pub fn kind(&self) -> FrameKind {
        self.opcode.kind()
    }

    /// Convert a data frame into a message. Control frames yield `None`.
    pub fn into_message(self) -> Option<Message> {
        match self.opcode.kind() {
            FrameKind::Message(kind) => Some(Message::new(kind, self.payload)),
            FrameKind::Control(_) => None,
        }
    }
}

fn parse_header(header: &[u8]) -> Result<(Opcode, usize), CodecError> {
    let opcode = Opcode::from_u8(header[0]).ok_or(CodecError::UnknownOpcode(header[0]))?;
    let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;
    if len > Frame::MAX_PAYLOAD {
        return Err(CodecError::PayloadTooLarge(len));
    }
    Ok((opcode, len))
}

/// Read one frame from a byte stream.
///
/// Returns `Ok(None)` on a clean end of stream between frames. A stream that
/// ends anywhere inside a frame is a protocol error.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; Frame::HEADER_SIZE];
    match reader.read_exact(&mut header[..1]).await {
        Ok(_) => {},
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    }
    reader.read_exact(&mut header[1..]).await.map_err(|err| {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            TransportError::Protocol("stream ended inside a frame header".to_owned())
        } else {
            err.into()
        }
    })?;

    let (opcode, len) = parse_header(&header)?;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await.map_err(|err| {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            TransportError::Protocol(format!("stream ended inside a {len} byte payload"))
        } else {
            err.into()
        }
    })?;

    Ok(Some(Frame { opcode, payload: payload.into() }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout() {
        let frame = Frame::control(ControlSignal::Pong, &b"abc"[..]);
        assert_eq!(frame.header().unwrap(), [0x0A, 0, 0, 0, 3]);
    }

    #[test]
    fn decode_waits_for_complete_frame() {
        let mut buf = BytesMut::new();
        Frame::message(MessageKind::Text, "hello").encode(&mut buf).unwrap();
        let full = buf.clone();

        let mut partial = BytesMut::from(&full[..full.len() - 1]);
        assert_eq!(Frame::decode(&mut partial).unwrap(), None);
        assert_eq!(partial.len(), full.len() - 1);

        let mut complete = full;
        let frame = Frame::decode(&mut complete).unwrap().unwrap();
        assert_eq!(frame.into_message(), Some(Message::text("hello")));
        assert!(complete.is_empty());
    }

    #[test]
    fn decode_two_back_to_back() {
        let mut buf = BytesMut::new();
        Frame::control(ControlSignal::Ping, Bytes::new()).encode(&mut buf).unwrap();
        Frame::message(MessageKind::Binary, vec![7u8; 3]).encode(&mut buf).unwrap();

        let first = Frame::decode(&mut buf).unwrap().unwrap();
        let second = Frame::decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.kind(), FrameKind::Control(ControlSignal::Ping));
        assert_eq!(second.kind(), FrameKind::Message(MessageKind::Binary));
        assert_eq!(second.payload.as_ref(), &[7, 7, 7]);
    }

    #[test]
    fn rejects_unknown_opcode() {
        let mut buf = BytesMut::from(&[0x3, 0, 0, 0, 0][..]);
        assert_eq!(Frame::decode(&mut buf), Err(CodecError::UnknownOpcode(0x3)));
    }

    #[test]
    fn rejects_oversized_length() {
        let mut buf = BytesMut::from(&[0x2, 0xFF, 0xFF, 0xFF, 0xFF][..]);
        assert!(matches!(Frame::decode(&mut buf), Err(CodecError::PayloadTooLarge(_))));
    }

    #[tokio::test]
    async fn truncated_payload_is_protocol_error() {
        let bytes: &[u8] = &[0x1, 0, 0, 0, 4, b'a'];
        let mut reader = bytes;
        let result = read_frame(&mut reader).await;
        assert!(matches!(result, Err(TransportError::Protocol(_))));
    }

    #[tokio::test]
    async fn truncated_header_is_protocol_error() {
        let mut reader: &[u8] = &[0x1, 0, 0];
        let result = read_frame(&mut reader).await;
        assert!(matches!(result, Err(TransportError::Protocol(_))), "got {result:?}");
    }

    #[tokio::test]
    async fn clean_eof_is_none() {
        let mut reader: &[u8] = &[];
        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }
}

//! Test transports for tether.
//!
//! A real [`DuplexTransport`](tether_core::DuplexTransport) over any pair of
//! async byte streams, plus a frame-level peer for scripting the remote side.
//! Runs over tokio's in-memory pipes for paused-clock tests and over Turmoil's
//! simulated TCP for network tests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
pub mod peer;
pub mod stream_transport;

use std::net::SocketAddr;

use tokio::io::{DuplexStream, WriteHalf};

pub use codec::{CodecError, Frame, FrameKind, Opcode};
pub use peer::RawPeer;
pub use stream_transport::{StreamTransport, WireProbe};

/// Transport over one end of an in-memory pipe.
pub type MemoryTransport = StreamTransport<WriteHalf<DuplexStream>>;

/// Address reported by in-memory transports.
pub const MEMORY_ADDR: SocketAddr = SocketAddr::new(
    std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
    7000,
);

/// A transport wired to a raw frame-level peer over an in-memory pipe.
///
/// `max_buf_size` bounds each direction; a small value makes writes block
/// until the peer reads.
pub fn memory_pair(max_buf_size: usize) -> (MemoryTransport, RawPeer<DuplexStream>) {
    let (local, remote) = tokio::io::duplex(max_buf_size);
    (StreamTransport::from_stream(local, MEMORY_ADDR), RawPeer::new(remote))
}

/// Two transports connected back to back over an in-memory pipe.
pub fn memory_link(max_buf_size: usize) -> (MemoryTransport, MemoryTransport) {
    let (a, b) = tokio::io::duplex(max_buf_size);
    (StreamTransport::from_stream(a, MEMORY_ADDR), StreamTransport::from_stream(b, MEMORY_ADDR))
}

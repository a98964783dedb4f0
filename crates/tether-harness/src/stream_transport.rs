//! [`DuplexTransport`] over a pair of async byte streams.
//!
//! A background receive loop decodes frames as they arrive. Data frames are
//! queued for [`DuplexTransport::receive_message`]; ping and pong frames go
//! straight to the registered [`ControlHandler`], independent of whether
//! anyone is reading. A handler error is fatal: the loop stops and the error
//! is the last thing the reader sees.
//!
//! Like a typical socket-backed transport this type does not make concurrent
//! writers safe. A frame is written as two chunks (header, then payload) and
//! another writer can get in between. [`WireProbe`] counts overlapping writes
//! so tests can see whether something above serialized them.
//!
//! Both deadlines are final once they fire. An expired read deadline fails
//! every later read, refuses re-arming, and stops control frame dispatch. A
//! failed write may have left half a frame on the wire, so every later write
//! fails with [`TransportError::Closed`].

use std::{
    net::SocketAddr,
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use tether_core::{
    ControlHandler, ControlSignal, DuplexTransport, Message, MessageKind, TransportError,
};
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf},
    sync::{Mutex, mpsc, watch},
    task::JoinHandle,
    time::{self, Instant},
};
use tracing::{debug, trace};

use crate::codec::{self, Frame, FrameKind};

/// Inbound data messages buffered ahead of the reader.
const INBOUND_CAPACITY: usize = 64;

/// Stand-in for "no deadline".
fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86400 * 365 * 30)
}

type HandlerSlot = RwLock<Option<Arc<dyn ControlHandler>>>;

#[derive(Default)]
struct Handlers {
    ping: HandlerSlot,
    pong: HandlerSlot,
}

impl Handlers {
    fn slot(&self, signal: ControlSignal) -> &HandlerSlot {
        match signal {
            ControlSignal::Ping => &self.ping,
            ControlSignal::Pong => &self.pong,
        }
    }

    fn get(&self, signal: ControlSignal) -> Option<Arc<dyn ControlHandler>> {
        self.slot(signal).read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set(&self, signal: ControlSignal, handler: Arc<dyn ControlHandler>) {
        *self.slot(signal).write().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }
}

#[derive(Debug, Default)]
struct WriteCounters {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    frames: AtomicUsize,
}

/// Rolling read deadline shared with the receive loop.
struct ReadDeadline {
    armed: watch::Sender<Instant>,
    expired: AtomicBool,
}

impl ReadDeadline {
    fn new() -> Self {
        let (armed, _) = watch::channel(far_future());
        Self { armed, expired: AtomicBool::new(false) }
    }

    /// Fail if the deadline has passed, latching the expiry.
    fn check(&self) -> Result<(), TransportError> {
        if self.expired.load(Ordering::SeqCst) || *self.armed.borrow() <= Instant::now() {
            self.expired.store(true, Ordering::SeqCst);
            return Err(TransportError::DeadlineExceeded);
        }
        Ok(())
    }
}

/// Marks one write as in flight until dropped.
struct Writing<'a>(&'a WriteCounters);

impl<'a> Writing<'a> {
    fn enter(counters: &'a WriteCounters) -> Self {
        let now = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        counters.peak.fetch_max(now, Ordering::SeqCst);
        Self(counters)
    }
}

impl Drop for Writing<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Read-only view of a transport's write activity and read deadline.
///
/// Stays usable after the transport has been moved into a connection.
#[derive(Debug, Clone)]
pub struct WireProbe {
    writes: Arc<WriteCounters>,
    read_deadline: watch::Receiver<Instant>,
}

impl WireProbe {
    /// Largest number of writes that were ever in flight at once.
    pub fn peak_concurrent_writes(&self) -> usize {
        self.writes.peak.load(Ordering::SeqCst)
    }

    /// Frames fully written so far.
    pub fn frames_written(&self) -> usize {
        self.writes.frames.load(Ordering::SeqCst)
    }

    /// Current read deadline.
    pub fn read_deadline(&self) -> Instant {
        *self.read_deadline.borrow()
    }
}

/// Message transport over async byte streams.
pub struct StreamTransport<W> {
    writer: Mutex<W>,
    inbound: Mutex<mpsc::Receiver<Result<Message, TransportError>>>,
    read_deadline: Arc<ReadDeadline>,
    handlers: Arc<Handlers>,
    writes: Arc<WriteCounters>,
    broken: AtomicBool,
    local: SocketAddr,
    receive_loop: JoinHandle<()>,
}

impl<S> StreamTransport<WriteHalf<S>>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Split a bidirectional stream and wrap both halves.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_stream(stream: S, local: SocketAddr) -> Self {
        let (reader, writer): (ReadHalf<S>, WriteHalf<S>) = tokio::io::split(stream);
        Self::new(reader, writer, local)
    }
}

impl<W> StreamTransport<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Wrap separate read and write halves and start the receive loop.
    ///
    /// No read deadline is armed until [`DuplexTransport::set_read_deadline`]
    /// is called.
    pub fn new<R>(reader: R, writer: W, local: SocketAddr) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        let handlers = Arc::new(Handlers::default());
        let read_deadline = Arc::new(ReadDeadline::new());
        let receive_loop = tokio::spawn(receive_loop(
            reader,
            tx,
            Arc::clone(&handlers),
            Arc::clone(&read_deadline),
        ));

        Self {
            writer: Mutex::new(writer),
            inbound: Mutex::new(rx),
            read_deadline,
            handlers,
            writes: Arc::new(WriteCounters::default()),
            broken: AtomicBool::new(false),
            local,
            receive_loop,
        }
    }

    /// Observer for writes and the read deadline.
    pub fn probe(&self) -> WireProbe {
        WireProbe {
            writes: Arc::clone(&self.writes),
            read_deadline: self.read_deadline.armed.subscribe(),
        }
    }

    async fn write_frame(&self, frame: Frame, deadline: Instant) -> Result<(), TransportError> {
        let header = frame.header()?;
        if self.broken.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let _writing = Writing::enter(&self.writes);

        let written = time::timeout_at(deadline, async {
            self.write_chunk(&header).await?;
            tokio::task::yield_now().await;
            self.write_chunk(&frame.payload).await
        })
        .await;

        match written {
            Ok(Ok(())) => {
                self.writes.frames.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            Ok(Err(err)) => {
                self.broken.store(true, Ordering::SeqCst);
                Err(err.into())
            },
            Err(_elapsed) => {
                self.broken.store(true, Ordering::SeqCst);
                Err(TransportError::DeadlineExceeded)
            },
        }
    }

    async fn write_chunk(&self, chunk: &[u8]) -> std::io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(chunk).await?;
        writer.flush().await
    }
}

#[async_trait]
impl<W> DuplexTransport for StreamTransport<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn send_message(
        &self,
        kind: MessageKind,
        payload: Bytes,
        deadline: Instant,
    ) -> Result<(), TransportError> {
        self.write_frame(Frame::message(kind, payload), deadline).await
    }

    async fn send_control(
        &self,
        signal: ControlSignal,
        payload: Bytes,
        deadline: Instant,
    ) -> Result<(), TransportError> {
        self.write_frame(Frame::control(signal, payload), deadline).await
    }

    async fn receive_message(&self) -> Result<Message, TransportError> {
        self.read_deadline.check()?;

        let mut inbound = self.inbound.lock().await;
        let mut deadline = self.read_deadline.armed.subscribe();

        loop {
            let armed = *deadline.borrow_and_update();

            tokio::select! {
                biased;

                () = time::sleep_until(armed) => {
                    // Re-armed while we slept: go around with the new value
                    self.read_deadline.check()?;
                },
                received = inbound.recv() => {
                    return received.unwrap_or(Err(TransportError::Closed));
                },
                changed = deadline.changed() => {
                    if changed.is_err() {
                        return Err(TransportError::Closed);
                    }
                },
            }
        }
    }

    fn set_read_deadline(&self, deadline: Instant) -> Result<(), TransportError> {
        self.read_deadline.check()?;
        self.read_deadline.armed.send_replace(deadline);
        Ok(())
    }

    fn on_inbound_ping(&self, handler: Arc<dyn ControlHandler>) {
        self.handlers.set(ControlSignal::Ping, handler);
    }

    fn on_inbound_pong(&self, handler: Arc<dyn ControlHandler>) {
        self.handlers.set(ControlSignal::Pong, handler);
    }

    fn local_endpoint(&self) -> SocketAddr {
        self.local
    }
}

impl<W> Drop for StreamTransport<W> {
    fn drop(&mut self) {
        self.receive_loop.abort();
    }
}

async fn receive_loop<R>(
    mut reader: R,
    inbound: mpsc::Sender<Result<Message, TransportError>>,
    handlers: Arc<Handlers>,
    read_deadline: Arc<ReadDeadline>,
) where
    R: AsyncRead + Unpin,
{
    let failure = loop {
        let frame = match codec::read_frame(&mut reader).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break TransportError::Closed,
            Err(err) => break err,
        };

        match frame.kind() {
            FrameKind::Message(kind) => {
                let message = Message::new(kind, frame.payload);
                if inbound.send(Ok(message)).await.is_err() {
                    // Transport dropped
                    return;
                }
            },
            FrameKind::Control(signal) => {
                // A heartbeat arriving after expiry does not revive the link
                if let Err(err) = read_deadline.check() {
                    break err;
                }
                let Some(handler) = handlers.get(signal) else {
                    trace!(signal = signal.as_str(), "no handler, dropping control frame");
                    continue;
                };
                if let Err(err) = handler.on_control(signal, frame.payload).await {
                    break err;
                }
            },
        }
    };

    debug!(error = %failure, "receive loop stopped");
    let _ = inbound.send(Err(failure)).await;
}

//! Recording transport for unit tests.

use std::{
    collections::VecDeque,
    net::SocketAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::Instant;

use crate::{
    error::TransportError,
    message::{ControlSignal, Message, MessageKind},
    transport::{ControlHandler, DuplexTransport},
};

/// A frame handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Sent {
    Message(MessageKind, Bytes),
    Control(ControlSignal, Bytes),
}

/// Everything the connection did to the transport, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    Write { sent: Sent, deadline: Instant },
    ReadDeadline(Instant),
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<Event>>,
    inbound: Mutex<VecDeque<Message>>,
    ping_handler: Mutex<Option<Arc<dyn ControlHandler>>>,
    pong_handler: Mutex<Option<Arc<dyn ControlHandler>>>,
    fail_writes: AtomicBool,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// In-memory transport that records writes and deadlines.
///
/// Clones share state, so a test can keep a handle after moving one into a
/// connection.
#[derive(Clone, Default)]
pub(crate) struct RecordingTransport {
    inner: Arc<Recorder>,
}

impl RecordingTransport {
    pub(crate) const LOCAL: &'static str = "127.0.0.1:4000";

    pub(crate) fn events(&self) -> Vec<Event> {
        self.inner.events.lock().unwrap().clone()
    }

    pub(crate) fn writes(&self) -> Vec<(Sent, Instant)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Write { sent, deadline } => Some((sent, deadline)),
                Event::ReadDeadline(_) => None,
            })
            .collect()
    }

    pub(crate) fn read_deadline(&self) -> Option<Instant> {
        self.events().into_iter().rev().find_map(|event| match event {
            Event::ReadDeadline(deadline) => Some(deadline),
            Event::Write { .. } => None,
        })
    }

    pub(crate) fn fail_writes(&self) {
        self.inner.fail_writes.store(true, Ordering::SeqCst);
    }

    pub(crate) fn push_inbound(&self, message: Message) {
        self.inner.inbound.lock().unwrap().push_back(message);
    }

    pub(crate) fn peak_in_flight(&self) -> usize {
        self.inner.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Deliver a control frame the way a receive loop would.
    pub(crate) async fn inject(
        &self,
        signal: ControlSignal,
        payload: &'static [u8],
    ) -> Result<(), TransportError> {
        let slot = match signal {
            ControlSignal::Ping => &self.inner.ping_handler,
            ControlSignal::Pong => &self.inner.pong_handler,
        };
        let handler = slot.lock().unwrap().clone().expect("handler registered");
        handler.on_control(signal, Bytes::from_static(payload)).await
    }

    async fn record_write(&self, sent: Sent, deadline: Instant) -> Result<(), TransportError> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        let now = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        // Give other writers a chance to overlap if nothing serializes them
        tokio::task::yield_now().await;
        self.inner.events.lock().unwrap().push(Event::Write { sent, deadline });
        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl DuplexTransport for RecordingTransport {
    async fn send_message(
        &self,
        kind: MessageKind,
        payload: Bytes,
        deadline: Instant,
    ) -> Result<(), TransportError> {
        self.record_write(Sent::Message(kind, payload), deadline).await
    }

    async fn send_control(
        &self,
        signal: ControlSignal,
        payload: Bytes,
        deadline: Instant,
    ) -> Result<(), TransportError> {
        self.record_write(Sent::Control(signal, payload), deadline).await
    }

    async fn receive_message(&self) -> Result<Message, TransportError> {
        loop {
            let next = self.inner.inbound.lock().unwrap().pop_front();
            if let Some(message) = next {
                return Ok(message);
            }
            let deadline = self.read_deadline().ok_or(TransportError::Closed)?;
            if Instant::now() >= deadline {
                return Err(TransportError::DeadlineExceeded);
            }
            // Re-check regularly so re-armed deadlines are observed
            let step = Instant::now() + std::time::Duration::from_millis(10);
            tokio::time::sleep_until(deadline.min(step)).await;
        }
    }

    fn set_read_deadline(&self, deadline: Instant) -> Result<(), TransportError> {
        self.inner.events.lock().unwrap().push(Event::ReadDeadline(deadline));
        Ok(())
    }

    fn on_inbound_ping(&self, handler: Arc<dyn ControlHandler>) {
        *self.inner.ping_handler.lock().unwrap() = Some(handler);
    }

    fn on_inbound_pong(&self, handler: Arc<dyn ControlHandler>) {
        *self.inner.pong_handler.lock().unwrap() = Some(handler);
    }

    fn local_endpoint(&self) -> SocketAddr {
        Self::LOCAL.parse().unwrap()
    }
}

//! Event sink port
//!
//! The client side of the event stream. The transport layer (socket, console,
//! test harness) implements [`EventSink`]; the multiplexer awaits each `send`
//! before pulling the next event, so a slow sink applies back-pressure all the
//! way to the running session.

use async_trait::async_trait;
use reagent_domain::EventRecord;
use thiserror::Error;
use tokio::sync::mpsc;

/// The subscriber went away; no further records can be delivered.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("event subscriber disconnected")]
pub struct SinkClosed;

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send(&self, record: EventRecord) -> Result<(), SinkClosed>;
}

/// Bounded-channel sink. The receiving half belongs to the transport.
pub struct ChannelEventSink {
    tx: mpsc::Sender<EventRecord>,
}

impl ChannelEventSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<EventRecord>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventSink for ChannelEventSink {
    async fn send(&self, record: EventRecord) -> Result<(), SinkClosed> {
        self.tx.send(record).await.map_err(|_| SinkClosed)
    }
}

//! Lazy, cancellable event sequence of one run

use futures::Stream;
use reagent_domain::AgentEvent;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Events of one run, in emission order, ending with a terminal event.
///
/// The run pauses whenever the bounded channel behind this stream is full,
/// so a consumer that stops pulling stops the run at its next emission.
/// Dropping the stream cancels the run.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::Receiver<AgentEvent>,
    cancel: CancellationToken,
    finished: bool,
}

impl EventStream {
    pub(crate) fn new(rx: mpsc::Receiver<AgentEvent>, cancel: CancellationToken) -> Self {
        Self {
            rx,
            cancel,
            finished: false,
        }
    }

    /// Next event, or `None` after the terminal event.
    pub async fn next_event(&mut self) -> Option<AgentEvent> {
        if self.finished {
            return None;
        }
        let event = self.rx.recv().await;
        match &event {
            Some(e) if e.is_terminal() => self.finished = true,
            None => self.finished = true,
            _ => {}
        }
        event
    }

    /// Ask the run to stop. The run still ends with a terminal event.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this run; can be handed to another task.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drain the stream to its terminal event.
    pub async fn collect(mut self) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event().await {
            events.push(event);
        }
        events
    }
}

impl Stream for EventStream {
    type Item = AgentEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        let polled = self.rx.poll_recv(cx);
        match &polled {
            Poll::Ready(Some(e)) if e.is_terminal() => self.finished = true,
            Poll::Ready(None) => self.finished = true,
            _ => {}
        }
        polled
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        if !self.finished {
            self.cancel.cancel();
        }
    }
}

//! Event stream multiplexer: forwards one run at a time to one subscriber.
//!
//! Each event becomes an [`EventRecord`] stamped with a per-connection
//! sequence number. The next event is only pulled once the sink accepted the
//! previous one, so a slow subscriber pauses the run instead of growing a
//! buffer. When the subscriber goes away the run is cancelled and drained to
//! its terminal event without delivering anything further.

use crate::ports::event_sink::EventSink;
use crate::use_cases::agent_session::EventStream;
use reagent_domain::{AgentEvent, EventRecord};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

/// What happened to one forwarded run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Records the subscriber accepted.
    pub delivered: usize,
    /// The run's terminal event, whether or not it was delivered.
    pub terminal: Option<AgentEvent>,
    /// The subscriber disconnected before the run ended.
    pub subscriber_lost: bool,
}

impl RunSummary {
    /// The final answer, if the run produced one.
    pub fn answer(&self) -> Option<&str> {
        match &self.terminal {
            Some(AgentEvent::FinalAnswer { text }) => Some(text),
            _ => None,
        }
    }
}

pub struct EventMultiplexer {
    sink: Arc<dyn EventSink>,
    seq: AtomicU64,
    /// Held for the duration of one run.
    active: tokio::sync::Mutex<()>,
}

impl EventMultiplexer {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            sink,
            seq: AtomicU64::new(0),
            active: tokio::sync::Mutex::new(()),
        }
    }

    /// Sequence number the next record will carry.
    pub fn next_seq(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }

    /// Forward `stream` to the sink until its terminal event.
    ///
    /// A second run handed over while one is being forwarded waits its turn.
    pub async fn forward(&self, mut stream: EventStream) -> RunSummary {
        let _active = self.active.lock().await;
        let mut summary = RunSummary::default();

        while let Some(event) = stream.next_event().await {
            if event.is_terminal() {
                summary.terminal = Some(event.clone());
            }
            if summary.subscriber_lost {
                trace!(event = event.type_tag(), "Discarding event after disconnect");
                continue;
            }

            let record = EventRecord::from_event(self.seq.fetch_add(1, Ordering::SeqCst), &event);
            match self.sink.send(record).await {
                Ok(()) => summary.delivered += 1,
                Err(_) => {
                    debug!(delivered = summary.delivered, "Subscriber disconnected, cancelling run");
                    summary.subscriber_lost = true;
                    stream.cancel();
                }
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeParams;
    use crate::ports::conversation_logger::NoConversationLogger;
    use crate::ports::event_sink::ChannelEventSink;
    use crate::ports::model_backend::ModelBackend;
    use crate::use_cases::agent_session::AgentSession;
    use crate::use_cases::resolve_tools::ToolResolver;
    use crate::use_cases::test_support::{
        MockFactory, RecordingSink, Scripted, ScriptedBackend, snapshot_of, text_turn, tool_turn,
    };
    use reagent_domain::{ErrorKind, SessionStatus};
    use std::time::Duration;

    async fn session(script: Vec<Scripted>) -> Arc<AgentSession> {
        let factory = Arc::new(
            MockFactory::new()
                .with_source("flash-calc", &["pt_flash", "slow_flash"])
                .call_delay("slow_flash", Duration::from_millis(50)),
        );
        let params = RuntimeParams::default();
        let session = AgentSession::new(
            Arc::new(ScriptedBackend::new(script)) as Arc<dyn ModelBackend>,
            ToolResolver::new(factory, &params),
            params,
            false,
            Arc::new(NoConversationLogger),
        );
        session
            .reconfigure(&snapshot_of(&[("flash-calc", true)]))
            .await
            .unwrap();
        session
    }

    #[tokio::test]
    async fn records_are_sequenced_across_runs() {
        let session = session(vec![
            tool_turn("thinking", &[("a", "flash-calc/slow_flash"), ("b", "flash-calc/pt_flash")]),
            text_turn("first"),
            text_turn("second"),
        ])
        .await;
        let sink = Arc::new(RecordingSink::new());
        let mux = EventMultiplexer::new(Arc::clone(&sink) as Arc<dyn EventSink>);

        let first = mux.forward(session.submit("one").unwrap()).await;
        let second = mux.forward(session.submit("two").unwrap()).await;

        assert_eq!(first.answer(), Some("first"));
        assert_eq!(second.answer(), Some("second"));
        assert_eq!(
            sink.types(),
            vec![
                "reasoning",
                "tool_call_started",
                "tool_call_started",
                "tool_call_finished",
                "tool_call_finished",
                "final_answer",
                "final_answer",
            ]
        );
        let records = sink.records();
        let seqs: Vec<_> = records.iter().map(|r| r.seq).collect();
        assert_eq!(seqs, (0..7).collect::<Vec<_>>());
        assert_eq!(records[3].call_id.as_deref(), Some("a"));
        assert_eq!(records[4].call_id.as_deref(), Some("b"));
        assert_eq!(mux.next_seq(), 7);
    }

    #[tokio::test]
    async fn slow_subscriber_receives_everything() {
        let session = session(vec![
            tool_turn("", &[("a", "flash-calc/pt_flash"), ("b", "flash-calc/pt_flash")]),
            text_turn("done"),
        ])
        .await;
        let sink = Arc::new(RecordingSink::slow(Duration::from_millis(20)));
        let mux = EventMultiplexer::new(Arc::clone(&sink) as Arc<dyn EventSink>);

        let summary = mux.forward(session.submit("go").unwrap()).await;

        assert_eq!(summary.delivered, 5);
        assert!(!summary.subscriber_lost);
        assert_eq!(sink.records().last().map(|r| r.is_terminal()), Some(true));
    }

    #[tokio::test]
    async fn lost_subscriber_cancels_the_run() {
        let session = session(vec![
            tool_turn("", &[("a", "flash-calc/slow_flash")]),
            Scripted::Hang,
        ])
        .await;
        let sink = Arc::new(RecordingSink::closing_after(1));
        let mux = EventMultiplexer::new(Arc::clone(&sink) as Arc<dyn EventSink>);

        let summary = tokio::time::timeout(
            Duration::from_secs(2),
            mux.forward(session.submit("go").unwrap()),
        )
        .await
        .unwrap();

        assert!(summary.subscriber_lost);
        assert_eq!(summary.delivered, 1);
        assert_eq!(summary.terminal, Some(AgentEvent::cancelled()));
        assert_eq!(session.status(), SessionStatus::Idle);
    }

    #[tokio::test]
    async fn explicit_cancel_yields_cancelled_terminal() {
        let session = session(vec![Scripted::Hang]).await;
        let (sink, mut rx) = ChannelEventSink::new(8);
        let mux = EventMultiplexer::new(Arc::new(sink));

        let stream = session.submit("go").unwrap();
        let cancel = stream.cancellation_token();
        let forwarding = tokio::spawn(async move { mux.forward(stream).await });
        cancel.cancel();

        let summary = forwarding.await.unwrap();
        let record = rx.recv().await.unwrap();
        assert_eq!(record.event_type, "session_error");
        assert_eq!(record.payload["kind"], serde_json::json!(ErrorKind::Cancelled));
        assert_eq!(summary.answer(), None);
    }
}

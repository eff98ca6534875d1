//! Committed event stream
//!
//! Produced only after the transport has committed to an event stream. The
//! model is opened on first poll, each non-empty increment becomes a
//! [`StreamEvent::TextDelta`], and exactly one terminal event follows.
//! Dropping the stream drops the model-side stream with it.

use super::lifecycle::{ChatPhase, RequestLifecycle};
use crate::context::ConversationSeed;
use crate::errors::AppError;
use crate::llm::{ModelProvider, TextStream};
use crate::metrics;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    TextDelta(String),
    Done,
    /// Mid-stream failure; carries the cause
    Error(String),
}

impl StreamEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::TextDelta(_) => "text",
            StreamEvent::Done => "done",
            StreamEvent::Error(_) => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::TextDelta(_))
    }

    /// JSON body of the event as sent on the wire
    pub fn payload(&self) -> Value {
        match self {
            StreamEvent::TextDelta(text) => json!({ "text": text }),
            StreamEvent::Done => json!({ "done": true }),
            StreamEvent::Error(message) => json!({ "error": message }),
        }
    }
}

pub type EventStream = BoxStream<'static, StreamEvent>;

enum StreamState {
    Pending {
        model: Arc<dyn ModelProvider>,
        seed: ConversationSeed,
        query: String,
        lifecycle: RequestLifecycle,
    },
    Open {
        upstream: TextStream,
        lifecycle: RequestLifecycle,
    },
    Finished,
}

/// Event stream for a committed request; `lifecycle` must already be committed
pub(crate) fn committed_stream(
    model: Arc<dyn ModelProvider>,
    seed: ConversationSeed,
    query: String,
    lifecycle: RequestLifecycle,
) -> EventStream {
    let initial = StreamState::Pending {
        model,
        seed,
        query,
        lifecycle,
    };

    stream::unfold(initial, |state| async move {
        match state {
            StreamState::Pending {
                model,
                seed,
                query,
                mut lifecycle,
            } => {
                if let Err(e) = lifecycle.advance(ChatPhase::ModelCall) {
                    return Some(fail(e, lifecycle));
                }

                let start = Instant::now();
                let opened = model.generate_stream(&seed, &query).await;
                metrics::record_model_call(
                    start.elapsed().as_secs_f64(),
                    model.model_name(),
                    lifecycle.mode().as_str(),
                    opened.is_ok(),
                );

                match opened {
                    Ok(upstream) => {
                        if let Err(e) = lifecycle.advance(ChatPhase::Streaming) {
                            return Some(fail(e, lifecycle));
                        }
                        next_event(upstream, lifecycle).await
                    }
                    Err(e) => Some(fail(e, lifecycle)),
                }
            }
            StreamState::Open {
                upstream,
                lifecycle,
            } => next_event(upstream, lifecycle).await,
            StreamState::Finished => None,
        }
    })
    .inspect(|event| metrics::record_stream_event(event.kind()))
    .fuse()
    .boxed()
}

async fn next_event(
    mut upstream: TextStream,
    mut lifecycle: RequestLifecycle,
) -> Option<(StreamEvent, StreamState)> {
    loop {
        match upstream.next().await {
            Some(Ok(text)) if text.is_empty() => continue,
            Some(Ok(text)) => {
                return Some((StreamEvent::TextDelta(text), StreamState::Open { upstream, lifecycle }))
            }
            Some(Err(e)) => {
                drop(upstream);
                return Some(fail(e, lifecycle));
            }
            None => {
                debug!("Model stream finished");
                return Some(match lifecycle.complete() {
                    Ok(()) => (StreamEvent::Done, StreamState::Finished),
                    Err(e) => fail(e, lifecycle),
                });
            }
        }
    }
}

fn fail(error: AppError, mut lifecycle: RequestLifecycle) -> (StreamEvent, StreamState) {
    let error = lifecycle.fail(error);
    (StreamEvent::Error(error.to_string()), StreamState::Finished)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ResponseMode;
    use crate::context::PromptComposer;
    use crate::llm::ScriptedModel;

    fn committed_lifecycle() -> RequestLifecycle {
        let mut lifecycle = RequestLifecycle::new(ResponseMode::Streaming);
        lifecycle.advance(ChatPhase::Retrieving).unwrap();
        lifecycle.advance(ChatPhase::Composing).unwrap();
        lifecycle.commit().unwrap();
        lifecycle
    }

    async fn run(model: ScriptedModel) -> (Vec<StreamEvent>, Arc<ScriptedModel>) {
        let model = Arc::new(model);
        let seed = PromptComposer::default().compose("ctx").unwrap();
        let events = committed_stream(model.clone(), seed, "q".to_string(), committed_lifecycle())
            .collect()
            .await;
        (events, model)
    }

    fn assert_single_terminal_at_end(events: &[StreamEvent]) {
        let terminals: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_terminal())
            .map(|(i, _)| i)
            .collect();
        assert_eq!(terminals, vec![events.len() - 1]);
    }

    #[tokio::test]
    async fn test_increments_in_order_then_done() {
        let (events, _) = run(ScriptedModel::new(["Day 1: ", "", "Amber Fort. ", "Day 2: ..."])).await;
        assert_eq!(
            events,
            vec![
                StreamEvent::TextDelta("Day 1: ".to_string()),
                StreamEvent::TextDelta("Amber Fort. ".to_string()),
                StreamEvent::TextDelta("Day 2: ...".to_string()),
                StreamEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_at_every_point_ends_with_one_error() {
        let chunks = ["a", "b", "c", "d"];
        for fail_at in 0..=chunks.len() {
            let (events, _) =
                run(ScriptedModel::new(chunks).failing_after(fail_at, "connection reset")).await;

            assert_eq!(events.len(), fail_at + 1);
            assert_single_terminal_at_end(&events);
            match events.last() {
                Some(StreamEvent::Error(message)) => assert!(message.contains("connection reset")),
                other => panic!("expected error event, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_open_failure_is_error_event() {
        let (events, model) = run(ScriptedModel::failing_on_open("quota exhausted")).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], StreamEvent::Error(m) if m.contains("quota exhausted")));
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn test_model_not_called_until_polled() {
        let model = Arc::new(ScriptedModel::new(["x"]));
        let seed = PromptComposer::default().compose("ctx").unwrap();
        let mut events =
            committed_stream(model.clone(), seed, "q".to_string(), committed_lifecycle());
        assert_eq!(model.calls(), 0);

        assert_eq!(events.next().await, Some(StreamEvent::TextDelta("x".to_string())));
        assert_eq!(model.calls(), 1);

        // caller goes away before the terminal event
        drop(events);
    }

    #[tokio::test]
    async fn test_nothing_after_terminal() {
        let (events, _) = run(ScriptedModel::new(["only"])).await;
        assert_single_terminal_at_end(&events);

        let model = Arc::new(ScriptedModel::new(["x"]));
        let seed = PromptComposer::default().compose("ctx").unwrap();
        let mut stream = committed_stream(model, seed, "q".to_string(), committed_lifecycle());
        while stream.next().await.is_some() {}
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn test_payloads() {
        assert_eq!(
            StreamEvent::TextDelta("hi".to_string()).payload(),
            json!({ "text": "hi" })
        );
        assert_eq!(StreamEvent::Done.payload(), json!({ "done": true }));
        assert_eq!(
            StreamEvent::Error("boom".to_string()).payload(),
            json!({ "error": "boom" })
        );
    }
}

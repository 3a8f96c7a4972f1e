// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Transparent stream interception.
//!
//! [`CapturedStream`] forwards every item of the wrapped stream unchanged,
//! one inner poll per outer poll, while accumulating what it sees. When the
//! stream ends, fails or is dropped, the accumulated result is handed to a
//! finalizer exactly once.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures::Stream;
use serde_json::json;
use tracing::warn;

use super::chunk::{ChatDelta, ChunkShape, ChunkView, MessageEvent, ResponseEvent, ToolCallStart};
use crate::capture::{classify, panic_message, CallMeta, CallOutput, Failure, FailureKind};
use crate::types::TokenUsage;

/// Lifecycle of a captured stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    /// Created, not yet polled.
    Idle,
    /// At least one poll has happened.
    Streaming,
    /// The inner stream ended.
    Completed,
    /// The inner stream yielded an error or was dropped early.
    Failed,
}

impl StreamPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// What the stream produced, handed to the finalizer once.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSummary {
    /// The aggregate response.
    pub output: CallOutput,
    /// Set when the stream failed or its aggregate classifies as a failure.
    pub failure: Option<Failure>,
    pub meta: CallMeta,
}

/// Callback run once when a captured stream reaches a terminal state.
pub type Finalizer = Box<dyn FnOnce(StreamSummary) + Send + 'static>;

#[derive(Debug, Default)]
struct Accumulator {
    text: String,
    usage: Option<TokenUsage>,
    finish_reason: Option<String>,
    status: Option<String>,
    error_message: Option<String>,
    tool_calls: Vec<ToolCallStart>,
    chunks: u64,
    first_token: Option<Duration>,
}

impl Accumulator {
    fn usage_mut(&mut self) -> &mut TokenUsage {
        self.usage.get_or_insert_with(TokenUsage::default)
    }

    fn absorb(&mut self, shape: ChunkShape, elapsed: Duration) {
        self.chunks += 1;
        if let Some(text) = shape.text() {
            if !text.is_empty() && self.first_token.is_none() {
                self.first_token = Some(elapsed);
            }
            self.text.push_str(text);
        }

        match shape {
            ChunkShape::ChatDelta(ChatDelta {
                finish_reason,
                usage,
                tool_calls,
                ..
            }) => {
                if finish_reason.is_some() {
                    self.finish_reason = finish_reason;
                }
                if usage.is_some() {
                    self.usage = usage;
                }
                self.tool_calls.extend(tool_calls);
            }
            ChunkShape::ResponseEvent(event) => match event {
                ResponseEvent::Completed { status, usage } => {
                    if status.is_some() {
                        self.status = status;
                    }
                    if usage.is_some() {
                        self.usage = usage;
                    }
                }
                ResponseEvent::Failed { message } => {
                    self.status = Some("failed".to_string());
                    self.error_message = message;
                }
                ResponseEvent::Incomplete { reason } => {
                    self.status = Some("incomplete".to_string());
                    self.finish_reason = reason;
                }
                ResponseEvent::Created
                | ResponseEvent::OutputTextDelta(_)
                | ResponseEvent::Other(_) => {}
            },
            ChunkShape::MessageEvent(event) => match event {
                MessageEvent::Start { input_tokens } => {
                    if let Some(tokens) = input_tokens {
                        self.usage_mut().input_tokens = tokens;
                    }
                }
                MessageEvent::ToolUseStart(call) => self.tool_calls.push(call),
                MessageEvent::Delta {
                    stop_reason,
                    output_tokens,
                } => {
                    if stop_reason.is_some() {
                        self.finish_reason = stop_reason;
                    }
                    if let Some(tokens) = output_tokens {
                        self.usage_mut().output_tokens = tokens;
                    }
                }
                MessageEvent::Error(message) => {
                    self.status = Some("error".to_string());
                    self.error_message = Some(message);
                }
                MessageEvent::ContentDelta(_) | MessageEvent::Stop | MessageEvent::Other(_) => {}
            },
            ChunkShape::Unknown => {}
        }
    }

    fn output(&self) -> CallOutput {
        CallOutput {
            content: self.text.clone(),
            finish_reason: self.finish_reason.clone(),
            status: self.status.clone(),
            tool_calls: self
                .tool_calls
                .iter()
                .map(|call| json!({"id": call.id, "name": call.name}))
                .collect(),
            usage: self.usage.clone(),
        }
    }
}

/// A stream wrapper that captures what flows through it.
pub struct CapturedStream<S> {
    inner: S,
    phase: StreamPhase,
    acc: Accumulator,
    started: Instant,
    finalizer: Option<Finalizer>,
}

impl<S> CapturedStream<S> {
    pub fn new(inner: S, finalizer: Finalizer) -> Self {
        Self {
            inner,
            phase: StreamPhase::Idle,
            acc: Accumulator::default(),
            started: Instant::now(),
            finalizer: Some(finalizer),
        }
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    fn meta(&self) -> CallMeta {
        CallMeta::streamed(self.started.elapsed(), self.acc.first_token, self.acc.chunks)
    }

    fn finish(&mut self, phase: StreamPhase, failure: Option<Failure>) {
        if self.phase.is_terminal() {
            return;
        }
        self.phase = phase;

        let Some(finalizer) = self.finalizer.take() else {
            return;
        };
        let summary = StreamSummary {
            output: self.acc.output(),
            failure,
            meta: self.meta(),
        };
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| finalizer(summary))) {
            warn!(
                error = %panic_message(payload.as_ref()),
                "Stream finalizer panicked; capture dropped"
            );
        }
    }

    fn complete(&mut self) {
        let output = self.acc.output();
        let failure = classify(&output.normalized()).map(|failure| match &self.acc.error_message {
            Some(message) if failure.kind == FailureKind::ProviderFailed => {
                Failure::new(FailureKind::ProviderFailed, message.clone())
            }
            _ => failure,
        });
        self.finish(StreamPhase::Completed, failure);
    }

    fn observe<C: ChunkView>(&mut self, chunk: &C) {
        if self.phase.is_terminal() || self.finalizer.is_none() {
            return;
        }
        let elapsed = self.started.elapsed();
        let acc = &mut self.acc;
        let result = panic::catch_unwind(AssertUnwindSafe(|| acc.absorb(chunk.shape(), elapsed)));
        if let Err(payload) = result {
            // stop capturing; the stream itself keeps flowing
            self.finalizer = None;
            warn!(
                error = %panic_message(payload.as_ref()),
                "Chunk classification panicked; stream capture detached"
            );
        }
    }
}

impl<S, C, E> Stream for CapturedStream<S>
where
    S: Stream<Item = Result<C, E>> + Unpin,
    C: ChunkView,
    E: fmt::Display,
{
    type Item = Result<C, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.phase == StreamPhase::Idle {
            this.phase = StreamPhase::Streaming;
        }

        let poll = Pin::new(&mut this.inner).poll_next(cx);
        match &poll {
            Poll::Ready(Some(Ok(chunk))) => this.observe(chunk),
            Poll::Ready(Some(Err(err))) => this.finish(
                StreamPhase::Failed,
                Some(Failure::new(FailureKind::ProviderFailed, err.to_string())),
            ),
            Poll::Ready(None) => this.complete(),
            Poll::Pending => {}
        }
        poll
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<S> Drop for CapturedStream<S> {
    fn drop(&mut self) {
        if !self.phase.is_terminal() {
            self.finish(
                StreamPhase::Failed,
                Some(Failure::new(
                    FailureKind::StreamCancelled,
                    "Stream dropped before completion",
                )),
            );
        }
    }
}

impl<S> fmt::Debug for CapturedStream<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturedStream")
            .field("phase", &self.phase)
            .field("chunks", &self.acc.chunks)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::types::{StopReason, StreamEvent};
    use futures::StreamExt;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    type Sink = Arc<Mutex<Vec<StreamSummary>>>;

    fn sink() -> (Sink, Finalizer) {
        let sink: Sink = Arc::new(Mutex::new(Vec::new()));
        let captured = sink.clone();
        let finalizer: Finalizer = Box::new(move |summary| captured.lock().unwrap().push(summary));
        (sink, finalizer)
    }

    fn events(items: Vec<Result<StreamEvent, ProviderError>>) -> impl Stream<Item = Result<StreamEvent, ProviderError>> + Unpin {
        futures::stream::iter(items)
    }

    #[tokio::test]
    async fn test_passthrough_and_single_finalization() {
        let items = vec![
            Ok(StreamEvent::TextDelta("Hel".into())),
            Ok(StreamEvent::TextDelta("lo".into())),
            Ok(StreamEvent::Usage(TokenUsage::new(4, 2))),
            Ok(StreamEvent::Done(StopReason::EndTurn)),
        ];
        let (sink, finalizer) = sink();
        let mut stream = CapturedStream::new(events(items.clone()), finalizer);

        let mut seen = Vec::new();
        while let Some(item) = stream.next().await {
            seen.push(item.unwrap());
        }
        assert_eq!(stream.phase(), StreamPhase::Completed);
        assert!(stream.next().await.is_none());
        drop(stream);

        let expected: Vec<StreamEvent> = items.into_iter().map(|i| i.unwrap()).collect();
        assert_eq!(seen, expected);

        let summaries = sink.lock().unwrap();
        assert_eq!(summaries.len(), 1);
        let summary = &summaries[0];
        assert_eq!(summary.output.content, "Hello");
        assert_eq!(summary.output.usage, Some(TokenUsage::new(4, 2)));
        assert_eq!(summary.output.finish_reason.as_deref(), Some("stop"));
        assert!(summary.failure.is_none());
        assert!(summary.meta.streaming);
        assert_eq!(summary.meta.chunk_count, Some(4));
        assert!(summary.meta.time_to_first_token.is_some());
    }

    #[tokio::test]
    async fn test_empty_stream_is_empty_response() {
        let (sink, finalizer) = sink();
        let mut stream = CapturedStream::new(events(vec![]), finalizer);
        assert!(stream.next().await.is_none());

        let summaries = sink.lock().unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(
            summaries[0].failure.as_ref().map(|f| f.kind),
            Some(FailureKind::EmptyResponse)
        );
    }

    #[tokio::test]
    async fn test_error_is_forwarded_unchanged() {
        let items = vec![
            Ok(StreamEvent::TextDelta("partial".into())),
            Err(ProviderError::StreamError("connection reset".into())),
        ];
        let (sink, finalizer) = sink();
        let mut stream = CapturedStream::new(events(items), finalizer);

        assert!(stream.next().await.unwrap().is_ok());
        match stream.next().await {
            Some(Err(ProviderError::StreamError(msg))) => assert_eq!(msg, "connection reset"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(stream.phase(), StreamPhase::Failed);
        assert!(stream.next().await.is_none());
        drop(stream);

        let summaries = sink.lock().unwrap();
        assert_eq!(summaries.len(), 1);
        let failure = summaries[0].failure.as_ref().unwrap();
        assert_eq!(failure.kind, FailureKind::ProviderFailed);
        assert!(failure.message.contains("connection reset"));
        assert_eq!(summaries[0].output.content, "partial");
    }

    #[tokio::test]
    async fn test_drop_mid_stream_is_cancelled() {
        let items = vec![
            Ok(StreamEvent::TextDelta("a".into())),
            Ok(StreamEvent::TextDelta("b".into())),
        ];
        let (sink, finalizer) = sink();
        let mut stream = CapturedStream::new(events(items), finalizer);
        stream.next().await;
        drop(stream);

        let summaries = sink.lock().unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(
            summaries[0].failure.as_ref().map(|f| f.kind),
            Some(FailureKind::StreamCancelled)
        );
        assert_eq!(summaries[0].output.content, "a");
    }

    #[tokio::test]
    async fn test_one_inner_poll_per_item() {
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = polls.clone();
        let mut remaining = 3;
        let inner = futures::stream::poll_fn(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            if remaining == 0 {
                return Poll::Ready(None);
            }
            remaining -= 1;
            Poll::Ready(Some(Ok::<_, ProviderError>(StreamEvent::TextDelta("x".into()))))
        });
        let (_sink, finalizer) = sink();
        let mut stream = CapturedStream::new(inner, finalizer);

        stream.next().await;
        assert_eq!(polls.load(Ordering::SeqCst), 1);
        stream.next().await;
        assert_eq!(polls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_raw_response_events() {
        let chunks: Vec<Result<Value, ProviderError>> = vec![
            Ok(json!({"type": "response.created"})),
            Ok(json!({"type": "response.output_text.delta", "delta": "Hi"})),
            Ok(json!({"type": "response.incomplete", "response": {
                "incomplete_details": {"reason": "max_output_tokens"}
            }})),
        ];
        let (sink, finalizer) = sink();
        let stream = CapturedStream::new(futures::stream::iter(chunks), finalizer);
        let collected: Vec<_> = stream.collect().await;
        assert_eq!(collected.len(), 3);

        let summaries = sink.lock().unwrap();
        let failure = summaries[0].failure.as_ref().unwrap();
        assert_eq!(failure.kind, FailureKind::ResponseTruncated);
        assert!(failure.message.contains("max_output_tokens"));
        assert_eq!(summaries[0].output.status.as_deref(), Some("incomplete"));
        assert_eq!(
            summaries[0].output.finish_reason.as_deref(),
            Some("max_output_tokens")
        );
    }

    #[tokio::test]
    async fn test_message_stream_error_keeps_provider_message() {
        let chunks: Vec<Result<Value, ProviderError>> = vec![
            Ok(json!({"type": "message_start", "message": {"usage": {"input_tokens": 5}}})),
            Ok(json!({"type": "error", "error": {"message": "overloaded_error"}})),
        ];
        let (sink, finalizer) = sink();
        let stream = CapturedStream::new(futures::stream::iter(chunks), finalizer);
        let _: Vec<_> = stream.collect().await;

        let summaries = sink.lock().unwrap();
        let failure = summaries[0].failure.as_ref().unwrap();
        assert_eq!(failure.message, "overloaded_error");
        assert_eq!(summaries[0].output.usage, Some(TokenUsage::new(5, 0)));
    }

    #[tokio::test]
    async fn test_finalizer_panic_does_not_reach_consumer() {
        let finalizer: Finalizer = Box::new(|_| panic!("sink exploded"));
        let stream = CapturedStream::new(
            events(vec![Ok(StreamEvent::TextDelta("ok".into()))]),
            finalizer,
        );
        let collected: Vec<_> = stream.collect().await;
        assert_eq!(collected.len(), 1);
    }
}

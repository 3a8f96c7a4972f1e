// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Event drafts for each kind of captured operation.

use std::time::Duration;

use serde_json::{json, Value};

use super::call::{CallInput, CallMeta, CallOutput};
use super::classify::{classify, Failure};
use super::pricing::estimate_cost;
use super::provider::resolve_provider;
use super::truncate::{truncate, truncate_value};
use crate::error::ProviderError;
use crate::event::{keys, Attributes, EventDraft, EventType, SpanId};
use crate::types::TokenUsage;

const STATUS_SUCCESS: &str = "success";
const STATUS_ERROR: &str = "error";

/// A piece of user feedback on a traced operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Feedback {
    /// Star rating; rounded and clamped to 1..=5.
    Rating(f64),
    ThumbsUp,
    ThumbsDown,
    /// Corrected text the user expected instead.
    Correction(String),
    Comment(String),
}

impl Feedback {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Rating(_) => "rating",
            Self::ThumbsUp => "thumbs_up",
            Self::ThumbsDown => "thumbs_down",
            Self::Correction(_) => "correction",
            Self::Comment(_) => "comment",
        }
    }
}

/// Clamp a raw rating onto the 1..=5 scale.
pub fn clamp_rating(raw: f64) -> i64 {
    if raw.is_nan() {
        return 1;
    }
    (raw.round() as i64).clamp(1, 5)
}

fn millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

fn usage_attrs(draft: EventDraft, model: &str, usage: Option<&TokenUsage>) -> EventDraft {
    match usage {
        Some(usage) => draft
            .attr(keys::INPUT_TOKENS, usage.input_tokens)
            .attr(keys::OUTPUT_TOKENS, usage.output_tokens)
            .attr(keys::TOTAL_TOKENS, usage.total())
            .attr_opt(keys::COST_USD, estimate_cost(model, usage)),
        None => draft,
    }
}

/// Builds event drafts from normalized call data.
///
/// Free text leaving an adapter is already truncated to `max_chars`.
#[derive(Debug, Clone, Copy)]
pub struct CaptureAdapter {
    max_chars: usize,
}

impl CaptureAdapter {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    fn text(&self, text: &str) -> String {
        truncate(text, self.max_chars).into_owned()
    }

    /// Drafts for a completed (or failed) model call.
    ///
    /// The first draft is the `llm_call` event. A failed call, or a response
    /// classified as a failure, adds exactly one `error` draft after it.
    /// A failed streamed call yields the `error` draft alone, carrying the
    /// call's model, input, timing and partial usage.
    pub fn llm_call(
        &self,
        input: &CallInput,
        result: Result<&CallOutput, &ProviderError>,
        meta: &CallMeta,
    ) -> Vec<EventDraft> {
        match result {
            Ok(output) => {
                let failure = classify(&output.normalized());
                self.llm_call_drafts(input, Some(output), failure, meta)
            }
            Err(err) => {
                self.llm_call_drafts(input, None, Some(Failure::from_provider_error(err)), meta)
            }
        }
    }

    /// Drafts for a call that failed for a reason outside the response
    /// itself, keeping whatever partial output was seen.
    pub fn llm_call_failed(
        &self,
        input: &CallInput,
        partial: Option<&CallOutput>,
        failure: Failure,
        meta: &CallMeta,
    ) -> Vec<EventDraft> {
        self.llm_call_drafts(input, partial, Some(failure), meta)
    }

    fn llm_call_drafts(
        &self,
        input: &CallInput,
        output: Option<&CallOutput>,
        failure: Option<Failure>,
        meta: &CallMeta,
    ) -> Vec<EventDraft> {
        let provider = resolve_provider(input.provider.as_deref(), &input.model);

        let mut primary = EventDraft::new(EventType::LlmCall)
            .attr(keys::MODEL, input.model.as_str())
            .attr(keys::PROVIDER, provider.as_str())
            .attr(keys::INPUT, truncate_value(input.input.clone(), self.max_chars))
            .attr_opt(
                keys::PARAMETERS,
                input
                    .parameters
                    .clone()
                    .map(|p| truncate_value(p, self.max_chars)),
            )
            .attr(keys::STREAMING, meta.streaming)
            .attr(keys::LATENCY_MS, millis(meta.latency))
            .attr_opt(keys::TIME_TO_FIRST_TOKEN_MS, meta.time_to_first_token.map(millis))
            .attr_opt(keys::CHUNK_COUNT, meta.chunk_count);

        if let Some(output) = output {
            primary = usage_attrs(primary, &input.model, output.usage.as_ref())
                .attr_opt(keys::FINISH_REASON, output.finish_reason.as_deref());
            if !output.tool_calls.is_empty() {
                primary = primary.attr(
                    keys::TOOL_CALLS,
                    truncate_value(Value::Array(output.tool_calls.clone()), self.max_chars),
                );
            }
        }

        match failure {
            None => {
                let content = output.map(|o| self.text(&o.content)).unwrap_or_default();
                vec![primary
                    .attr(keys::OUTPUT, content)
                    .attr(keys::STATUS, STATUS_SUCCESS)]
            }
            Some(failure) if meta.streaming => {
                // a stream ends in one terminal event: the error carries the call
                let mut error = self.error(&failure);
                for (key, value) in primary.attributes {
                    error.attributes.entry(key).or_insert(value);
                }
                vec![error.attr(keys::OUTPUT, Value::Null)]
            }
            Some(failure) => {
                let primary = primary
                    .attr(keys::OUTPUT, Value::Null)
                    .attr(keys::STATUS, STATUS_ERROR);
                let error = self
                    .error(&failure)
                    .attr(keys::MODEL, input.model.as_str())
                    .attr(keys::PROVIDER, provider);
                vec![primary, error]
            }
        }
    }

    /// A standalone `error` draft.
    pub fn error(&self, failure: &Failure) -> EventDraft {
        EventDraft::new(EventType::Error)
            .attr(keys::ERROR_TYPE, failure.kind.as_str())
            .attr(keys::ERROR_CATEGORY, failure.kind.category())
            .attr(keys::ERROR_CODE, failure.code.as_str())
            .attr(keys::ERROR_MESSAGE, self.text(&failure.message))
    }

    /// A `tool_call` draft. A tool error is recorded on the event itself.
    pub fn tool_call(
        &self,
        name: &str,
        args: &Value,
        result: Result<&Value, &str>,
        latency: Duration,
    ) -> EventDraft {
        let draft = EventDraft::new(EventType::ToolCall)
            .attr(keys::TOOL_NAME, name)
            .attr(keys::TOOL_ARGS, truncate_value(args.clone(), self.max_chars))
            .attr(keys::LATENCY_MS, millis(latency));

        match result {
            Ok(value) => draft
                .attr(keys::TOOL_RESULT, truncate_value(value.clone(), self.max_chars))
                .attr(keys::STATUS, STATUS_SUCCESS),
            Err(message) => draft
                .attr(keys::TOOL_RESULT, Value::Null)
                .attr(keys::STATUS, STATUS_ERROR)
                .attr(keys::ERROR_MESSAGE, self.text(message)),
        }
    }

    /// A `feedback` draft, nested under the span it rates when given.
    pub fn feedback(&self, feedback: &Feedback, target: Option<SpanId>) -> EventDraft {
        let draft = EventDraft::new(EventType::Feedback)
            .attr(keys::FEEDBACK_TYPE, feedback.kind())
            .with_parent(target);

        match feedback {
            Feedback::Rating(raw) => draft.attr(keys::RATING, clamp_rating(*raw)),
            Feedback::ThumbsUp | Feedback::ThumbsDown => draft,
            Feedback::Correction(text) => draft.attr(keys::CORRECTION, self.text(text)),
            Feedback::Comment(text) => draft.attr(keys::COMMENT, self.text(text)),
        }
    }

    /// A `retrieval` draft.
    pub fn retrieval(
        &self,
        query: &str,
        documents: &[Value],
        top_k: Option<usize>,
        latency: Duration,
    ) -> EventDraft {
        EventDraft::new(EventType::Retrieval)
            .attr(keys::QUERY, self.text(query))
            .attr(keys::DOCUMENT_COUNT, documents.len())
            .attr_opt(keys::TOP_K, top_k)
            .attr(
                keys::OUTPUT,
                truncate_value(Value::Array(documents.to_vec()), self.max_chars),
            )
            .attr(keys::LATENCY_MS, millis(latency))
    }

    /// Drafts for an embedding call: the `embedding` event, plus an `error`
    /// draft when the call failed.
    pub fn embedding(
        &self,
        model: &str,
        provider: Option<&str>,
        input_count: usize,
        result: Result<Option<usize>, &ProviderError>,
        latency: Duration,
    ) -> Vec<EventDraft> {
        let provider = resolve_provider(provider, model);
        let draft = EventDraft::new(EventType::Embedding)
            .attr(keys::MODEL, model)
            .attr(keys::PROVIDER, provider.as_str())
            .attr(keys::INPUT_COUNT, input_count)
            .attr(keys::LATENCY_MS, millis(latency));

        match result {
            Ok(dimensions) => vec![draft
                .attr_opt(keys::DIMENSIONS, dimensions)
                .attr(keys::STATUS, STATUS_SUCCESS)],
            Err(err) => {
                let error = self
                    .error(&Failure::from_provider_error(err))
                    .attr(keys::MODEL, model)
                    .attr(keys::PROVIDER, provider);
                vec![draft.attr(keys::STATUS, STATUS_ERROR), error]
            }
        }
    }

    /// A `vector_db_operation` draft.
    pub fn vector_db(
        &self,
        operation: &str,
        collection: &str,
        result_count: Option<usize>,
        latency: Duration,
    ) -> EventDraft {
        EventDraft::new(EventType::VectorDbOperation)
            .attr(keys::OPERATION, operation)
            .attr(keys::COLLECTION, collection)
            .attr_opt(keys::DOCUMENT_COUNT, result_count)
            .attr(keys::LATENCY_MS, millis(latency))
    }

    /// A `cache_operation` draft.
    pub fn cache(&self, operation: &str, key: &str, hit: bool) -> EventDraft {
        EventDraft::new(EventType::CacheOperation)
            .attr(keys::OPERATION, operation)
            .attr(keys::CACHE_KEY, self.text(key))
            .attr(keys::CACHE_HIT, hit)
    }

    /// An `agent_create` draft.
    pub fn agent_create(&self, name: &str, config: Attributes) -> EventDraft {
        EventDraft::new(EventType::AgentCreate)
            .attr(keys::TRACE_NAME, name)
            .attr(
                keys::PARAMETERS,
                truncate_value(Value::Object(config), self.max_chars),
            )
    }

    /// An `output` draft for the final result of a trace.
    pub fn output(&self, content: &Value) -> EventDraft {
        EventDraft::new(EventType::Output)
            .attr(keys::OUTPUT, truncate_value(content.clone(), self.max_chars))
    }

    /// The `trace_start` draft.
    pub fn trace_start(&self, name: Option<&str>, metadata: &Attributes) -> EventDraft {
        let draft = EventDraft::new(EventType::TraceStart).attr_opt(keys::TRACE_NAME, name);
        if metadata.is_empty() {
            draft
        } else {
            draft.attr(
                keys::METADATA,
                truncate_value(Value::Object(metadata.clone()), self.max_chars),
            )
        }
    }

    /// The `trace_end` draft.
    pub fn trace_end(
        &self,
        name: Option<&str>,
        outcome: &str,
        duration_ms: u64,
        event_count: u64,
        error_count: u64,
        last_error: Option<&str>,
    ) -> EventDraft {
        EventDraft::new(EventType::TraceEnd)
            .attr_opt(keys::TRACE_NAME, name)
            .attr(keys::OUTCOME, outcome)
            .attr(keys::DURATION_MS, duration_ms)
            .attr(keys::EVENT_COUNT, event_count)
            .attr(keys::ERROR_COUNT, error_count)
            .attr(
                keys::LAST_ERROR,
                last_error.map(|e| json!(self.text(e))).unwrap_or(Value::Null),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::FailureKind;

    fn adapter() -> CaptureAdapter {
        CaptureAdapter::new(20)
    }

    fn input() -> CallInput {
        CallInput::new("gpt-4o", json!([{"role": "user", "content": "hi"}]))
    }

    #[test]
    fn test_llm_call_success() {
        let output = CallOutput::text("Hello there")
            .with_finish_reason("stop")
            .with_usage(TokenUsage::new(10, 5));
        let drafts = adapter().llm_call(
            &input(),
            Ok(&output),
            &CallMeta::completed(Duration::from_millis(42)),
        );

        assert_eq!(drafts.len(), 1);
        let attrs = &drafts[0].attributes;
        assert_eq!(drafts[0].event_type, EventType::LlmCall);
        assert_eq!(attrs[keys::PROVIDER], "openai");
        assert_eq!(attrs[keys::OUTPUT], "Hello there");
        assert_eq!(attrs[keys::STATUS], "success");
        assert_eq!(attrs[keys::TOTAL_TOKENS], 15);
        assert_eq!(attrs[keys::LATENCY_MS], 42);
        assert_eq!(attrs[keys::STREAMING], false);
        assert!(attrs.contains_key(keys::COST_USD));
        assert!(!attrs.contains_key(keys::TIME_TO_FIRST_TOKEN_MS));
    }

    #[test]
    fn test_llm_call_truncates_output() {
        let output = CallOutput::text("a".repeat(50)).with_finish_reason("stop");
        let drafts = adapter().llm_call(&input(), Ok(&output), &CallMeta::default());
        assert_eq!(
            drafts[0].attributes[keys::OUTPUT],
            format!("{}...[truncated]", "a".repeat(20))
        );
    }

    #[test]
    fn test_llm_call_classified_failure() {
        let output = CallOutput::text("").with_finish_reason("stop");
        let drafts = adapter().llm_call(&input(), Ok(&output), &CallMeta::default());

        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].attributes[keys::OUTPUT], Value::Null);
        assert_eq!(drafts[0].attributes[keys::STATUS], "error");
        assert_eq!(drafts[1].event_type, EventType::Error);
        assert_eq!(drafts[1].attributes[keys::ERROR_TYPE], "empty_response");
        assert_eq!(drafts[1].attributes[keys::MODEL], "gpt-4o");
    }

    #[test]
    fn test_llm_call_provider_error() {
        let err = ProviderError::api("overloaded", 529);
        let drafts = adapter().llm_call(&input(), Err(&err), &CallMeta::default());

        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].attributes[keys::OUTPUT], Value::Null);
        assert_eq!(drafts[1].attributes[keys::ERROR_TYPE], "provider_failed");
        assert_eq!(drafts[1].attributes[keys::ERROR_CODE], "API_ERROR");
    }

    #[test]
    fn test_llm_call_failed_keeps_partial_usage() {
        let partial = CallOutput::text("half").with_usage(TokenUsage::new(1, 2));
        let drafts = adapter().llm_call_failed(
            &input(),
            Some(&partial),
            Failure::new(FailureKind::StreamCancelled, "dropped"),
            &CallMeta::streamed(Duration::from_millis(5), Some(Duration::from_millis(1)), 3),
        );
        assert_eq!(drafts.len(), 1);
        let error = &drafts[0];
        assert_eq!(error.event_type, EventType::Error);
        assert_eq!(error.attributes[keys::ERROR_TYPE], "stream_cancelled");
        assert_eq!(error.attributes[keys::OUTPUT], Value::Null);
        assert_eq!(error.attributes[keys::OUTPUT_TOKENS], 2);
        assert_eq!(error.attributes[keys::TIME_TO_FIRST_TOKEN_MS], 1);
        assert_eq!(error.attributes[keys::CHUNK_COUNT], 3);
        assert_eq!(error.attributes[keys::MODEL], "gpt-4o");
        assert_eq!(error.attributes[keys::STREAMING], true);
        assert!(error.attributes.get(keys::STATUS).is_none());
    }

    #[test]
    fn test_explicit_provider_wins() {
        let input = input().with_provider("azure");
        let drafts = adapter().llm_call(
            &input,
            Ok(&CallOutput::text("ok")),
            &CallMeta::default(),
        );
        assert_eq!(drafts[0].attributes[keys::PROVIDER], "azure");
    }

    #[test]
    fn test_rating_clamp() {
        assert_eq!(clamp_rating(10.0), 5);
        assert_eq!(clamp_rating(-1.0), 1);
        assert_eq!(clamp_rating(3.0), 3);
        assert_eq!(clamp_rating(3.6), 4);
        assert_eq!(clamp_rating(f64::NAN), 1);
    }

    #[test]
    fn test_feedback_drafts() {
        let target = SpanId::new();
        let draft = adapter().feedback(&Feedback::Rating(10.0), Some(target));
        assert_eq!(draft.attributes[keys::FEEDBACK_TYPE], "rating");
        assert_eq!(draft.attributes[keys::RATING], 5);
        assert_eq!(draft.parent, Some(target));

        let draft = adapter().feedback(&Feedback::Correction("x".repeat(30)), None);
        assert!(draft.attributes[keys::CORRECTION]
            .as_str()
            .unwrap()
            .ends_with("...[truncated]"));

        let draft = adapter().feedback(&Feedback::ThumbsDown, None);
        assert_eq!(draft.attributes[keys::FEEDBACK_TYPE], "thumbs_down");
    }

    #[test]
    fn test_tool_call() {
        let ok = adapter().tool_call(
            "search",
            &json!({"q": "rust"}),
            Ok(&json!(["a", "b"])),
            Duration::from_millis(3),
        );
        assert_eq!(ok.attributes[keys::STATUS], "success");
        assert_eq!(ok.attributes[keys::TOOL_ARGS]["q"], "rust");

        let failed = adapter().tool_call("search", &json!({}), Err("timeout"), Duration::ZERO);
        assert_eq!(failed.attributes[keys::STATUS], "error");
        assert_eq!(failed.attributes[keys::ERROR_MESSAGE], "timeout");
    }

    #[test]
    fn test_embedding_failure_adds_error() {
        let err = ProviderError::Timeout(100);
        let drafts = adapter().embedding("text-embedding-3-small", None, 2, Err(&err), Duration::ZERO);
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].attributes[keys::PROVIDER], "openai");
        assert_eq!(drafts[1].attributes[keys::ERROR_CODE], "TIMEOUT");
    }

    #[test]
    fn test_trace_boundaries() {
        let mut metadata = Attributes::new();
        metadata.insert("tier".to_string(), json!("gold"));
        let start = adapter().trace_start(Some("checkout"), &metadata);
        assert_eq!(start.attributes[keys::TRACE_NAME], "checkout");
        assert_eq!(start.attributes[keys::METADATA]["tier"], "gold");

        let end = adapter().trace_end(None, "success", 12, 3, 0, None);
        assert_eq!(end.attributes[keys::OUTCOME], "success");
        assert_eq!(end.attributes[keys::LAST_ERROR], Value::Null);
        assert!(!end.attributes.contains_key(keys::TRACE_NAME));
    }

    #[test]
    fn test_misc_drafts() {
        let a = adapter();
        assert_eq!(
            a.retrieval("q", &[json!("d1")], Some(5), Duration::ZERO).attributes[keys::DOCUMENT_COUNT],
            1
        );
        assert_eq!(
            a.vector_db("query", "docs", Some(3), Duration::ZERO).event_type,
            EventType::VectorDbOperation
        );
        assert_eq!(a.cache("get", "k", true).attributes[keys::CACHE_HIT], true);
        assert_eq!(
            a.agent_create("planner", Attributes::new()).event_type,
            EventType::AgentCreate
        );
        assert_eq!(a.output(&json!("done")).attributes[keys::OUTPUT], "done");
    }
}

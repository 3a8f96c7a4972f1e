// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Instrumented chat provider.

use std::time::Instant;

use async_trait::async_trait;

use crate::capture::{guarded, CallInput, CallMeta, CallOutput};
use crate::context::TraceHandle;
use crate::error::ProviderError;
use crate::observer::Observer;
use crate::types::{EventStream, Message, Provider, ProviderResponse, ToolDefinition};

/// A [`Provider`] that records an `llm_call` for every request.
///
/// Calls attach to the handle given to [`with_trace`](Self::with_trace), or
/// else to the enclosing [`TraceHandle::scope`], or else to a trace of their
/// own.
pub struct InstrumentedProvider<P> {
    inner: P,
    observer: Observer,
    trace: Option<TraceHandle>,
}

impl<P: Provider> InstrumentedProvider<P> {
    pub fn new(inner: P, observer: Observer) -> Self {
        Self {
            inner,
            observer,
            trace: None,
        }
    }

    /// Pin every call through this wrapper to one trace.
    pub fn with_trace(mut self, trace: TraceHandle) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn into_inner(self) -> P {
        self.inner
    }

    fn call_input(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        system_prompt: Option<&str>,
    ) -> Option<CallInput> {
        guarded(|| {
            let input = CallInput::from_chat(self.inner.model(), messages, tools, system_prompt);
            Ok(match self.inner.name() {
                Some(name) => input.with_provider(name),
                None => input,
            })
        })
        .ok()
    }
}

#[async_trait]
impl<P: Provider> Provider for InstrumentedProvider<P> {
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        system_prompt: Option<&str>,
    ) -> Result<ProviderResponse, ProviderError> {
        let call = self.inner.chat(messages, tools, system_prompt);
        match self.call_input(messages, tools, system_prompt) {
            Some(input) => {
                self.observer
                    .observe_call(self.trace, input, call, |response| CallOutput::from(response))
                    .await
            }
            None => call.await,
        }
    }

    async fn stream_chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        system_prompt: Option<&str>,
    ) -> Result<EventStream, ProviderError> {
        let input = self.call_input(messages, tools, system_prompt);
        let started = Instant::now();

        match self.inner.stream_chat(messages, tools, system_prompt).await {
            Ok(stream) => match input {
                Some(input) => Ok(Box::pin(self.observer.intercept_stream(self.trace, input, stream))),
                None => Ok(stream),
            },
            Err(err) => {
                if let Some(input) = input {
                    let meta = CallMeta::streamed(started.elapsed(), None, 0);
                    let trace = self.trace.or_else(TraceHandle::current);
                    self.observer.capture_llm_call(trace, &input, Err(&err), &meta);
                }
                Err(err)
            }
        }
    }

    fn name(&self) -> Option<&str> {
        self.inner.name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }
}

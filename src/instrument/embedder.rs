// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::time::Instant;

use async_trait::async_trait;

use crate::context::TraceHandle;
use crate::error::ProviderError;
use crate::observer::Observer;
use crate::types::EmbeddingProvider;

/// An [`EmbeddingProvider`] that records an `embedding` event per request.
pub struct InstrumentedEmbedder<E> {
    inner: E,
    observer: Observer,
    trace: Option<TraceHandle>,
}

impl<E: EmbeddingProvider> InstrumentedEmbedder<E> {
    pub fn new(inner: E, observer: Observer) -> Self {
        Self {
            inner,
            observer,
            trace: None,
        }
    }

    pub fn with_trace(mut self, trace: TraceHandle) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn into_inner(self) -> E {
        self.inner
    }
}

#[async_trait]
impl<E: EmbeddingProvider> EmbeddingProvider for InstrumentedEmbedder<E> {
    fn name(&self) -> Option<&str> {
        self.inner.name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let trace = self.trace.or_else(TraceHandle::current);
        let started = Instant::now();
        let result = self.inner.embed(texts).await;

        let dimensions = result.as_ref().map(|vectors| vectors.first().map(Vec::len));
        self.observer.capture_embedding(
            trace,
            self.inner.model(),
            self.inner.name(),
            texts.len(),
            dimensions,
            started.elapsed(),
        );
        result
    }
}

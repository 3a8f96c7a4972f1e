// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The SDK instance.
//!
//! An [`Observer`] owns everything one configured SDK needs: tenant context,
//! trace registry, gate, buffer, delivery client and background flusher.
//! Instances share nothing; clones share one instance.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Duration as ChronoDuration;
use futures::Stream;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::capture::{
    guarded, CallInput, CallMeta, CallOutput, CaptureAdapter, Failure, Feedback,
};
use crate::config::{self, ObserverConfig};
use crate::context::{orphan_stamp, EndRejection, TraceHandle, TraceOptions, TraceRegistry};
use crate::delivery::{Deliverer, DeliveryFailure, ErrorCallback, HttpTransport, RetryPolicy, Transport};
use crate::error::{CaptureError, ConfigError, ProviderError};
use crate::event::{
    keys, Attributes, Correlation, EventDraft, EventStamp, SpanId, TenantContext, TraceId,
};
use crate::pipeline::{BackgroundFlusher, EventBuffer, FlushReport, Gate, Pipeline, Redactor, Sampler};
use crate::stream::{CapturedStream, ChunkView, StreamSummary};
use crate::telemetry::{PipelineStats, StatsSnapshot};

/// Outcome recorded on traces ended by [`Observer::shutdown`].
pub const SHUTDOWN_OUTCOME: &str = "shutdown";

fn lock_set(set: &Mutex<HashSet<TraceId>>) -> std::sync::MutexGuard<'_, HashSet<TraceId>> {
    set.lock().unwrap_or_else(|e| e.into_inner())
}

/// Marks a trace as ending for as long as it lives.
struct EndingGuard<'a> {
    set: &'a Mutex<HashSet<TraceId>>,
    id: TraceId,
}

impl<'a> EndingGuard<'a> {
    fn new(set: &'a Mutex<HashSet<TraceId>>, id: TraceId) -> Self {
        lock_set(set).insert(id);
        Self { set, id }
    }
}

impl Drop for EndingGuard<'_> {
    fn drop(&mut self) {
        lock_set(self.set).remove(&self.id);
    }
}

/// Builder for an [`Observer`] with custom collaborators.
pub struct ObserverBuilder {
    config: ObserverConfig,
    transport: Option<Arc<dyn Transport>>,
    redactor: Option<Arc<dyn Redactor>>,
    on_error: Option<ErrorCallback>,
}

impl ObserverBuilder {
    /// Replace the HTTP transport (tests, custom sinks).
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_redactor(mut self, redactor: Arc<dyn Redactor>) -> Self {
        self.redactor = Some(redactor);
        self
    }

    /// Receive each dropped batch once.
    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&DeliveryFailure) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }

    /// Validate the config, resolve the tenant and start the pipeline.
    ///
    /// The background flusher is spawned when called inside a tokio runtime.
    pub fn build(self) -> Result<Observer, ConfigError> {
        let tenant = config::resolve(&self.config)?;
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::from_config(&self.config)?),
        };

        let stats = Arc::new(PipelineStats::new());
        let mut deliverer = Deliverer::new(transport, RetryPolicy::from_config(&self.config), stats.clone());
        if let Some(callback) = self.on_error {
            deliverer = deliverer.with_error_callback(callback);
        }

        let registry = Arc::new(TraceRegistry::new());
        let ending: Arc<Mutex<HashSet<TraceId>>> = Arc::default();
        let (open, closing) = (registry.clone(), ending.clone());
        let buffer = Arc::new(EventBuffer::new(self.config.flush_threshold));
        let pipeline = Pipeline::new(buffer, deliverer, self.config.max_batch_size)
            .with_open_traces(Arc::new(move |id| {
                open.is_open(id) || lock_set(&closing).contains(&id)
            }));
        let flusher = BackgroundFlusher::spawn(pipeline.clone(), self.config.flush_interval());
        if flusher.is_none() {
            debug!("No tokio runtime; background flushing disabled");
        }

        let mut gate = Gate::new();
        if let Some(redactor) = self.redactor {
            gate = gate.with_redactor(redactor);
        }

        debug!(
            tenant_id = %tenant.tenant_id,
            project_id = %tenant.project_id,
            environment = %tenant.environment,
            mode = %self.config.mode,
            "Observer initialized"
        );

        Ok(Observer {
            correlation: None,
            inner: Arc::new(ObserverInner {
                tenant,
                registry,
                ending,
                sampler: Sampler::new(self.config.sample_rate),
                adapter: CaptureAdapter::new(self.config.max_response_chars),
                gate,
                pipeline,
                stats,
                flusher: Mutex::new(flusher),
                shut_down: AtomicBool::new(false),
                config: self.config,
            }),
        })
    }
}

struct ObserverInner {
    config: ObserverConfig,
    tenant: TenantContext,
    registry: Arc<TraceRegistry>,
    /// Traces between `end` and their own flush; background flushes skip them.
    ending: Arc<Mutex<HashSet<TraceId>>>,
    sampler: Sampler,
    adapter: CaptureAdapter,
    gate: Gate,
    pipeline: Pipeline,
    stats: Arc<PipelineStats>,
    flusher: Mutex<Option<BackgroundFlusher>>,
    shut_down: AtomicBool,
}

/// A configured SDK instance. Cheap to clone.
#[derive(Clone)]
pub struct Observer {
    inner: Arc<ObserverInner>,
    /// Call-site correlation applied to every capture made through this clone.
    correlation: Option<Arc<Correlation>>,
}

impl Observer {
    /// Create an instance delivering over HTTP.
    pub fn new(config: ObserverConfig) -> Result<Self, ConfigError> {
        Self::builder(config).build()
    }

    pub fn builder(config: ObserverConfig) -> ObserverBuilder {
        ObserverBuilder {
            config,
            transport: None,
            redactor: None,
            on_error: None,
        }
    }

    pub fn config(&self) -> &ObserverConfig {
        &self.inner.config
    }

    pub fn tenant(&self) -> &TenantContext {
        &self.inner.tenant
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Number of events waiting for delivery.
    pub fn pending(&self) -> usize {
        self.inner.pipeline.buffer().len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }

    /// A clone of this instance whose captures carry `correlation`.
    ///
    /// Fields set here override the trace's; unset fields still fall back to
    /// it. Applies to captures, wrapped calls and intercepted streams made
    /// through the returned clone, not to trace start and end events.
    ///
    /// ```rust,ignore
    /// let checkout = observer.with_correlation(Correlation {
    ///     route: Some("/checkout".into()),
    ///     ..Default::default()
    /// });
    /// checkout.capture_output(Some(trace), &json!("done"));
    /// ```
    pub fn with_correlation(&self, correlation: Correlation) -> Self {
        let merged = match &self.correlation {
            Some(current) => correlation.or(current),
            None => correlation,
        };
        Self {
            inner: self.inner.clone(),
            correlation: Some(Arc::new(merged)),
        }
    }

    /// The call-site correlation of this clone, if any.
    pub fn correlation(&self) -> Option<&Correlation> {
        self.correlation.as_deref()
    }

    // ------------------------------------------------------------------
    // Traces
    // ------------------------------------------------------------------

    /// Start a trace. The sampling decision is made here, once.
    pub fn start_trace(&self, options: TraceOptions) -> TraceHandle {
        let inner = &self.inner;
        let sampled = inner.sampler.decide();
        let started = inner.registry.begin(&options, sampled);

        if sampled {
            let draft = inner
                .adapter
                .trace_start(options.name.as_deref(), &options.metadata);
            self.admit(started.stamp, started.correlation, draft);
        } else {
            inner.stats.record_sampled_out();
            trace!(trace_id = %started.handle.id(), "Trace not sampled");
        }
        started.handle
    }

    /// End a trace and deliver its buffered events.
    ///
    /// Resolves once this trace's flush attempt completes. Ending an unknown
    /// or already-ended trace does nothing beyond a diagnostic.
    pub async fn end_trace(&self, handle: &TraceHandle, outcome: &str) -> TraceId {
        let id = handle.id();
        let inner = &self.inner;

        let _ending = EndingGuard::new(&inner.ending, id);
        let summary = match inner.registry.end(id) {
            Ok(summary) => summary,
            Err(EndRejection::AlreadyEnded) => {
                warn!(trace_id = %id, "Trace already ended");
                return id;
            }
            Err(EndRejection::Unknown) => {
                warn!(trace_id = %id, "Cannot end unknown trace");
                return id;
            }
        };
        if !summary.sampled {
            return id;
        }

        let draft = inner.adapter.trace_end(
            summary.name.as_deref(),
            outcome,
            summary.duration_ms,
            summary.event_count,
            summary.error_count,
            summary.last_error.as_deref(),
        );
        if let Some(event) = inner
            .gate
            .admit(&inner.tenant, summary.stamp, summary.correlation, draft, &inner.stats)
        {
            inner.stats.record_captured();
            inner.pipeline.buffer().push(event);
        }

        inner.pipeline.flush_trace(id).await;
        id
    }

    /// Nest subsequent captures of a trace under an already-recorded span.
    pub fn push_span(&self, handle: &TraceHandle, span: SpanId) -> bool {
        self.inner.registry.push_span(handle.id(), span)
    }

    /// The span the next capture in this trace would nest under.
    pub fn current_span(&self, handle: &TraceHandle) -> Option<SpanId> {
        self.inner.registry.open_span(handle.id(), None)
    }

    /// Undo the last [`push_span`](Self::push_span).
    pub fn pop_span(&self, handle: &TraceHandle) -> Option<SpanId> {
        self.inner.registry.pop_span(handle.id())
    }

    // ------------------------------------------------------------------
    // Emission
    // ------------------------------------------------------------------

    fn resolve_trace(trace: Option<TraceHandle>) -> Option<TraceHandle> {
        trace.or_else(TraceHandle::current)
    }

    fn admit(&self, stamp: EventStamp, correlation: Correlation, draft: EventDraft) -> Option<SpanId> {
        let inner = &self.inner;
        let event_type = draft.event_type;
        let event = inner
            .gate
            .admit(&inner.tenant, stamp, correlation, draft, &inner.stats)?;
        inner.stats.record_captured();

        if inner.config.mode.is_development() {
            debug!(
                event_type = %event_type,
                trace_id = %stamp.trace_id,
                span_id = %stamp.span_id,
                event = %serde_json::to_string(&event).unwrap_or_default(),
                "Captured event"
            );
        } else {
            trace!(event_type = %event_type, trace_id = %stamp.trace_id, "Captured event");
        }

        if inner.pipeline.buffer().push(event) {
            self.wake_flusher();
        }
        Some(stamp.span_id)
    }

    fn wake_flusher(&self) {
        let flusher = self.inner.flusher.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(flusher) = flusher.as_ref() {
            flusher.wake();
        }
    }

    /// Stamp and buffer a group of drafts. The first is the primary event;
    /// later drafts without an explicit parent nest under it.
    ///
    /// Returns the primary event's span id.
    fn emit(&self, trace: Option<TraceHandle>, drafts: Vec<EventDraft>) -> Option<SpanId> {
        if drafts.is_empty() {
            return None;
        }
        let inner = &self.inner;

        let sampled = match Self::resolve_trace(trace) {
            Some(handle) if inner.registry.is_open(handle.id()) => {
                return self.emit_in_trace(handle.id(), drafts);
            }
            // the trace's decision sticks after it ends
            Some(handle) => handle.is_sampled(),
            None => inner.sampler.decide(),
        };
        if !sampled {
            for _ in &drafts {
                inner.stats.record_sampled_out();
            }
            return None;
        }
        self.emit_orphans(drafts)
    }

    fn emit_in_trace(&self, trace_id: TraceId, drafts: Vec<EventDraft>) -> Option<SpanId> {
        let inner = &self.inner;
        let mut primary: Option<SpanId> = None;

        for (i, mut draft) in drafts.into_iter().enumerate() {
            if i > 0 && draft.parent.is_none() {
                draft.parent = primary;
            }
            let error_message = draft
                .attributes
                .get(keys::ERROR_MESSAGE)
                .and_then(Value::as_str)
                .map(str::to_string);
            let Some(stamped) = inner.registry.stamp(
                trace_id,
                draft.event_type,
                draft.parent,
                &draft.correlation,
                error_message.as_deref(),
            ) else {
                // ended concurrently
                return primary;
            };

            if !stamped.sampled {
                inner.stats.record_sampled_out();
                continue;
            }
            let span = self.admit(stamped.stamp, stamped.correlation, draft);
            if i == 0 {
                primary = span;
            }
        }
        primary
    }

    /// Drafts outside any open trace share one fresh trace id.
    fn emit_orphans(&self, drafts: Vec<EventDraft>) -> Option<SpanId> {
        let root = orphan_stamp();
        let mut last = root.timestamp;
        let mut primary = None;

        for (i, draft) in drafts.into_iter().enumerate() {
            let stamp = if i == 0 {
                root
            } else {
                let now = chrono::Utc::now();
                last = if now > last {
                    now
                } else {
                    last + ChronoDuration::microseconds(1)
                };
                EventStamp {
                    trace_id: root.trace_id,
                    span_id: SpanId::new(),
                    parent_span_id: Some(root.span_id),
                    timestamp: last,
                }
            };
            let correlation = draft.correlation.clone();
            let span = self.admit(stamp, correlation, draft);
            if i == 0 {
                primary = span;
            }
        }
        primary
    }

    /// Build drafts with panics and errors contained, then emit them.
    fn capture<F>(&self, trace: Option<TraceHandle>, what: &'static str, build: F) -> Option<SpanId>
    where
        F: FnOnce(&CaptureAdapter) -> Result<Vec<EventDraft>, CaptureError>,
    {
        let adapter = &self.inner.adapter;
        match guarded(|| build(adapter)) {
            Ok(mut drafts) => {
                if let Some(call_site) = self.correlation.as_deref() {
                    drafts = drafts
                        .into_iter()
                        .map(|draft| {
                            let merged = draft.correlation.or(call_site);
                            draft.with_correlation(merged)
                        })
                        .collect();
                }
                let result = guarded(|| Ok(self.emit(trace, drafts)));
                match result {
                    Ok(span) => span,
                    Err(err) => {
                        self.capture_failed(what, &err);
                        None
                    }
                }
            }
            Err(err) => {
                self.capture_failed(what, &err);
                None
            }
        }
    }

    fn capture_failed(&self, what: &'static str, err: &CaptureError) {
        self.inner.stats.record_capture_failure();
        warn!(capture = what, error = %err, "Telemetry capture failed");
    }

    // ------------------------------------------------------------------
    // Captures
    // ------------------------------------------------------------------

    /// Record a completed (or failed) model call.
    pub fn capture_llm_call(
        &self,
        trace: Option<TraceHandle>,
        input: &CallInput,
        result: Result<&CallOutput, &ProviderError>,
        meta: &CallMeta,
    ) -> Option<SpanId> {
        self.capture(trace, "llm_call", |adapter| {
            Ok(adapter.llm_call(input, result, meta))
        })
    }

    pub fn capture_tool_call(
        &self,
        trace: Option<TraceHandle>,
        name: &str,
        args: &Value,
        result: Result<&Value, &str>,
        latency: Duration,
    ) -> Option<SpanId> {
        self.capture(trace, "tool_call", |adapter| {
            Ok(vec![adapter.tool_call(name, args, result, latency)])
        })
    }

    /// Record user feedback, nested under `target` when it names a span of
    /// the trace.
    pub fn capture_feedback(
        &self,
        trace: Option<TraceHandle>,
        feedback: &Feedback,
        target: Option<SpanId>,
    ) -> Option<SpanId> {
        self.capture(trace, "feedback", |adapter| {
            Ok(vec![adapter.feedback(feedback, target)])
        })
    }

    pub fn capture_retrieval(
        &self,
        trace: Option<TraceHandle>,
        query: &str,
        documents: &[Value],
        top_k: Option<usize>,
        latency: Duration,
    ) -> Option<SpanId> {
        self.capture(trace, "retrieval", |adapter| {
            Ok(vec![adapter.retrieval(query, documents, top_k, latency)])
        })
    }

    pub fn capture_embedding(
        &self,
        trace: Option<TraceHandle>,
        model: &str,
        provider: Option<&str>,
        input_count: usize,
        result: Result<Option<usize>, &ProviderError>,
        latency: Duration,
    ) -> Option<SpanId> {
        self.capture(trace, "embedding", |adapter| {
            Ok(adapter.embedding(model, provider, input_count, result, latency))
        })
    }

    pub fn capture_vector_db(
        &self,
        trace: Option<TraceHandle>,
        operation: &str,
        collection: &str,
        result_count: Option<usize>,
        latency: Duration,
    ) -> Option<SpanId> {
        self.capture(trace, "vector_db_operation", |adapter| {
            Ok(vec![adapter.vector_db(operation, collection, result_count, latency)])
        })
    }

    pub fn capture_cache(
        &self,
        trace: Option<TraceHandle>,
        operation: &str,
        key: &str,
        hit: bool,
    ) -> Option<SpanId> {
        self.capture(trace, "cache_operation", |adapter| {
            Ok(vec![adapter.cache(operation, key, hit)])
        })
    }

    /// Record an agent; pass the returned span to [`push_span`](Self::push_span)
    /// to nest the agent's work under it.
    pub fn capture_agent_create(
        &self,
        trace: Option<TraceHandle>,
        name: &str,
        config: Attributes,
    ) -> Option<SpanId> {
        self.capture(trace, "agent_create", |adapter| {
            Ok(vec![adapter.agent_create(name, config)])
        })
    }

    pub fn capture_output(&self, trace: Option<TraceHandle>, content: &Value) -> Option<SpanId> {
        self.capture(trace, "output", |adapter| Ok(vec![adapter.output(content)]))
    }

    pub fn capture_error(&self, trace: Option<TraceHandle>, failure: &Failure) -> Option<SpanId> {
        self.capture(trace, "error", |adapter| Ok(vec![adapter.error(failure)]))
    }

    // ------------------------------------------------------------------
    // Call and stream wrappers
    // ------------------------------------------------------------------

    /// Await a model call and record it. The call's result is returned
    /// unchanged.
    pub async fn observe_call<T, Fut, O>(
        &self,
        trace: Option<TraceHandle>,
        input: CallInput,
        call: Fut,
        to_output: O,
    ) -> Result<T, ProviderError>
    where
        Fut: Future<Output = Result<T, ProviderError>>,
        O: FnOnce(&T) -> CallOutput,
    {
        let trace = Self::resolve_trace(trace);
        let started = Instant::now();
        let result = call.await;
        let meta = CallMeta::completed(started.elapsed());

        match &result {
            Ok(value) => match guarded(|| Ok(to_output(value))) {
                Ok(output) => {
                    self.capture_llm_call(trace, &input, Ok(&output), &meta);
                }
                Err(err) => self.capture_failed("llm_call", &err),
            },
            Err(err) => {
                self.capture_llm_call(trace, &input, Err(err), &meta);
            }
        }
        result
    }

    /// Wrap a chunk stream so one terminal event is recorded when it ends:
    /// the `llm_call`, or an `error` in its place when the stream failed.
    pub fn intercept_stream<S, C, E>(
        &self,
        trace: Option<TraceHandle>,
        input: CallInput,
        stream: S,
    ) -> CapturedStream<S>
    where
        S: Stream<Item = Result<C, E>> + Unpin,
        C: ChunkView,
        E: fmt::Display,
    {
        let trace = Self::resolve_trace(trace);
        let observer = self.clone();
        CapturedStream::new(
            stream,
            Box::new(move |summary: StreamSummary| {
                observer.capture(trace, "llm_call", |adapter| {
                    Ok(match summary.failure {
                        Some(failure) => adapter.llm_call_failed(
                            &input,
                            Some(&summary.output),
                            failure,
                            &summary.meta,
                        ),
                        None => adapter.llm_call(&input, Ok(&summary.output), &summary.meta),
                    })
                });
            }),
        )
    }

    // ------------------------------------------------------------------
    // Flushing
    // ------------------------------------------------------------------

    /// Deliver everything buffered.
    pub async fn flush(&self) -> FlushReport {
        self.inner.pipeline.flush().await
    }

    /// End open sampled traces with outcome `shutdown`, stop the background
    /// flusher and make a final flush. Idempotent.
    pub async fn shutdown(&self) -> FlushReport {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return FlushReport::default();
        }

        for handle in self.inner.registry.open_traces() {
            self.end_trace(&handle, SHUTDOWN_OUTCOME).await;
        }

        let flusher = self
            .inner
            .flusher
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(mut flusher) = flusher {
            flusher.stop().await;
        }

        let report = self.flush().await;
        debug!(
            delivered = report.delivered,
            dropped = report.dropped,
            "Observer shut down"
        );
        report
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("tenant", &self.inner.tenant)
            .field("open_traces", &self.inner.registry.len())
            .field("redaction", &self.inner.gate.has_redactor())
            .field("pending", &self.pending())
            .field("correlation", &self.correlation)
            .finish()
    }
}

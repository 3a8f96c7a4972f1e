// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-instance registry of open traces.
//!
//! Owns the span tree of every open trace: which span ids exist, which one
//! new captures nest under, and the last timestamp handed out. All methods
//! take the lock briefly and never across an `.await`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use super::handle::{TraceHandle, TraceOptions};
use crate::event::{Correlation, EventStamp, EventType, SpanId, TraceId};

/// How many ended trace ids are remembered for duplicate-end detection.
pub const ENDED_CAPACITY: usize = 1024;

#[derive(Debug)]
struct TraceState {
    root_span: SpanId,
    /// Open span stack; the root is never popped.
    stack: Vec<SpanId>,
    /// Spans whose events have been constructed.
    known: HashSet<SpanId>,
    sampled: bool,
    event_count: u64,
    error_count: u64,
    last_error: Option<String>,
    started: Instant,
    last_timestamp: DateTime<Utc>,
    correlation: Correlation,
    name: Option<String>,
}

impl TraceState {
    /// Timestamps are strictly increasing within a trace.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = if now > self.last_timestamp {
            now
        } else {
            self.last_timestamp + ChronoDuration::microseconds(1)
        };
        self.last_timestamp = ts;
        ts
    }

    fn resolve_parent(&self, explicit: Option<SpanId>) -> SpanId {
        match explicit {
            Some(parent) if self.known.contains(&parent) => parent,
            _ => self.stack.last().copied().unwrap_or(self.root_span),
        }
    }
}

/// Identifiers for a new trace's `trace_start` event.
#[derive(Debug, Clone)]
pub struct TraceStart {
    pub handle: TraceHandle,
    pub stamp: EventStamp,
    pub correlation: Correlation,
}

/// Identifiers and correlation for one capture inside an open trace.
#[derive(Debug, Clone)]
pub struct Stamped {
    pub stamp: EventStamp,
    pub correlation: Correlation,
    pub sampled: bool,
}

/// Everything needed to emit a trace's `trace_end` event.
#[derive(Debug, Clone)]
pub struct TraceSummary {
    pub stamp: EventStamp,
    pub correlation: Correlation,
    pub sampled: bool,
    pub name: Option<String>,
    pub duration_ms: u64,
    pub event_count: u64,
    pub error_count: u64,
    pub last_error: Option<String>,
}

/// Why `end` did not produce a summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndRejection {
    AlreadyEnded,
    Unknown,
}

#[derive(Debug, Default)]
struct RegistryInner {
    open: HashMap<TraceId, TraceState>,
    ended: VecDeque<TraceId>,
    ended_set: HashSet<TraceId>,
}

impl RegistryInner {
    fn remember_ended(&mut self, id: TraceId) {
        if self.ended.len() >= ENDED_CAPACITY {
            if let Some(evicted) = self.ended.pop_front() {
                self.ended_set.remove(&evicted);
            }
        }
        self.ended.push_back(id);
        self.ended_set.insert(id);
    }
}

/// Registry of open traces for one SDK instance.
#[derive(Debug, Default)]
pub struct TraceRegistry {
    inner: Mutex<RegistryInner>,
}

impl TraceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open a new trace with a fixed sampling decision.
    pub fn begin(&self, options: &TraceOptions, sampled: bool) -> TraceStart {
        let trace_id = TraceId::new();
        let root_span = SpanId::new();
        let timestamp = Utc::now();

        let mut known = HashSet::new();
        known.insert(root_span);

        let state = TraceState {
            root_span,
            stack: vec![root_span],
            known,
            sampled,
            event_count: 1,
            error_count: 0,
            last_error: None,
            started: Instant::now(),
            last_timestamp: timestamp,
            correlation: options.correlation.clone(),
            name: options.name.clone(),
        };
        self.lock().open.insert(trace_id, state);

        TraceStart {
            handle: TraceHandle::new(trace_id, sampled),
            stamp: EventStamp {
                trace_id,
                span_id: root_span,
                parent_span_id: None,
                timestamp,
            },
            correlation: options.correlation.clone(),
        }
    }

    /// Allocate identifiers for a capture in an open trace.
    ///
    /// Returns `None` when the trace is not open.
    pub fn stamp(
        &self,
        trace_id: TraceId,
        event_type: EventType,
        explicit_parent: Option<SpanId>,
        correlation: &Correlation,
        error_message: Option<&str>,
    ) -> Option<Stamped> {
        let mut inner = self.lock();
        let state = inner.open.get_mut(&trace_id)?;

        let span_id = SpanId::new();
        let parent = state.resolve_parent(explicit_parent);
        let timestamp = state.next_timestamp();
        state.known.insert(span_id);
        state.event_count += 1;
        if event_type == EventType::Error {
            state.error_count += 1;
            if let Some(message) = error_message {
                state.last_error = Some(message.to_string());
            }
        }

        Some(Stamped {
            stamp: EventStamp {
                trace_id,
                span_id,
                parent_span_id: Some(parent),
                timestamp,
            },
            correlation: correlation.or(&state.correlation),
            sampled: state.sampled,
        })
    }

    /// The span a new capture in this trace would nest under.
    pub fn open_span(&self, trace_id: TraceId, explicit_parent: Option<SpanId>) -> Option<SpanId> {
        let inner = self.lock();
        inner
            .open
            .get(&trace_id)
            .map(|state| state.resolve_parent(explicit_parent))
    }

    /// Make an already-recorded span the parent of subsequent captures.
    ///
    /// Returns false if the trace is not open or the span is not part of it.
    pub fn push_span(&self, trace_id: TraceId, span_id: SpanId) -> bool {
        let mut inner = self.lock();
        match inner.open.get_mut(&trace_id) {
            Some(state) if state.known.contains(&span_id) => {
                state.stack.push(span_id);
                true
            }
            _ => false,
        }
    }

    /// Undo the last [`push_span`](Self::push_span). The root span stays.
    pub fn pop_span(&self, trace_id: TraceId) -> Option<SpanId> {
        let mut inner = self.lock();
        let state = inner.open.get_mut(&trace_id)?;
        if state.stack.len() > 1 {
            state.stack.pop()
        } else {
            None
        }
    }

    /// Close a trace and return its `trace_end` identifiers and counters.
    pub fn end(&self, trace_id: TraceId) -> Result<TraceSummary, EndRejection> {
        let mut inner = self.lock();
        let Some(mut state) = inner.open.remove(&trace_id) else {
            return Err(if inner.ended_set.contains(&trace_id) {
                EndRejection::AlreadyEnded
            } else {
                EndRejection::Unknown
            });
        };
        inner.remember_ended(trace_id);

        let timestamp = state.next_timestamp();
        Ok(TraceSummary {
            stamp: EventStamp {
                trace_id,
                span_id: SpanId::new(),
                parent_span_id: Some(state.root_span),
                timestamp,
            },
            correlation: state.correlation,
            sampled: state.sampled,
            name: state.name,
            duration_ms: state.started.elapsed().as_millis() as u64,
            event_count: state.event_count,
            error_count: state.error_count,
            last_error: state.last_error,
        })
    }

    /// Sampling decision of an open trace.
    pub fn is_sampled(&self, trace_id: TraceId) -> Option<bool> {
        self.lock().open.get(&trace_id).map(|s| s.sampled)
    }

    pub fn is_open(&self, trace_id: TraceId) -> bool {
        self.lock().open.contains_key(&trace_id)
    }

    /// Handles of every open trace.
    pub fn open_traces(&self) -> Vec<TraceHandle> {
        self.lock()
            .open
            .iter()
            .map(|(id, state)| TraceHandle::new(*id, state.sampled))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Identifiers for a capture that belongs to no trace.
pub fn orphan_stamp() -> EventStamp {
    EventStamp {
        trace_id: TraceId::new(),
        span_id: SpanId::new(),
        parent_span_id: None,
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start(registry: &TraceRegistry) -> TraceStart {
        registry.begin(&TraceOptions::named("test"), true)
    }

    #[test]
    fn test_begin_registers_root() {
        let registry = TraceRegistry::new();
        let started = start(&registry);

        assert!(registry.is_open(started.handle.id()));
        assert_eq!(started.stamp.parent_span_id, None);
        assert_eq!(
            registry.open_span(started.handle.id(), None),
            Some(started.stamp.span_id)
        );
    }

    #[test]
    fn test_stamp_defaults_to_root_parent() {
        let registry = TraceRegistry::new();
        let started = start(&registry);
        let id = started.handle.id();

        let stamped = registry
            .stamp(id, EventType::LlmCall, None, &Correlation::default(), None)
            .unwrap();
        assert_eq!(stamped.stamp.trace_id, id);
        assert_eq!(stamped.stamp.parent_span_id, Some(started.stamp.span_id));
        assert_ne!(stamped.stamp.span_id, started.stamp.span_id);
    }

    #[test]
    fn test_unknown_explicit_parent_falls_back() {
        let registry = TraceRegistry::new();
        let started = start(&registry);
        let id = started.handle.id();

        let stranger = SpanId::new();
        let stamped = registry
            .stamp(id, EventType::ToolCall, Some(stranger), &Correlation::default(), None)
            .unwrap();
        assert_eq!(stamped.stamp.parent_span_id, Some(started.stamp.span_id));
    }

    #[test]
    fn test_push_and_pop_span() {
        let registry = TraceRegistry::new();
        let started = start(&registry);
        let id = started.handle.id();

        let agent = registry
            .stamp(id, EventType::AgentCreate, None, &Correlation::default(), None)
            .unwrap();
        assert!(registry.push_span(id, agent.stamp.span_id));
        assert!(!registry.push_span(id, SpanId::new()));

        let child = registry
            .stamp(id, EventType::LlmCall, None, &Correlation::default(), None)
            .unwrap();
        assert_eq!(child.stamp.parent_span_id, Some(agent.stamp.span_id));

        assert_eq!(registry.pop_span(id), Some(agent.stamp.span_id));
        assert_eq!(registry.pop_span(id), None);
    }

    #[test]
    fn test_timestamps_strictly_increase() {
        let registry = TraceRegistry::new();
        let started = start(&registry);
        let id = started.handle.id();

        let mut last = started.stamp.timestamp;
        for _ in 0..200 {
            let stamped = registry
                .stamp(id, EventType::LlmCall, None, &Correlation::default(), None)
                .unwrap();
            assert!(stamped.stamp.timestamp > last);
            last = stamped.stamp.timestamp;
        }
        let summary = registry.end(id).unwrap();
        assert!(summary.stamp.timestamp > last);
    }

    #[test]
    fn test_correlation_merges_with_trace() {
        let registry = TraceRegistry::new();
        let options = TraceOptions::named("t").with_user_id("u-1").with_route("/a");
        let started = registry.begin(&options, true);

        let call_site = Correlation {
            route: Some("/b".to_string()),
            ..Correlation::default()
        };
        let stamped = registry
            .stamp(started.handle.id(), EventType::LlmCall, None, &call_site, None)
            .unwrap();
        assert_eq!(stamped.correlation.user_id.as_deref(), Some("u-1"));
        assert_eq!(stamped.correlation.route.as_deref(), Some("/b"));
    }

    #[test]
    fn test_end_summarizes_and_rejects_repeat() {
        let registry = TraceRegistry::new();
        let started = start(&registry);
        let id = started.handle.id();

        registry.stamp(id, EventType::LlmCall, None, &Correlation::default(), None);
        registry.stamp(
            id,
            EventType::Error,
            None,
            &Correlation::default(),
            Some("boom"),
        );

        let summary = registry.end(id).unwrap();
        assert_eq!(summary.event_count, 3);
        assert_eq!(summary.error_count, 1);
        assert_eq!(summary.last_error.as_deref(), Some("boom"));
        assert_eq!(summary.name.as_deref(), Some("test"));
        assert_eq!(summary.stamp.parent_span_id, Some(started.stamp.span_id));

        assert_eq!(registry.end(id).unwrap_err(), EndRejection::AlreadyEnded);
        assert_eq!(
            registry.end(TraceId::new()).unwrap_err(),
            EndRejection::Unknown
        );
        assert!(registry
            .stamp(id, EventType::LlmCall, None, &Correlation::default(), None)
            .is_none());
    }

    #[test]
    fn test_ended_ring_is_bounded() {
        let registry = TraceRegistry::new();
        let first = start(&registry).handle.id();
        registry.end(first).unwrap();

        for _ in 0..ENDED_CAPACITY {
            let id = start(&registry).handle.id();
            registry.end(id).unwrap();
        }

        assert_eq!(registry.end(first).unwrap_err(), EndRejection::Unknown);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_open_traces() {
        let registry = TraceRegistry::new();
        let a = registry.begin(&TraceOptions::new(), true).handle;
        let b = registry.begin(&TraceOptions::new(), false).handle;

        let mut open = registry.open_traces();
        open.sort_by_key(|h| h.id().to_string());
        let mut expected = vec![a, b];
        expected.sort_by_key(|h| h.id().to_string());
        assert_eq!(open, expected);
        assert_eq!(registry.is_sampled(b.id()), Some(false));
    }
}

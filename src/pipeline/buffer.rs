// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Pending-event buffer and batch planning.

use std::collections::HashMap;
use std::mem;
use std::sync::{Mutex, MutexGuard};

use crate::event::{CanonicalEvent, TraceId};

#[derive(Debug, Default)]
struct BufferInner {
    traces: HashMap<TraceId, Vec<CanonicalEvent>>,
    /// Trace ids in first-arrival order.
    order: Vec<TraceId>,
    pending: usize,
}

/// Events waiting for delivery, grouped by trace.
#[derive(Debug)]
pub struct EventBuffer {
    inner: Mutex<BufferInner>,
    threshold: usize,
}

impl EventBuffer {
    pub fn new(threshold: usize) -> Self {
        Self {
            inner: Mutex::new(BufferInner::default()),
            threshold: threshold.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BufferInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append an event. Returns true when the pending count has reached the
    /// flush threshold.
    pub fn push(&self, event: CanonicalEvent) -> bool {
        let mut inner = self.lock();
        let trace_id = event.trace_id();
        match inner.traces.get_mut(&trace_id) {
            Some(events) => events.push(event),
            None => {
                inner.order.push(trace_id);
                inner.traces.insert(trace_id, vec![event]);
            }
        }
        inner.pending += 1;
        inner.pending >= self.threshold
    }

    pub fn len(&self) -> usize {
        self.lock().pending
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take every pending event, grouped by trace in arrival order.
    ///
    /// The buffer is empty afterwards; events pushed later belong to the
    /// next drain.
    pub fn drain_all(&self) -> Vec<Vec<CanonicalEvent>> {
        let BufferInner {
            mut traces, order, ..
        } = mem::take(&mut *self.lock());

        order
            .into_iter()
            .filter_map(|id| traces.remove(&id))
            .map(sort_by_timestamp)
            .collect()
    }

    /// Take the traces that can be delivered without splitting them: those
    /// `is_open` rejects, plus open traces already holding more than
    /// `max_open` events.
    ///
    /// `is_open` is called without the buffer lock held.
    pub fn drain_settled<F>(&self, is_open: F, max_open: usize) -> Vec<Vec<CanonicalEvent>>
    where
        F: Fn(TraceId) -> bool,
    {
        let sizes: Vec<(TraceId, usize)> = {
            let inner = self.lock();
            inner
                .order
                .iter()
                .map(|id| (*id, inner.traces.get(id).map_or(0, Vec::len)))
                .collect()
        };
        let settled: Vec<TraceId> = sizes
            .into_iter()
            .filter(|(id, len)| *len > max_open || !is_open(*id))
            .map(|(id, _)| id)
            .collect();
        if settled.is_empty() {
            return Vec::new();
        }

        let mut inner = self.lock();
        let mut groups = Vec::with_capacity(settled.len());
        for id in &settled {
            if let Some(events) = inner.traces.remove(id) {
                inner.pending -= events.len();
                groups.push(sort_by_timestamp(events));
            }
        }
        inner.order.retain(|id| !settled.contains(id));
        groups
    }

    /// Take the pending events of one trace.
    pub fn drain_trace(&self, trace_id: TraceId) -> Vec<CanonicalEvent> {
        let mut inner = self.lock();
        let Some(events) = inner.traces.remove(&trace_id) else {
            return Vec::new();
        };
        inner.order.retain(|id| *id != trace_id);
        inner.pending -= events.len();
        drop(inner);
        sort_by_timestamp(events)
    }
}

fn sort_by_timestamp(mut events: Vec<CanonicalEvent>) -> Vec<CanonicalEvent> {
    events.sort_by_key(|e| e.timestamp());
    events
}

/// Pack trace groups into batches of at most `max_batch_size` events.
///
/// A trace is only split when it alone exceeds the ceiling.
pub fn plan_batches(groups: Vec<Vec<CanonicalEvent>>, max_batch_size: usize) -> Vec<Vec<CanonicalEvent>> {
    let max = max_batch_size.max(1);
    let mut batches = Vec::new();
    let mut current: Vec<CanonicalEvent> = Vec::new();

    for group in groups {
        if group.is_empty() {
            continue;
        }
        if group.len() > max {
            if !current.is_empty() {
                batches.push(mem::take(&mut current));
            }
            let mut rest = group;
            while rest.len() > max {
                let tail = rest.split_off(max);
                batches.push(rest);
                rest = tail;
            }
            current = rest;
            continue;
        }
        if current.len() + group.len() > max {
            batches.push(mem::take(&mut current));
        }
        current.extend(group);
    }

    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Flushing: draining the buffer into batches and delivering them, on demand
//! or from a background task.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use super::buffer::{plan_batches, EventBuffer};
use crate::delivery::{Deliverer, DeliveryReport};
use crate::event::{CanonicalEvent, TraceId};

/// Totals for one flush.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlushReport {
    pub batches: usize,
    pub delivered: usize,
    pub dropped: usize,
}

impl FlushReport {
    fn from_reports(reports: &[DeliveryReport]) -> Self {
        reports.iter().fold(Self::default(), |mut acc, report| {
            acc.batches += 1;
            if report.is_delivered() {
                acc.delivered += report.events;
            } else {
                acc.dropped += report.events;
            }
            acc
        })
    }

    pub fn is_empty(&self) -> bool {
        self.batches == 0
    }
}

/// Whether a trace may still receive events.
pub type OpenTraces = Arc<dyn Fn(TraceId) -> bool + Send + Sync>;

/// The buffer plus everything needed to empty it.
#[derive(Clone)]
pub struct Pipeline {
    buffer: Arc<EventBuffer>,
    deliverer: Deliverer,
    max_batch_size: usize,
    open_traces: OpenTraces,
}

impl Pipeline {
    pub fn new(buffer: Arc<EventBuffer>, deliverer: Deliverer, max_batch_size: usize) -> Self {
        Self {
            buffer,
            deliverer,
            max_batch_size,
            open_traces: Arc::new(|_| false),
        }
    }

    /// Hold back open traces from background flushes.
    pub fn with_open_traces(mut self, open_traces: OpenTraces) -> Self {
        self.open_traces = open_traces;
        self
    }

    pub fn buffer(&self) -> &EventBuffer {
        &self.buffer
    }

    async fn deliver_groups(&self, groups: Vec<Vec<CanonicalEvent>>) -> FlushReport {
        let batches = plan_batches(groups, self.max_batch_size);
        if batches.is_empty() {
            return FlushReport::default();
        }
        let reports = self.deliverer.deliver_all(batches).await;
        let report = FlushReport::from_reports(&reports);
        debug!(
            batches = report.batches,
            delivered = report.delivered,
            dropped = report.dropped,
            "Flushed buffer"
        );
        report
    }

    /// Deliver everything currently buffered.
    pub async fn flush(&self) -> FlushReport {
        let groups = self.buffer.drain_all();
        self.deliver_groups(groups).await
    }

    /// Deliver ended traces and orphans. An open trace stays buffered until
    /// it ends, unless it alone already exceeds a batch.
    pub async fn flush_settled(&self) -> FlushReport {
        let groups = self
            .buffer
            .drain_settled(|id| (self.open_traces)(id), self.max_batch_size);
        self.deliver_groups(groups).await
    }

    /// Deliver one trace's buffered events, leaving other traces queued.
    pub async fn flush_trace(&self, trace_id: TraceId) -> FlushReport {
        let events = self.buffer.drain_trace(trace_id);
        self.deliver_groups(vec![events]).await
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("buffer", &self.buffer)
            .field("deliverer", &self.deliverer)
            .field("max_batch_size", &self.max_batch_size)
            .finish_non_exhaustive()
    }
}

/// Background task flushing settled traces on an interval or when woken.
#[derive(Debug)]
pub struct BackgroundFlusher {
    wake: Arc<Notify>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundFlusher {
    /// Spawn the task on the current tokio runtime.
    ///
    /// Returns `None` outside a runtime; flushing then only happens on
    /// explicit calls.
    pub fn spawn(pipeline: Pipeline, interval: Duration) -> Option<Self> {
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        let wake = Arc::new(Notify::new());
        let (shutdown, mut shutdown_rx) = oneshot::channel::<()>();

        let task_wake = wake.clone();
        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => trace!("Interval flush"),
                    _ = task_wake.notified() => trace!("Threshold flush"),
                    _ = &mut shutdown_rx => break,
                }
                pipeline.flush_settled().await;
            }
        });

        Some(Self {
            wake,
            shutdown: Some(shutdown),
            handle: Some(handle),
        })
    }

    /// Request a flush as soon as the task is idle.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    /// Stop the task, letting an in-flight flush finish.
    pub async fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for BackgroundFlusher {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Retrying batch delivery.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use tokio::time::sleep;
use tracing::{debug, error, warn};

use super::retry::RetryPolicy;
use super::transport::Transport;
use crate::capture::panic_message;
use crate::error::DeliveryError;
use crate::event::{CanonicalEvent, TraceId};
use crate::telemetry::PipelineStats;

/// A batch that was given up on.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryFailure {
    pub error: DeliveryError,
    pub attempts: u32,
    pub events: usize,
    /// Traces with at least one event in the dropped batch.
    pub trace_ids: Vec<TraceId>,
}

impl fmt::Display for DeliveryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dropped {} events after {} attempt(s): {}",
            self.events, self.attempts, self.error
        )
    }
}

/// Caller-supplied hook receiving each delivery failure once.
pub type ErrorCallback = Arc<dyn Fn(&DeliveryFailure) + Send + Sync>;

/// Outcome of delivering one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReport {
    pub events: usize,
    pub attempts: u32,
    pub failure: Option<DeliveryFailure>,
}

impl DeliveryReport {
    pub fn is_delivered(&self) -> bool {
        self.failure.is_none()
    }
}

fn trace_ids(batch: &[CanonicalEvent]) -> Vec<TraceId> {
    let mut ids: Vec<TraceId> = Vec::new();
    for event in batch {
        if !ids.contains(&event.trace_id()) {
            ids.push(event.trace_id());
        }
    }
    ids
}

/// Delivers batches through a [`Transport`] with bounded retries.
#[derive(Clone)]
pub struct Deliverer {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    stats: Arc<PipelineStats>,
    on_error: Option<ErrorCallback>,
}

impl Deliverer {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy, stats: Arc<PipelineStats>) -> Self {
        Self {
            transport,
            policy,
            stats,
            on_error: None,
        }
    }

    pub fn with_error_callback(mut self, callback: ErrorCallback) -> Self {
        self.on_error = Some(callback);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Deliver one batch.
    ///
    /// Retryable failures are retried up to the policy's attempt limit. A
    /// batch that is given up on is reported exactly once: an `error!` log
    /// line plus the error callback.
    pub async fn deliver(&self, batch: Vec<CanonicalEvent>) -> DeliveryReport {
        let events = batch.len();
        if events == 0 {
            return DeliveryReport {
                events,
                attempts: 0,
                failure: None,
            };
        }

        let max_attempts = self.policy.max_attempts.max(1);
        let started = Instant::now();
        let mut attempt = 0u32;

        let error = loop {
            attempt += 1;
            match self.transport.send(&batch).await {
                Ok(()) => {
                    self.stats.record_batch_sent(events, started.elapsed());
                    debug!(events, attempts = attempt, "Delivered batch");
                    return DeliveryReport {
                        events,
                        attempts: attempt,
                        failure: None,
                    };
                }
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let delay = self.policy.delay_for(attempt - 1);
                    self.stats.record_retry();
                    debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Delivery attempt failed, retrying"
                    );
                    sleep(delay).await;
                }
                Err(err) => break err,
            }
        };

        let failure = DeliveryFailure {
            error,
            attempts: attempt,
            events,
            trace_ids: trace_ids(&batch),
        };
        self.report(&failure);
        DeliveryReport {
            events,
            attempts: attempt,
            failure: Some(failure),
        }
    }

    /// Deliver batches one after another.
    pub async fn deliver_all(&self, batches: Vec<Vec<CanonicalEvent>>) -> Vec<DeliveryReport> {
        let mut reports = Vec::with_capacity(batches.len());
        for batch in batches {
            reports.push(self.deliver(batch).await);
        }
        reports
    }

    fn report(&self, failure: &DeliveryFailure) {
        self.stats.record_batch_failed(failure.events);
        error!(
            events = failure.events,
            attempts = failure.attempts,
            status = ?failure.error.status(),
            error = %failure.error,
            "Dropping telemetry batch"
        );

        if let Some(callback) = &self.on_error {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(failure))) {
                warn!(error = %panic_message(payload.as_ref()), "Error callback panicked");
            }
        }
    }
}

impl fmt::Debug for Deliverer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deliverer")
            .field("policy", &self.policy)
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::MemoryTransport;
    use crate::event::{Attributes, Correlation, Environment, EventStamp, EventType, SpanId, TenantContext};
    use chrono::Utc;
    use std::sync::Mutex;
    use std::time::Duration;

    fn batch(n: usize) -> Vec<CanonicalEvent> {
        let tenant = TenantContext::new("t", "p", Environment::Dev);
        let trace_id = TraceId::new();
        (0..n)
            .map(|_| {
                CanonicalEvent::assemble(
                    &tenant,
                    EventStamp {
                        trace_id,
                        span_id: SpanId::new(),
                        parent_span_id: None,
                        timestamp: Utc::now(),
                    },
                    Correlation::default(),
                    EventType::LlmCall,
                    Attributes::new(),
                )
                .unwrap()
            })
            .collect()
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new()
            .with_max_attempts(max_attempts)
            .with_initial_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(2))
    }

    fn deliverer(transport: Arc<MemoryTransport>, max_attempts: u32) -> (Deliverer, Arc<Mutex<Vec<DeliveryFailure>>>) {
        let failures = Arc::new(Mutex::new(Vec::new()));
        let sink = failures.clone();
        let deliverer = Deliverer::new(transport, fast_policy(max_attempts), Arc::new(PipelineStats::new()))
            .with_error_callback(Arc::new(move |f: &DeliveryFailure| sink.lock().unwrap().push(f.clone())));
        (deliverer, failures)
    }

    fn server_error() -> DeliveryError {
        DeliveryError::from_status(500, "boom")
    }

    #[tokio::test]
    async fn test_recovers_within_budget() {
        let transport = Arc::new(MemoryTransport::new().fail_with([server_error(), server_error()]));
        let (deliverer, failures) = deliverer(transport.clone(), 3);

        let report = deliverer.deliver(batch(2)).await;
        assert!(report.is_delivered());
        assert_eq!(report.attempts, 3);
        assert_eq!(transport.events().len(), 2);
        assert!(failures.lock().unwrap().is_empty());
        assert_eq!(deliverer.stats.snapshot().retries, 2);
    }

    #[tokio::test]
    async fn test_gives_up_with_one_diagnostic() {
        let transport = Arc::new(MemoryTransport::new().fail_with(vec![server_error(); 5]));
        let (deliverer, failures) = deliverer(transport.clone(), 3);

        let report = deliverer.deliver(batch(4)).await;
        assert!(!report.is_delivered());
        assert_eq!(transport.attempts(), 3);

        let failures = failures.lock().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].events, 4);
        assert_eq!(failures[0].attempts, 3);
        assert_eq!(failures[0].trace_ids.len(), 1);
        assert_eq!(deliverer.stats.snapshot().events_dropped, 4);
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let transport = Arc::new(MemoryTransport::new().fail_with([DeliveryError::from_status(401, "bad key")]));
        let (deliverer, failures) = deliverer(transport.clone(), 3);

        let report = deliverer.deliver(batch(1)).await;
        assert_eq!(report.attempts, 1);
        assert_eq!(transport.attempts(), 1);
        assert_eq!(failures.lock().unwrap()[0].error.status(), Some(401));
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let transport = Arc::new(MemoryTransport::new());
        let (deliverer, _) = deliverer(transport.clone(), 3);
        let report = deliverer.deliver(Vec::new()).await;
        assert_eq!(report.attempts, 0);
        assert_eq!(transport.attempts(), 0);
    }

    #[tokio::test]
    async fn test_callback_panic_is_contained() {
        let transport = Arc::new(MemoryTransport::new().fail_with([DeliveryError::from_status(400, "")]));
        let deliverer = Deliverer::new(transport, fast_policy(1), Arc::new(PipelineStats::new()))
            .with_error_callback(Arc::new(|_: &DeliveryFailure| panic!("callback bug")));
        let report = deliverer.deliver(batch(1)).await;
        assert!(!report.is_delivered());
    }
}

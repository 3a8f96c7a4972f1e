// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Benchmarks for the capture hot path.
//!
//! These cover the work done synchronously on the caller's task:
//! - Text truncation
//! - Chunk shape detection
//! - Batch planning
//! - Capture through an instance into an in-memory transport
//!
//! Run with: `cargo bench --bench pipeline`

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use std::hint::black_box;
use std::sync::Arc;

use llmscope::capture::truncate;
use llmscope::event::{Attributes, Correlation, Environment, EventStamp, SpanId};
use llmscope::pipeline::plan_batches;
use llmscope::stream::ChunkView;
use llmscope::{
    CallInput, CallMeta, CallOutput, CanonicalEvent, EventType, MemoryTransport, Observer,
    ObserverConfig, TenantContext, TraceId, TraceOptions,
};

fn bench_truncate(c: &mut Criterion) {
    let mut group = c.benchmark_group("truncate");

    for size in [1_000usize, 50_000, 500_000] {
        let text = "lorem ipsum dolor sit amet ".repeat(size / 27 + 1);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &text, |b, text| {
            b.iter(|| truncate(black_box(text), black_box(50_000)));
        });
    }

    group.finish();
}

fn bench_chunk_shape(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk_shape");
    group.throughput(Throughput::Elements(1));

    let chat = json!({"choices": [{"delta": {"content": "Hello"}, "finish_reason": null}]});
    let message = json!({"type": "content_block_delta", "delta": {"type": "text_delta", "text": "Hello"}});
    let response = json!({"type": "response.output_text.delta", "delta": "Hello"});
    let unknown = json!({"data": [1, 2, 3]});

    group.bench_function("chat_delta", |b| b.iter(|| black_box(&chat).shape()));
    group.bench_function("message_event", |b| b.iter(|| black_box(&message).shape()));
    group.bench_function("response_event", |b| b.iter(|| black_box(&response).shape()));
    group.bench_function("unknown", |b| b.iter(|| black_box(&unknown).shape()));

    group.finish();
}

fn events(traces: usize, per_trace: usize) -> Vec<Vec<CanonicalEvent>> {
    let tenant = TenantContext::new("t", "p", Environment::Prod);
    (0..traces)
        .map(|_| {
            let trace_id = TraceId::new();
            (0..per_trace)
                .map(|_| {
                    CanonicalEvent::assemble(
                        &tenant,
                        EventStamp {
                            trace_id,
                            span_id: SpanId::new(),
                            parent_span_id: None,
                            timestamp: chrono::Utc::now(),
                        },
                        Correlation::default(),
                        EventType::ToolCall,
                        Attributes::new(),
                    )
                    .unwrap()
                })
                .collect()
        })
        .collect()
}

fn bench_plan_batches(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_batches");

    for (traces, per_trace) in [(10usize, 10usize), (100, 20), (20, 600)] {
        let groups = events(traces, per_trace);
        group.throughput(Throughput::Elements((traces * per_trace) as u64));
        group.bench_with_input(
            BenchmarkId::new("traces", format!("{traces}x{per_trace}")),
            &groups,
            |b, groups| b.iter(|| plan_batches(black_box(groups.clone()), 500)),
        );
    }

    group.finish();
}

fn bench_capture(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let observer = runtime.block_on(async {
        Observer::builder(ObserverConfig::new("sk-bench").with_tenant("t", "p"))
            .with_transport(Arc::new(MemoryTransport::new()))
            .build()
            .unwrap()
    });
    let input = CallInput::new("gpt-4o", json!([{"role": "user", "content": "hello"}]));
    let output = CallOutput::text("Hi! How can I help you today?").with_finish_reason("stop");

    let mut group = c.benchmark_group("capture");
    group.throughput(Throughput::Elements(1));

    group.bench_function("llm_call_in_trace", |b| {
        let trace = observer.start_trace(TraceOptions::named("bench"));
        b.iter(|| {
            observer.capture_llm_call(
                Some(trace),
                black_box(&input),
                Ok(black_box(&output)),
                &CallMeta::default(),
            )
        });
    });

    group.bench_function("orphan_llm_call", |b| {
        b.iter(|| {
            observer.capture_llm_call(None, black_box(&input), Ok(black_box(&output)), &CallMeta::default())
        });
    });

    group.finish();
    runtime.block_on(observer.shutdown());
}

criterion_group!(
    benches,
    bench_truncate,
    bench_chunk_shape,
    bench_plan_batches,
    bench_capture
);
criterion_main!(benches);

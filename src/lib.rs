// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! llmscope - client-side telemetry for LLM provider calls.
//!
//! Wraps model, embedding and tool calls, records each one as a canonical
//! event grouped into traces, and ships the events in batches to an ingestion
//! endpoint. Capture never changes what the wrapped call returns, and a
//! failure inside the telemetry path never reaches the caller.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`types`] - Provider-facing types and the [`Provider`] traits that get instrumented
//! - [`error`] - Error types and result aliases
//! - [`config`] - Options, environment loading and tenant resolution
//! - [`event`] - The canonical event model
//! - [`context`] - Trace handles and per-trace span/timestamp bookkeeping
//! - [`capture`] - Turning calls into event drafts (truncation, classification, cost)
//! - [`stream`] - Chunk shapes and the pass-through stream interceptor
//! - [`pipeline`] - Sampling, redaction, buffering, batching and flushing
//! - [`delivery`] - HTTP transport with bounded retries
//! - [`instrument`] - Drop-in wrappers for provider clients
//! - [`observer`] - The SDK instance tying it all together
//! - [`telemetry`] - The crate's own logging setup and pipeline counters
//!
//! # Example
//!
//! ```rust,ignore
//! use llmscope::{Observer, ObserverConfig, TraceOptions};
//!
//! let observer = Observer::new(ObserverConfig::from_env()?)?;
//! let provider = observer.wrap(my_client);
//!
//! let trace = observer.start_trace(TraceOptions::named("support-chat").with_user_id("u-42"));
//! let response = trace.scope(provider.chat(&messages, None, None)).await?;
//! observer.end_trace(&trace, "success").await;
//!
//! observer.shutdown().await;
//! ```

pub mod capture;
pub mod config;
pub mod context;
pub mod delivery;
pub mod error;
pub mod event;
pub mod instrument;
pub mod observer;
pub mod pipeline;
pub mod stream;
pub mod telemetry;
pub mod types;

// Re-export commonly used types at crate root
pub use capture::{CallInput, CallMeta, CallOutput, Failure, FailureKind, Feedback};
pub use config::{Mode, ObserverConfig};
pub use context::{TraceHandle, TraceOptions};
pub use delivery::{DeliveryFailure, HttpTransport, MemoryTransport, RetryPolicy, Transport};
pub use error::{CaptureError, ConfigError, DeliveryError, ProviderError, Result};
pub use event::{
    Attributes, CanonicalEvent, Correlation, Environment, EventType, SpanId, TenantContext,
    TraceId,
};
pub use instrument::{InstrumentedEmbedder, InstrumentedProvider};
pub use observer::{Observer, ObserverBuilder};
pub use pipeline::{FlushReport, PatternRedactor, Redactor};
pub use telemetry::{init_logging, LogConfig, StatsSnapshot};
pub use types::{
    EmbeddingProvider, EventStream, Message, Provider, ProviderResponse, Role, StopReason,
    StreamEvent, TokenUsage, ToolCall, ToolDefinition,
};

/// llmscope version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

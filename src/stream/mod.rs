// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Stream interception.
//!
//! Wraps a provider's chunk stream so the consumer sees exactly the original
//! items while a single `llm_call` capture is produced at the end.

mod chunk;
mod interceptor;

pub use chunk::{ChatDelta, ChunkShape, ChunkView, MessageEvent, ResponseEvent, ToolCallStart};
pub use interceptor::{CapturedStream, Finalizer, StreamPhase, StreamSummary};

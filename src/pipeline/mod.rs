// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The path from a stamped draft to a delivered batch.
//!
//! ```text
//! draft ─▶ Gate (redact, validate) ─▶ EventBuffer ─▶ plan_batches ─▶ Deliverer
//!                                         ▲
//!                  BackgroundFlusher ─────┘ (interval, threshold, shutdown)
//! ```

mod buffer;
mod flusher;
mod gate;

pub use buffer::{plan_batches, EventBuffer};
pub use flusher::{BackgroundFlusher, FlushReport, OpenTraces, Pipeline};
pub use gate::{Gate, PatternRedactor, Redactor, Sampler};

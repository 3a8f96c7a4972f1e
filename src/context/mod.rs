// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Trace context management.
//!
//! A trace is one logical unit of work. Every capture inside it receives a
//! fresh span id, a parent that already exists in the same trace, and a
//! timestamp later than every previous one in the trace.
//!
//! Callers hold a [`TraceHandle`] explicitly, or run work inside
//! [`TraceHandle::scope`] so captures pick it up implicitly.

mod handle;
mod registry;

pub use handle::{TraceHandle, TraceOptions};
pub use registry::{
    orphan_stamp, EndRejection, Stamped, TraceRegistry, TraceStart, TraceSummary, ENDED_CAPACITY,
};

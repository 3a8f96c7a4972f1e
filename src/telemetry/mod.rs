// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The SDK's own observability: log setup and pipeline counters.
//!
//! - **Logging**: the SDK emits `tracing` events (`debug!` per captured event
//!   in development mode, `warn!` for dropped captures, `error!` for delivery
//!   failures). [`init_logging`] installs a subscriber when the host
//!   application has none.
//! - **Statistics**: [`PipelineStats`] counts what each stage accepted,
//!   dropped, delivered or retried, per SDK instance.

mod init;
mod stats;

pub use init::{init_logging, LogConfig, LogFormat, LOG_ENV};
pub use stats::{Histogram, PipelineStats, StatsSnapshot};

// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Capture adapters.
//!
//! Turn normalized call data into event drafts: provider inference, text
//! truncation, failure classification and cost estimation all happen here,
//! before identifiers are assigned.

mod adapters;
mod call;
mod classify;
mod guard;
mod pricing;
mod provider;
mod truncate;

pub use adapters::{clamp_rating, CaptureAdapter, Feedback};
pub use call::{CallInput, CallMeta, CallOutput};
pub use classify::{classify, Failure, FailureKind, NormalizedOutput};
pub use guard::guarded;
pub(crate) use guard::panic_message;
pub use pricing::{estimate_cost, price_for, ModelPrice};
pub use provider::{infer_provider, resolve_provider, UNKNOWN_PROVIDER};
pub use truncate::{truncate, truncate_value, TRUNCATION_MARKER};

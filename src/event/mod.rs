// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Canonical event model.
//!
//! Every captured operation ends up as a [`CanonicalEvent`]: tenant context,
//! trace/span identifiers, a capture timestamp, an [`EventType`], optional
//! correlation fields and an open attribute map.
//!
//! Capture adapters produce [`EventDraft`]s. The trace context manager stamps
//! them with identifiers and time ([`EventStamp`]) and
//! [`CanonicalEvent::assemble`] validates the result.

mod ids;
pub mod keys;
mod types;

pub use ids::{SpanId, TraceId};
pub use types::{
    Attributes, CanonicalEvent, Correlation, Environment, EventDraft, EventStamp, EventType,
    ParseEnvironmentError, TenantContext,
};

// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Delivery client.
//!
//! Batches are POSTed as a JSON array to `<api_url>/api/v1/events/ingest`
//! with `Authorization: Bearer <api_key>`. Network errors, timeouts and 5xx
//! responses are retried with exponential backoff and jitter; 4xx responses
//! are not. A batch that cannot be delivered is dropped and reported once.

mod client;
mod retry;
mod transport;

pub use client::{Deliverer, DeliveryFailure, DeliveryReport, ErrorCallback};
pub use retry::RetryPolicy;
pub use transport::{HttpTransport, MemoryTransport, Transport};

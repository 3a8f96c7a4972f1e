// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Panic isolation for telemetry work.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::error::CaptureError;

/// Run telemetry work so that neither its error nor its panic escapes.
///
/// The closure only ever builds telemetry from borrowed call data; nothing it
/// touches is observed again after a panic.
pub fn guarded<T, F>(f: F) -> Result<T, CaptureError>
where
    F: FnOnce() -> Result<T, CaptureError>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(CaptureError::Panicked(panic_message(payload.as_ref()))),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

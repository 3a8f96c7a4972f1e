// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Free-text truncation.

use std::borrow::Cow;

use serde_json::Value;

/// Appended to every truncated field.
pub const TRUNCATION_MARKER: &str = "...[truncated]";

/// Cut `text` to `max_chars` characters and append [`TRUNCATION_MARKER`].
///
/// Characters are Unicode scalar values. Text at or under the limit is
/// returned unchanged.
pub fn truncate(text: &str, max_chars: usize) -> Cow<'_, str> {
    match text.char_indices().nth(max_chars) {
        None => Cow::Borrowed(text),
        Some((cut, _)) => {
            let mut out = String::with_capacity(cut + TRUNCATION_MARKER.len());
            out.push_str(&text[..cut]);
            out.push_str(TRUNCATION_MARKER);
            Cow::Owned(out)
        }
    }
}

/// Truncate every string inside a JSON value, recursively.
pub fn truncate_value(value: Value, max_chars: usize) -> Value {
    match value {
        Value::String(s) => match truncate(&s, max_chars) {
            Cow::Borrowed(_) => Value::String(s),
            Cow::Owned(cut) => Value::String(cut),
        },
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| truncate_value(v, max_chars))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, truncate_value(v, max_chars)))
                .collect(),
        ),
        other => other,
    }
}

// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Sampling and redaction gate.
//!
//! Every draft passes through here on its way to the buffer. Sampling is
//! decided once per trace; redaction rewrites attributes and fails open;
//! validation drops events with missing identifiers.

use std::borrow::Cow;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use serde_json::Value;
use tracing::warn;

use crate::capture::panic_message;
use crate::error::RedactionError;
use crate::event::{Attributes, CanonicalEvent, Correlation, EventDraft, EventStamp, EventType, TenantContext};
use crate::telemetry::PipelineStats;

/// Probability-based sampling decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampler {
    rate: f64,
}

impl Sampler {
    /// Create a sampler; the rate is clamped to `[0, 1]` and NaN never samples.
    pub fn new(rate: f64) -> Self {
        let rate = if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) };
        Self { rate }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Decide once. Rate 0 never samples and rate 1 always does.
    pub fn decide(&self) -> bool {
        if self.rate >= 1.0 {
            true
        } else if self.rate <= 0.0 {
            false
        } else {
            rand::thread_rng().gen_bool(self.rate)
        }
    }
}

/// A caller-supplied transform applied to every event's attributes.
///
/// The event type, identifiers and timestamp are not exposed and cannot be
/// changed.
pub trait Redactor: Send + Sync {
    fn redact(&self, event_type: EventType, attributes: Attributes) -> Result<Attributes, RedactionError>;
}

impl<F> Redactor for F
where
    F: Fn(EventType, Attributes) -> Result<Attributes, RedactionError> + Send + Sync,
{
    fn redact(&self, event_type: EventType, attributes: Attributes) -> Result<Attributes, RedactionError> {
        self(event_type, attributes)
    }
}

struct Rule {
    pattern: Regex,
    replacement: String,
}

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("email pattern")
});
static BEARER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bbearer\s+[A-Za-z0-9\-._~+/]+=*").expect("bearer pattern")
});
static API_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:sk|pk|rk)-[A-Za-z0-9_-]{16,}|\bAKIA[0-9A-Z]{16}\b").expect("api key pattern")
});

/// Built-in redactor that masks e-mail addresses, bearer tokens and
/// API-key-looking strings anywhere in string attributes.
pub struct PatternRedactor {
    rules: Vec<Rule>,
}

impl PatternRedactor {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Rule {
                    pattern: BEARER.clone(),
                    replacement: "Bearer [REDACTED]".to_string(),
                },
                Rule {
                    pattern: API_KEY.clone(),
                    replacement: "[REDACTED_KEY]".to_string(),
                },
                Rule {
                    pattern: EMAIL.clone(),
                    replacement: "[REDACTED_EMAIL]".to_string(),
                },
            ],
        }
    }

    /// Add a custom rule.
    pub fn with_pattern(mut self, pattern: Regex, replacement: impl Into<String>) -> Self {
        self.rules.push(Rule {
            pattern,
            replacement: replacement.into(),
        });
        self
    }

    fn mask<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let mut out = Cow::Borrowed(text);
        for rule in &self.rules {
            let replaced = match rule.pattern.replace_all(&out, rule.replacement.as_str()) {
                Cow::Owned(replaced) => Some(replaced),
                Cow::Borrowed(_) => None,
            };
            if let Some(replaced) = replaced {
                out = Cow::Owned(replaced);
            }
        }
        out
    }

    fn mask_value(&self, value: Value) -> Value {
        match value {
            Value::String(s) => match self.mask(&s) {
                Cow::Borrowed(_) => Value::String(s),
                Cow::Owned(masked) => Value::String(masked),
            },
            Value::Array(items) => Value::Array(items.into_iter().map(|v| self.mask_value(v)).collect()),
            Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, self.mask_value(v))).collect())
            }
            other => other,
        }
    }
}

impl Default for PatternRedactor {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PatternRedactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternRedactor")
            .field("rules", &self.rules.len())
            .finish()
    }
}

impl Redactor for PatternRedactor {
    fn redact(&self, _event_type: EventType, attributes: Attributes) -> Result<Attributes, RedactionError> {
        Ok(attributes
            .into_iter()
            .map(|(k, v)| (k, self.mask_value(v)))
            .collect())
    }
}

/// Redaction and validation for one SDK instance.
#[derive(Clone, Default)]
pub struct Gate {
    redactor: Option<Arc<dyn Redactor>>,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_redactor(mut self, redactor: Arc<dyn Redactor>) -> Self {
        self.redactor = Some(redactor);
        self
    }

    pub fn has_redactor(&self) -> bool {
        self.redactor.is_some()
    }

    /// Apply the redactor; on error or panic the attributes pass unchanged.
    fn redact(&self, event_type: EventType, attributes: Attributes, stats: &PipelineStats) -> Attributes {
        let Some(redactor) = &self.redactor else {
            return attributes;
        };

        let input = attributes.clone();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| redactor.redact(event_type, input)));
        match outcome {
            Ok(Ok(redacted)) => redacted,
            Ok(Err(err)) => {
                stats.record_redaction_failure();
                warn!(event_type = %event_type, error = %err, "Redaction failed; event sent unredacted");
                attributes
            }
            Err(payload) => {
                stats.record_redaction_failure();
                warn!(
                    event_type = %event_type,
                    error = %panic_message(payload.as_ref()),
                    "Redactor panicked; event sent unredacted"
                );
                attributes
            }
        }
    }

    /// Turn a stamped draft into a canonical event, or drop it.
    pub fn admit(
        &self,
        tenant: &TenantContext,
        stamp: EventStamp,
        correlation: Correlation,
        draft: EventDraft,
        stats: &PipelineStats,
    ) -> Option<CanonicalEvent> {
        let attributes = self.redact(draft.event_type, draft.attributes, stats);
        match CanonicalEvent::assemble(tenant, stamp, correlation, draft.event_type, attributes) {
            Ok(event) => Some(event),
            Err(err) => {
                stats.record_invalid();
                warn!(event_type = %draft.event_type, error = %err, "Dropping invalid event");
                None
            }
        }
    }
}

impl fmt::Debug for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gate")
            .field("redactor", &self.redactor.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Environment, SpanId, TraceId};
    use chrono::Utc;
    use serde_json::json;

    fn tenant() -> TenantContext {
        TenantContext::new("t", "p", Environment::Dev)
    }

    fn stamp() -> EventStamp {
        EventStamp {
            trace_id: TraceId::new(),
            span_id: SpanId::new(),
            parent_span_id: None,
            timestamp: Utc::now(),
        }
    }

    fn draft() -> EventDraft {
        EventDraft::new(EventType::LlmCall).attr("output", "mail me at jane@example.com")
    }

    #[test]
    fn test_sampler_bounds() {
        assert!((0..1000).all(|_| Sampler::new(1.0).decide()));
        assert!((0..1000).all(|_| !Sampler::new(0.0).decide()));
        assert_eq!(Sampler::new(3.0).rate(), 1.0);
        assert_eq!(Sampler::new(f64::NAN).rate(), 0.0);
    }

    #[test]
    fn test_sampler_rate_is_roughly_honored() {
        let sampler = Sampler::new(0.5);
        let hits = (0..10_000).filter(|_| sampler.decide()).count();
        assert!((4_000..6_000).contains(&hits), "{hits}");
    }

    #[test]
    fn test_pattern_redactor() {
        let redactor = PatternRedactor::new();
        let mut attrs = Attributes::new();
        attrs.insert("input".into(), json!([{"content": "key sk-abcdefghijklmnopqrstuvwx please"}]));
        attrs.insert("header".into(), json!("Authorization: Bearer abc.def.ghi"));
        attrs.insert("output".into(), json!("contact jane.doe@example.com"));
        attrs.insert("tokens".into(), json!(12));

        let out = redactor.redact(EventType::LlmCall, attrs).unwrap();
        assert_eq!(out["input"][0]["content"], "key [REDACTED_KEY] please");
        assert_eq!(out["header"], "Authorization: Bearer [REDACTED]");
        assert_eq!(out["output"], "contact [REDACTED_EMAIL]");
        assert_eq!(out["tokens"], 12);
    }

    #[test]
    fn test_custom_rule() {
        let redactor = PatternRedactor::new()
            .with_pattern(Regex::new(r"\d{3}-\d{2}-\d{4}").unwrap(), "[SSN]");
        let mut attrs = Attributes::new();
        attrs.insert("input".into(), json!("ssn 123-45-6789"));
        let out = redactor.redact(EventType::LlmCall, attrs).unwrap();
        assert_eq!(out["input"], "ssn [SSN]");
    }

    #[test]
    fn test_gate_applies_redactor() {
        let gate = Gate::new().with_redactor(Arc::new(PatternRedactor::new()));
        let stats = PipelineStats::new();
        let event = gate
            .admit(&tenant(), stamp(), Correlation::default(), draft(), &stats)
            .unwrap();
        assert_eq!(event.attr("output").unwrap(), "mail me at [REDACTED_EMAIL]");
    }

    #[test]
    fn test_gate_fails_open_on_error() {
        let failing = |_: EventType, _: Attributes| -> Result<Attributes, RedactionError> {
            Err(RedactionError::new("nope"))
        };
        let gate = Gate::new().with_redactor(Arc::new(failing));
        let stats = PipelineStats::new();
        let event = gate
            .admit(&tenant(), stamp(), Correlation::default(), draft(), &stats)
            .unwrap();
        assert_eq!(event.attr("output").unwrap(), "mail me at jane@example.com");
        assert_eq!(stats.snapshot().redaction_failures, 1);
    }

    #[test]
    fn test_gate_fails_open_on_panic() {
        let panicking = |_: EventType, _: Attributes| -> Result<Attributes, RedactionError> {
            panic!("redactor bug")
        };
        let gate = Gate::new().with_redactor(Arc::new(panicking));
        let stats = PipelineStats::new();
        let event = gate.admit(&tenant(), stamp(), Correlation::default(), draft(), &stats);
        assert!(event.is_some());
        assert_eq!(stats.snapshot().redaction_failures, 1);
    }

    #[test]
    fn test_gate_drops_invalid() {
        let gate = Gate::new();
        let stats = PipelineStats::new();
        let bad_tenant = TenantContext::new("", "p", Environment::Dev);
        let event = gate.admit(&bad_tenant, stamp(), Correlation::default(), draft(), &stats);
        assert!(event.is_none());
        assert_eq!(stats.snapshot().events_invalid, 1);
    }
}

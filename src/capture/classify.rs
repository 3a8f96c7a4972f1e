// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Failure classification for completed calls.
//!
//! A response can arrive without an error and still be a failure: the
//! provider marked it failed, filtered it, cut it off, or sent nothing.

use std::fmt;

use crate::error::ProviderError;

/// Provider statuses that mean the response failed.
const FAILED_STATUSES: &[&str] = &["failed", "error", "cancelled", "incomplete"];

/// Finish reasons that mean the content was filtered.
const FILTERED_REASONS: &[&str] = &[
    "content_filter",
    "content_filtered",
    "safety",
    "blocked",
    "recitation",
];

/// Finish reasons that mean the response hit a length limit.
const LENGTH_REASONS: &[&str] = &["length", "max_tokens", "max_output_tokens"];

/// The fixed set of failure kinds recorded in `error` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    EmptyResponse,
    ContentFiltered,
    ResponseTruncated,
    ProviderFailed,
    StreamCancelled,
}

impl FailureKind {
    /// Value of the `error_type` attribute.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmptyResponse => "empty_response",
            Self::ContentFiltered => "content_filtered",
            Self::ResponseTruncated => "response_truncated",
            Self::ProviderFailed => "provider_failed",
            Self::StreamCancelled => "stream_cancelled",
        }
    }

    /// Value of the `error_category` attribute.
    pub fn category(&self) -> &'static str {
        match self {
            Self::EmptyResponse | Self::ResponseTruncated => "response_quality",
            Self::ContentFiltered => "safety",
            Self::ProviderFailed => "provider",
            Self::StreamCancelled => "client",
        }
    }

    /// Default `error_code` when the provider did not supply one.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyResponse => "EMPTY_RESPONSE",
            Self::ContentFiltered => "CONTENT_FILTERED",
            Self::ResponseTruncated => "RESPONSE_TRUNCATED",
            Self::ProviderFailed => "PROVIDER_FAILED",
            Self::StreamCancelled => "STREAM_CANCELLED",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure, ready to become an `error` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub code: String,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: kind.code().to_string(),
            message: message.into(),
        }
    }

    /// Failure for an error the provider call itself returned.
    pub fn from_provider_error(err: &ProviderError) -> Self {
        Self {
            kind: FailureKind::ProviderFailed,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }
}

/// The parts of a response that classification looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedOutput {
    pub content: String,
    pub finish_reason: Option<String>,
    pub status: Option<String>,
    pub tool_call_count: usize,
}

fn matches_any(value: Option<&str>, set: &[&str]) -> bool {
    value
        .map(|v| v.trim().to_ascii_lowercase())
        .is_some_and(|v| set.contains(&v.as_str()))
}

/// Classify a completed response.
///
/// Precedence: filtered content, length cut-off, provider-reported failure,
/// empty response. A specific reason beats the generic status that often
/// accompanies it. Returns `None` for a successful response.
pub fn classify(output: &NormalizedOutput) -> Option<Failure> {
    let status = output.status.as_deref();
    let reason = output.finish_reason.as_deref();

    if matches_any(reason, FILTERED_REASONS) {
        let reason = reason.unwrap_or_default();
        return Some(Failure::new(
            FailureKind::ContentFiltered,
            format!("Response blocked by content filter ({reason})"),
        ));
    }
    if matches_any(reason, LENGTH_REASONS) {
        let reason = reason.unwrap_or_default();
        return Some(Failure::new(
            FailureKind::ResponseTruncated,
            format!("Response cut off at the token limit ({reason})"),
        ));
    }
    if matches_any(status, FAILED_STATUSES) {
        let status = status.unwrap_or_default();
        return Some(Failure::new(
            FailureKind::ProviderFailed,
            format!("Provider reported status '{status}'"),
        ));
    }
    if output.content.trim().is_empty() && output.tool_call_count == 0 {
        return Some(Failure::new(
            FailureKind::EmptyResponse,
            "Response contained no content and no tool calls",
        ));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(content: &str, reason: Option<&str>, status: Option<&str>) -> NormalizedOutput {
        NormalizedOutput {
            content: content.to_string(),
            finish_reason: reason.map(String::from),
            status: status.map(String::from),
            tool_call_count: 0,
        }
    }

    #[test]
    fn test_success() {
        assert_eq!(classify(&output("hi", Some("stop"), Some("completed"))), None);
    }

    #[test]
    fn test_empty_response() {
        let failure = classify(&output("  \n", Some("stop"), None)).unwrap();
        assert_eq!(failure.kind, FailureKind::EmptyResponse);
        assert_eq!(failure.code, "EMPTY_RESPONSE");
    }

    #[test]
    fn test_empty_with_tool_calls_is_success() {
        let mut out = output("", Some("tool_calls"), None);
        out.tool_call_count = 1;
        assert_eq!(classify(&out), None);
    }

    #[test]
    fn test_content_filtered() {
        for reason in ["content_filter", "SAFETY", "recitation", "blocked"] {
            let failure = classify(&output("partial", Some(reason), None)).unwrap();
            assert_eq!(failure.kind, FailureKind::ContentFiltered, "{reason}");
        }
    }

    #[test]
    fn test_truncated() {
        for reason in ["length", "max_tokens", "max_output_tokens"] {
            let failure = classify(&output("partial", Some(reason), None)).unwrap();
            assert_eq!(failure.kind, FailureKind::ResponseTruncated, "{reason}");
        }
    }

    #[test]
    fn test_precedence() {
        // finish reason beats status beats emptiness
        let failure = classify(&output("", Some("content_filter"), Some("failed"))).unwrap();
        assert_eq!(failure.kind, FailureKind::ContentFiltered);

        let failure = classify(&output("half", Some("max_output_tokens"), Some("incomplete")))
            .unwrap();
        assert_eq!(failure.kind, FailureKind::ResponseTruncated);

        let failure = classify(&output("", Some("stop"), Some("failed"))).unwrap();
        assert_eq!(failure.kind, FailureKind::ProviderFailed);

        let failure = classify(&output("", Some("length"), None)).unwrap();
        assert_eq!(failure.kind, FailureKind::ResponseTruncated);
    }

    #[test]
    fn test_failure_from_provider_error() {
        let err = ProviderError::RateLimited("slow down".to_string());
        let failure = Failure::from_provider_error(&err);
        assert_eq!(failure.kind, FailureKind::ProviderFailed);
        assert_eq!(failure.code, "RATE_LIMITED");
        assert!(failure.message.contains("slow down"));
    }

    #[test]
    fn test_kind_strings() {
        assert_eq!(FailureKind::StreamCancelled.to_string(), "stream_cancelled");
        assert_eq!(FailureKind::ContentFiltered.category(), "safety");
    }
}

// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for llmscope.
//!
//! This module provides strongly-typed errors for each stage of the capture
//! pipeline, using `thiserror` for the definitions and `anyhow` for
//! propagation at the edges.
//!
//! None of these errors ever reach the caller of an instrumented provider
//! call. Capture, redaction and delivery failures are logged and counted;
//! only [`ConfigError`] and [`DecodeError`] surface, at initialization.

use thiserror::Error;

/// Errors that can occur inside a provider collaborator.
///
/// These are the errors the *instrumented* call produces. The capture layer
/// observes them and hands them back to the caller untouched.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("API error: {message}")]
    ApiError {
        message: String,
        status_code: Option<u16>,
    },

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Response parsing error: {0}")]
    ParseError(String),

    #[error("Streaming error: {0}")]
    StreamError(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl ProviderError {
    /// Create an API error with status code.
    pub fn api(message: impl Into<String>, status_code: u16) -> Self {
        Self::ApiError {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Short machine-readable code used in `error` events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthError(_) => "AUTH_ERROR",
            Self::ApiError { .. } => "API_ERROR",
            Self::RateLimited(_) => "RATE_LIMITED",
            Self::NetworkError(_) => "NETWORK_ERROR",
            Self::ParseError(_) => "PARSE_ERROR",
            Self::StreamError(_) => "STREAM_ERROR",
            Self::UnsupportedOperation(_) => "UNSUPPORTED",
            Self::Timeout(_) => "TIMEOUT",
        }
    }
}

/// Errors raised while building or classifying a telemetry event.
///
/// Always swallowed: logged, counted, and never surfaced to the caller of the
/// instrumented call.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Telemetry builder panicked: {0}")]
    Panicked(String),

    #[error("Failed to serialize captured value: {0}")]
    Serialization(String),

    #[error("Event rejected: {0}")]
    Invalid(#[from] ValidationError),
}

impl From<serde_json::Error> for CaptureError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// A locally malformed event. Dropped before buffering; never sent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required identifier: {0}")]
    MissingIdentifier(&'static str),

    #[error("Parent span {parent} is not part of trace {trace}")]
    UnknownParent { parent: String, trace: String },
}

/// Errors returned by a caller-supplied redaction transform.
#[derive(Error, Debug)]
#[error("Redaction failed: {0}")]
pub struct RedactionError(pub String);

impl RedactionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors that can occur while delivering a batch to the ingestion endpoint.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    #[error("Server error {status}: {body}")]
    Server { status: u16, body: String },

    #[error("Request rejected {status}: {body}")]
    Client { status: u16, body: String },

    #[error("Unexpected response {status}: {body}")]
    Unexpected { status: u16, body: String },

    #[error("Failed to encode batch: {0}")]
    Serialization(String),
}

impl DeliveryError {
    /// Build the error matching an unsuccessful HTTP status.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            400..=499 => Self::Client { status, body },
            500..=599 => Self::Server { status, body },
            _ => Self::Unexpected { status, body },
        }
    }

    /// Check if this error is retryable.
    ///
    /// Network failures, timeouts and 5xx responses are transient. A 4xx means
    /// bad auth or a malformed batch, and retrying would only repeat it. Any
    /// other status (a redirect, say) will not change on retry either.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout(_) | Self::Server { .. }
        )
    }

    /// HTTP status, when the endpoint answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Server { status, .. }
            | Self::Client { status, .. }
            | Self::Unexpected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Errors decoding a JWT-style API key payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("API key is not a JWT (expected three dot-separated segments)")]
    NotJwt,

    #[error("API key payload is not valid base64: {0}")]
    InvalidBase64(String),

    #[error("API key payload is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("API key payload is missing required field: {0}")]
    MissingField(&'static str),
}

/// Errors that can occur during configuration resolution.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Invalid API key: {0}")]
    InvalidKey(#[from] DecodeError),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Result type alias using anyhow for flexible error handling.
pub type Result<T> = anyhow::Result<T>;

// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration type definitions.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::event::Environment;

/// Default ingestion endpoint.
pub const DEFAULT_API_URL: &str = "https://api.llmscope.dev";

/// Default character budget for captured free text.
pub const DEFAULT_MAX_RESPONSE_CHARS: usize = 50_000;

/// Logging behavior of the SDK.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Verbose local logging of every captured event.
    Development,
    /// Silent except errors.
    #[default]
    Production,
}

impl Mode {
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(ConfigError::invalid("mode", format!("unknown mode '{other}'"))),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// Options recognized by [`Observer::new`](crate::Observer::new).
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObserverConfig {
    /// JWT-style key encoding tenant/project, or an opaque key.
    pub api_key: String,

    /// Required only when `api_key` is not a JWT encoding it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,

    /// Required only when `api_key` is not a JWT encoding it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,

    /// Overrides the key's environment. Falls back to `dev`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,

    pub api_url: String,
    pub mode: Mode,

    /// Probability in [0, 1] that a trace is kept.
    pub sample_rate: f64,

    /// Character budget for captured free text.
    pub max_response_chars: usize,

    /// Pending-event count that triggers a flush.
    pub flush_threshold: usize,

    /// Periodic flush interval in milliseconds.
    pub flush_interval_ms: u64,

    /// Upper bound on events per delivered request.
    pub max_batch_size: usize,

    /// Total delivery attempts per batch, including the first.
    pub max_attempts: u32,

    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,

    /// Per-attempt HTTP timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            tenant_id: None,
            project_id: None,
            environment: None,
            api_url: DEFAULT_API_URL.to_string(),
            mode: Mode::default(),
            sample_rate: 1.0,
            max_response_chars: DEFAULT_MAX_RESPONSE_CHARS,
            flush_threshold: 100,
            flush_interval_ms: 5_000,
            max_batch_size: 500,
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            request_timeout_ms: 10_000,
        }
    }
}

// The API key never reaches logs.
impl fmt::Debug for ObserverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverConfig")
            .field("api_key", &"<redacted>")
            .field("tenant_id", &self.tenant_id)
            .field("project_id", &self.project_id)
            .field("environment", &self.environment)
            .field("api_url", &self.api_url)
            .field("mode", &self.mode)
            .field("sample_rate", &self.sample_rate)
            .field("max_response_chars", &self.max_response_chars)
            .field("flush_threshold", &self.flush_threshold)
            .field("flush_interval_ms", &self.flush_interval_ms)
            .field("max_batch_size", &self.max_batch_size)
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl ObserverConfig {
    /// Create a config with just an API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    /// Set explicit tenant and project (legacy, non-JWT keys).
    pub fn with_tenant(mut self, tenant_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_sample_rate(mut self, rate: f64) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn with_max_response_chars(mut self, chars: usize) -> Self {
        self.max_response_chars = chars;
        self
    }

    pub fn with_flush_threshold(mut self, threshold: usize) -> Self {
        self.flush_threshold = threshold;
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set initial and maximum retry backoff.
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff_ms = initial.as_millis() as u64;
        self.max_backoff_ms = max.as_millis() as u64;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Ingestion endpoint for batches.
    pub fn ingest_url(&self) -> String {
        format!("{}/api/v1/events/ingest", self.api_url.trim_end_matches('/'))
    }

    /// Check value ranges. Tenant resolution happens separately.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingField("apiKey".to_string()));
        }
        if !(0.0..=1.0).contains(&self.sample_rate) || self.sample_rate.is_nan() {
            return Err(ConfigError::invalid(
                "sampleRate",
                format!("{} is outside [0, 1]", self.sample_rate),
            ));
        }
        if self.max_response_chars == 0 {
            return Err(ConfigError::invalid("maxResponseChars", "must be greater than 0"));
        }
        if self.flush_threshold == 0 {
            return Err(ConfigError::invalid("flushThreshold", "must be greater than 0"));
        }
        if self.max_batch_size == 0 {
            return Err(ConfigError::invalid("maxBatchSize", "must be greater than 0"));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("maxAttempts", "must be at least 1"));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::invalid("requestTimeoutMs", "must be greater than 0"));
        }
        if self.flush_interval_ms == 0 {
            return Err(ConfigError::invalid("flushIntervalMs", "must be greater than 0"));
        }
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            return Err(ConfigError::invalid("apiUrl", "must be an http(s) URL"));
        }
        Ok(())
    }
}

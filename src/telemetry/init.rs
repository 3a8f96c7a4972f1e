// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Log subscriber initialization.
//!
//! The SDK itself only emits `tracing` events. Applications that have no
//! subscriber of their own can install one matching the SDK mode.

use std::io;

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::Mode;

/// Environment variable overriding the computed filter.
pub const LOG_ENV: &str = "LLMSCOPE_LOG";

/// Line layout of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One short line per event.
    Compact,
    /// Fields and span context on every line.
    Full,
}

/// How SDK log output is filtered and laid out.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Level for `llmscope` targets.
    pub sdk_level: Level,
    /// Level for everything else (the host application, reqwest, hyper).
    pub host_level: Level,
    pub format: LogFormat,
    pub ansi: bool,
    /// Include file and line.
    pub source_location: bool,
    /// Log span close with timing.
    pub span_timing: bool,
    /// Replaces the computed directive entirely.
    pub directive: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::for_mode(Mode::default())
    }
}

impl LogConfig {
    /// Preset for an SDK mode.
    ///
    /// Development logs each captured event and flush at debug; production
    /// only surfaces warnings and dropped batches.
    pub fn for_mode(mode: Mode) -> Self {
        match mode {
            Mode::Development => Self {
                sdk_level: Level::DEBUG,
                host_level: Level::WARN,
                format: LogFormat::Full,
                ansi: true,
                source_location: true,
                span_timing: false,
                directive: None,
            },
            Mode::Production => Self {
                sdk_level: Level::WARN,
                host_level: Level::WARN,
                format: LogFormat::Compact,
                ansi: false,
                source_location: false,
                span_timing: false,
                directive: None,
            },
        }
    }

    /// Everything the SDK does, down to per-chunk tracing.
    pub fn testing() -> Self {
        Self {
            sdk_level: Level::TRACE,
            span_timing: true,
            ansi: false,
            ..Self::for_mode(Mode::Development)
        }
    }

    pub fn with_sdk_level(mut self, level: Level) -> Self {
        self.sdk_level = level;
        self
    }

    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directive = Some(directive.into());
        self
    }

    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi = ansi;
        self
    }

    /// The `EnvFilter` directive this config stands for.
    pub fn filter_directive(&self) -> String {
        match &self.directive {
            Some(directive) => directive.clone(),
            None => format!(
                "{},{}={}",
                self.host_level.as_str().to_lowercase(),
                env!("CARGO_CRATE_NAME"),
                self.sdk_level.as_str().to_lowercase()
            ),
        }
    }

    fn env_filter(&self) -> EnvFilter {
        // LLMSCOPE_LOG wins over the preset
        EnvFilter::try_from_env(LOG_ENV)
            .or_else(|_| EnvFilter::try_new(self.filter_directive()))
            .unwrap_or_else(|_| EnvFilter::new(self.host_level.as_str()))
    }
}

/// Install a global `tracing` subscriber.
///
/// Fails if a global subscriber is already set.
///
/// # Example
///
/// ```rust,ignore
/// use llmscope::config::Mode;
/// use llmscope::telemetry::{init_logging, LogConfig};
///
/// init_logging(&LogConfig::for_mode(Mode::Development))?;
/// ```
pub fn init_logging(config: &LogConfig) -> io::Result<()> {
    let span_events = if config.span_timing {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let layer = fmt::layer()
        .with_ansi(config.ansi)
        .with_target(config.format == LogFormat::Full)
        .with_file(config.source_location)
        .with_line_number(config.source_location)
        .with_span_events(span_events);

    let registry = tracing_subscriber::registry().with(config.env_filter());
    let result = match config.format {
        LogFormat::Compact => registry.with(layer.compact()).try_init(),
        LogFormat::Full => registry.with(layer).try_init(),
    };
    result.map_err(|e| io::Error::new(io::ErrorKind::AlreadyExists, e.to_string()))
}

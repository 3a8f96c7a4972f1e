// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration loading from environment variables.

use crate::error::ConfigError;
use crate::event::Environment;

use super::types::ObserverConfig;

/// Prefix shared by every recognized environment variable.
pub const ENV_PREFIX: &str = "LLMSCOPE_";

/// Environment variables read by [`load_from_env`], in documentation order.
pub const ENV_VARS: &[&str] = &[
    "LLMSCOPE_API_KEY",
    "LLMSCOPE_TENANT_ID",
    "LLMSCOPE_PROJECT_ID",
    "LLMSCOPE_ENVIRONMENT",
    "LLMSCOPE_API_URL",
    "LLMSCOPE_MODE",
    "LLMSCOPE_SAMPLE_RATE",
    "LLMSCOPE_MAX_RESPONSE_CHARS",
    "LLMSCOPE_FLUSH_THRESHOLD",
    "LLMSCOPE_FLUSH_INTERVAL_MS",
    "LLMSCOPE_MAX_BATCH_SIZE",
    "LLMSCOPE_MAX_ATTEMPTS",
    "LLMSCOPE_REQUEST_TIMEOUT_MS",
];

/// Build a config from the process environment.
pub fn load_from_env() -> Result<ObserverConfig, ConfigError> {
    load_with(|name| std::env::var(name).ok())
}

/// Build a config from an arbitrary variable lookup.
///
/// Unset variables keep their defaults; set-but-unparseable ones are errors.
pub fn load_with<F>(lookup: F) -> Result<ObserverConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |suffix: &str| {
        lookup(&format!("{ENV_PREFIX}{suffix}"))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let mut config = ObserverConfig::default();

    config.api_key = get("API_KEY").ok_or_else(|| ConfigError::MissingField("LLMSCOPE_API_KEY".to_string()))?;
    config.tenant_id = get("TENANT_ID");
    config.project_id = get("PROJECT_ID");

    if let Some(env) = get("ENVIRONMENT") {
        let parsed = env
            .parse::<Environment>()
            .map_err(|e| ConfigError::invalid("LLMSCOPE_ENVIRONMENT", e.to_string()))?;
        config.environment = Some(parsed);
    }
    if let Some(url) = get("API_URL") {
        config.api_url = url;
    }
    if let Some(mode) = get("MODE") {
        config.mode = mode.parse()?;
    }
    if let Some(rate) = get("SAMPLE_RATE") {
        config.sample_rate = parse_num("LLMSCOPE_SAMPLE_RATE", &rate)?;
    }
    if let Some(v) = get("MAX_RESPONSE_CHARS") {
        config.max_response_chars = parse_num("LLMSCOPE_MAX_RESPONSE_CHARS", &v)?;
    }
    if let Some(v) = get("FLUSH_THRESHOLD") {
        config.flush_threshold = parse_num("LLMSCOPE_FLUSH_THRESHOLD", &v)?;
    }
    if let Some(v) = get("FLUSH_INTERVAL_MS") {
        config.flush_interval_ms = parse_num("LLMSCOPE_FLUSH_INTERVAL_MS", &v)?;
    }
    if let Some(v) = get("MAX_BATCH_SIZE") {
        config.max_batch_size = parse_num("LLMSCOPE_MAX_BATCH_SIZE", &v)?;
    }
    if let Some(v) = get("MAX_ATTEMPTS") {
        config.max_attempts = parse_num("LLMSCOPE_MAX_ATTEMPTS", &v)?;
    }
    if let Some(v) = get("REQUEST_TIMEOUT_MS") {
        config.request_timeout_ms = parse_num("LLMSCOPE_REQUEST_TIMEOUT_MS", &v)?;
    }

    Ok(config)
}

fn parse_num<T>(field: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| ConfigError::invalid(field, format!("'{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Mode;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_env_vars_share_prefix() {
        assert!(ENV_VARS.iter().all(|v| v.starts_with(ENV_PREFIX)));
    }

    #[test]
    fn test_load_requires_api_key() {
        let err = load_with(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(_)));

        let err = load_with(lookup(&[("LLMSCOPE_API_KEY", "   ")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(_)));
    }

    #[test]
    fn test_load_all_fields() {
        let config = load_with(lookup(&[
            ("LLMSCOPE_API_KEY", "sk-1"),
            ("LLMSCOPE_TENANT_ID", "t"),
            ("LLMSCOPE_PROJECT_ID", "p"),
            ("LLMSCOPE_ENVIRONMENT", "prod"),
            ("LLMSCOPE_API_URL", "http://localhost:9000"),
            ("LLMSCOPE_MODE", "development"),
            ("LLMSCOPE_SAMPLE_RATE", "0.5"),
            ("LLMSCOPE_MAX_RESPONSE_CHARS", "1000"),
            ("LLMSCOPE_FLUSH_THRESHOLD", "10"),
            ("LLMSCOPE_FLUSH_INTERVAL_MS", "250"),
            ("LLMSCOPE_MAX_BATCH_SIZE", "20"),
            ("LLMSCOPE_MAX_ATTEMPTS", "5"),
            ("LLMSCOPE_REQUEST_TIMEOUT_MS", "1500"),
        ]))
        .unwrap();

        assert_eq!(config.api_key, "sk-1");
        assert_eq!(config.tenant_id.as_deref(), Some("t"));
        assert_eq!(config.environment, Some(Environment::Prod));
        assert_eq!(config.api_url, "http://localhost:9000");
        assert_eq!(config.mode, Mode::Development);
        assert_eq!(config.sample_rate, 0.5);
        assert_eq!(config.max_response_chars, 1000);
        assert_eq!(config.flush_threshold, 10);
        assert_eq!(config.flush_interval_ms, 250);
        assert_eq!(config.max_batch_size, 20);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.request_timeout_ms, 1500);
    }

    #[test]
    fn test_load_rejects_bad_numbers() {
        let err = load_with(lookup(&[
            ("LLMSCOPE_API_KEY", "sk-1"),
            ("LLMSCOPE_SAMPLE_RATE", "often"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("LLMSCOPE_SAMPLE_RATE"));
    }

    #[test]
    fn test_load_rejects_bad_environment() {
        let err = load_with(lookup(&[
            ("LLMSCOPE_API_KEY", "sk-1"),
            ("LLMSCOPE_ENVIRONMENT", "staging"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}

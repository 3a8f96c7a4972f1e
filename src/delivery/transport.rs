// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Batch transports.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tracing::debug;

use crate::capture::truncate;
use crate::config::ObserverConfig;
use crate::error::{ConfigError, DeliveryError};
use crate::event::CanonicalEvent;

/// Longest response body kept in a delivery error.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Sends one batch in one attempt. Retrying is the caller's job.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, batch: &[CanonicalEvent]) -> Result<(), DeliveryError>;
}

/// Delivers batches to the ingestion endpoint over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    api_key: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(
        url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("llmscope/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            api_key: api_key.into(),
            timeout,
        })
    }

    pub fn from_config(config: &ObserverConfig) -> Result<Self, ConfigError> {
        Self::new(config.ingest_url(), config.api_key.clone(), config.request_timeout())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn map_error(&self, err: reqwest::Error) -> DeliveryError {
        if err.is_timeout() {
            DeliveryError::Timeout(self.timeout.as_millis() as u64)
        } else {
            DeliveryError::Network(err.to_string())
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, batch: &[CanonicalEvent]) -> Result<(), DeliveryError> {
        let body = serde_json::to_vec(batch).map_err(|e| DeliveryError::Serialization(e.to_string()))?;

        let response = self
            .client
            .post(&self.url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status();
        if status.is_success() {
            debug!(status = status.as_u16(), events = batch.len(), "Batch accepted");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(DeliveryError::from_status(
            status.as_u16(),
            truncate(&body, MAX_ERROR_BODY_CHARS),
        ))
    }
}

/// An in-process transport that records batches instead of sending them.
///
/// Scripted failures are returned first, one per attempt, before any batch
/// is accepted.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    batches: Mutex<Vec<Vec<CanonicalEvent>>>,
    script: Mutex<VecDeque<DeliveryError>>,
    attempts: Mutex<u32>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next attempts with these errors, in order.
    pub fn fail_with(self, errors: impl IntoIterator<Item = DeliveryError>) -> Self {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(errors);
        self
    }

    /// Every batch accepted so far.
    pub fn batches(&self) -> Vec<Vec<CanonicalEvent>> {
        self.batches.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Every event accepted so far, in delivery order.
    pub fn events(&self) -> Vec<CanonicalEvent> {
        self.batches().into_iter().flatten().collect()
    }

    /// Attempts made, successful or not.
    pub fn attempts(&self) -> u32 {
        *self.attempts.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, batch: &[CanonicalEvent]) -> Result<(), DeliveryError> {
        *self.attempts.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        if let Some(err) = self.script.lock().unwrap_or_else(|e| e.into_inner()).pop_front() {
            return Err(err);
        }
        self.batches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(batch.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_transport_script() {
        let transport = MemoryTransport::new().fail_with([DeliveryError::Timeout(5)]);
        assert_eq!(transport.send(&[]).await, Err(DeliveryError::Timeout(5)));
        assert!(transport.send(&[]).await.is_ok());
        assert_eq!(transport.attempts(), 2);
        assert_eq!(transport.batches().len(), 1);
    }

    #[test]
    fn test_http_transport_from_config() {
        let config = ObserverConfig::new("sk").with_api_url("http://localhost:8080/");
        let transport = HttpTransport::from_config(&config).unwrap();
        assert_eq!(transport.url(), "http://localhost:8080/api/v1/events/ingest");
    }
}

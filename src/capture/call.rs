// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Normalized call input and output.

use std::time::Duration;

use serde_json::{json, Value};

use super::classify::NormalizedOutput;
use crate::types::{Message, ProviderResponse, TokenUsage, ToolDefinition};

/// What was sent to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct CallInput {
    pub model: String,
    /// Explicit provider; inferred from `model` when absent.
    pub provider: Option<String>,
    /// Prompt or message list, as JSON.
    pub input: Value,
    /// Request parameters (temperature, tools, ...).
    pub parameters: Option<Value>,
}

impl CallInput {
    pub fn new(model: impl Into<String>, input: impl Into<Value>) -> Self {
        Self {
            model: model.into(),
            provider: None,
            input: input.into(),
            parameters: None,
        }
    }

    /// Build the input of a chat call from its messages.
    ///
    /// The system prompt becomes the first message; offered tools are listed
    /// by name under `parameters.tools`.
    pub fn from_chat(
        model: impl Into<String>,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        system_prompt: Option<&str>,
    ) -> Self {
        let mut list = Vec::with_capacity(messages.len() + 1);
        if let Some(system) = system_prompt {
            list.push(json!({"role": "system", "content": system}));
        }
        list.extend(
            messages
                .iter()
                .map(|m| serde_json::to_value(m).unwrap_or(Value::Null)),
        );

        let parameters = tools.filter(|t| !t.is_empty()).map(|tools| {
            let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
            json!({ "tools": names })
        });

        Self {
            model: model.into(),
            provider: None,
            input: Value::Array(list),
            parameters,
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = Some(parameters);
        self
    }
}

/// What came back from the model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallOutput {
    pub content: String,
    pub finish_reason: Option<String>,
    pub status: Option<String>,
    pub tool_calls: Vec<Value>,
    pub usage: Option<TokenUsage>,
}

impl CallOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_finish_reason(mut self, reason: impl Into<String>) -> Self {
        self.finish_reason = Some(reason.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn normalized(&self) -> NormalizedOutput {
        NormalizedOutput {
            content: self.content.clone(),
            finish_reason: self.finish_reason.clone(),
            status: self.status.clone(),
            tool_call_count: self.tool_calls.len(),
        }
    }
}

impl From<&ProviderResponse> for CallOutput {
    fn from(response: &ProviderResponse) -> Self {
        Self {
            content: response.content.clone(),
            finish_reason: Some(response.stop_reason.as_str().to_string()),
            status: response.status.clone(),
            tool_calls: response
                .tool_calls
                .iter()
                .map(|call| json!({"id": call.id, "name": call.name, "input": call.input}))
                .collect(),
            usage: response.usage.clone(),
        }
    }
}

/// Timing and transport details of one call.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CallMeta {
    pub latency: Duration,
    pub streaming: bool,
    pub time_to_first_token: Option<Duration>,
    pub chunk_count: Option<u64>,
}

impl CallMeta {
    pub fn completed(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    pub fn streamed(latency: Duration, time_to_first_token: Option<Duration>, chunks: u64) -> Self {
        Self {
            latency,
            streaming: true,
            time_to_first_token,
            chunk_count: Some(chunks),
        }
    }
}

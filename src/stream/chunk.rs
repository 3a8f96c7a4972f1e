// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Chunk shapes.
//!
//! Every chunk a provider streams falls into one of a closed set of shapes.
//! Classification happens once per chunk; accumulation only ever matches on
//! [`ChunkShape`].

use serde_json::Value;

use crate::types::{StreamEvent, TokenUsage};

/// A tool call announced inside a stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallStart {
    pub id: Option<String>,
    pub name: Option<String>,
}

/// A chat-completion delta (`choices[0].delta`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatDelta {
    pub content: Option<String>,
    pub finish_reason: Option<String>,
    pub usage: Option<TokenUsage>,
    pub tool_calls: Vec<ToolCallStart>,
}

/// An event-typed "responses" chunk (`type: "response.*"`).
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEvent {
    Created,
    OutputTextDelta(String),
    Completed {
        status: Option<String>,
        usage: Option<TokenUsage>,
    },
    Failed {
        message: Option<String>,
    },
    Incomplete {
        reason: Option<String>,
    },
    Other(String),
}

/// A message-stream chunk (`message_start`, `content_block_delta`, ...).
#[derive(Debug, Clone, PartialEq)]
pub enum MessageEvent {
    Start {
        input_tokens: Option<u32>,
    },
    ToolUseStart(ToolCallStart),
    ContentDelta(String),
    Delta {
        stop_reason: Option<String>,
        output_tokens: Option<u32>,
    },
    Stop,
    Error(String),
    Other(String),
}

/// The closed union of chunk shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkShape {
    ChatDelta(ChatDelta),
    ResponseEvent(ResponseEvent),
    MessageEvent(MessageEvent),
    Unknown,
}

impl ChunkShape {
    /// Text this chunk adds to the response, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::ChatDelta(ChatDelta {
                content: Some(text),
                ..
            }) => Some(text.as_str()),
            Self::ResponseEvent(ResponseEvent::OutputTextDelta(text)) => Some(text.as_str()),
            Self::MessageEvent(MessageEvent::ContentDelta(text)) => Some(text.as_str()),
            _ => None,
        }
    }
}

/// A streamed chunk the interceptor can classify.
pub trait ChunkView {
    fn shape(&self) -> ChunkShape;
}

impl ChunkView for StreamEvent {
    fn shape(&self) -> ChunkShape {
        match self {
            StreamEvent::TextDelta(text) => ChunkShape::ChatDelta(ChatDelta {
                content: Some(text.clone()),
                ..ChatDelta::default()
            }),
            StreamEvent::ReasoningDelta(_) | StreamEvent::ToolInputDelta(_) => {
                ChunkShape::ChatDelta(ChatDelta::default())
            }
            StreamEvent::ToolUseStart { id, name } => ChunkShape::ChatDelta(ChatDelta {
                tool_calls: vec![ToolCallStart {
                    id: Some(id.clone()),
                    name: Some(name.clone()),
                }],
                ..ChatDelta::default()
            }),
            StreamEvent::Usage(usage) => ChunkShape::ChatDelta(ChatDelta {
                usage: Some(usage.clone()),
                ..ChatDelta::default()
            }),
            StreamEvent::Done(reason) => ChunkShape::ChatDelta(ChatDelta {
                finish_reason: Some(reason.as_str().to_string()),
                ..ChatDelta::default()
            }),
            StreamEvent::Error(message) => ChunkShape::ResponseEvent(ResponseEvent::Failed {
                message: Some(message.clone()),
            }),
        }
    }
}

fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str)
}

fn u32_at(value: &Value, pointer: &str) -> Option<u32> {
    value
        .pointer(pointer)
        .and_then(Value::as_u64)
        .map(|n| n.min(u32::MAX as u64) as u32)
}

/// Usage with either naming scheme (`prompt_tokens` or `input_tokens`).
fn usage_at(value: &Value, pointer: &str) -> Option<TokenUsage> {
    let usage = value.pointer(pointer)?;
    if !usage.is_object() {
        return None;
    }
    let input = u32_at(usage, "/prompt_tokens").or_else(|| u32_at(usage, "/input_tokens"));
    let output = u32_at(usage, "/completion_tokens").or_else(|| u32_at(usage, "/output_tokens"));
    if input.is_none() && output.is_none() {
        return None;
    }
    Some(TokenUsage::new(input.unwrap_or(0), output.unwrap_or(0)))
}

fn chat_delta(value: &Value) -> ChatDelta {
    let tool_calls = value
        .pointer("/choices/0/delta/tool_calls")
        .and_then(Value::as_array)
        .map(|calls| {
            calls
                .iter()
                .filter(|call| call.get("id").is_some())
                .map(|call| ToolCallStart {
                    id: str_at(call, "/id").map(String::from),
                    name: str_at(call, "/function/name").map(String::from),
                })
                .collect()
        })
        .unwrap_or_default();

    ChatDelta {
        content: str_at(value, "/choices/0/delta/content").map(String::from),
        finish_reason: str_at(value, "/choices/0/finish_reason").map(String::from),
        usage: usage_at(value, "/usage"),
        tool_calls,
    }
}

fn response_event(kind: &str, value: &Value) -> ResponseEvent {
    match kind {
        "response.created" => ResponseEvent::Created,
        "response.output_text.delta" => {
            ResponseEvent::OutputTextDelta(str_at(value, "/delta").unwrap_or_default().to_string())
        }
        "response.completed" => ResponseEvent::Completed {
            status: str_at(value, "/response/status").map(String::from),
            usage: usage_at(value, "/response/usage"),
        },
        "response.failed" => ResponseEvent::Failed {
            message: str_at(value, "/response/error/message").map(String::from),
        },
        "response.incomplete" => ResponseEvent::Incomplete {
            reason: str_at(value, "/response/incomplete_details/reason").map(String::from),
        },
        other => ResponseEvent::Other(other.to_string()),
    }
}

fn message_event(kind: &str, value: &Value) -> MessageEvent {
    match kind {
        "message_start" => MessageEvent::Start {
            input_tokens: u32_at(value, "/message/usage/input_tokens"),
        },
        "content_block_start" if str_at(value, "/content_block/type") == Some("tool_use") => {
            MessageEvent::ToolUseStart(ToolCallStart {
                id: str_at(value, "/content_block/id").map(String::from),
                name: str_at(value, "/content_block/name").map(String::from),
            })
        }
        "content_block_delta" => match str_at(value, "/delta/text") {
            Some(text) => MessageEvent::ContentDelta(text.to_string()),
            None => MessageEvent::Other(kind.to_string()),
        },
        "message_delta" => MessageEvent::Delta {
            stop_reason: str_at(value, "/delta/stop_reason").map(String::from),
            output_tokens: u32_at(value, "/usage/output_tokens"),
        },
        "message_stop" => MessageEvent::Stop,
        "error" => MessageEvent::Error(
            str_at(value, "/error/message")
                .unwrap_or("stream error")
                .to_string(),
        ),
        other => MessageEvent::Other(other.to_string()),
    }
}

const MESSAGE_EVENT_TYPES: &[&str] = &[
    "message_start",
    "content_block_start",
    "content_block_delta",
    "content_block_stop",
    "message_delta",
    "message_stop",
    "ping",
    "error",
];

impl ChunkView for Value {
    fn shape(&self) -> ChunkShape {
        if let Some(kind) = self.get("type").and_then(Value::as_str) {
            if kind.starts_with("response.") {
                return ChunkShape::ResponseEvent(response_event(kind, self));
            }
            if MESSAGE_EVENT_TYPES.contains(&kind) {
                return ChunkShape::MessageEvent(message_event(kind, self));
            }
        }
        if self.get("choices").is_some_and(Value::is_array) {
            return ChunkShape::ChatDelta(chat_delta(self));
        }
        ChunkShape::Unknown
    }
}

// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Canonical event type definitions.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::{SpanId, TraceId};
use crate::error::ValidationError;

/// Open, event-type-specific attribute map.
pub type Attributes = serde_json::Map<String, Value>;

// ============================================================================
// Enumerations
// ============================================================================

/// The fixed set of event types the ingestion service understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    TraceStart,
    TraceEnd,
    LlmCall,
    ToolCall,
    Retrieval,
    Embedding,
    VectorDbOperation,
    CacheOperation,
    AgentCreate,
    Error,
    Feedback,
    Output,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TraceStart => "trace_start",
            Self::TraceEnd => "trace_end",
            Self::LlmCall => "llm_call",
            Self::ToolCall => "tool_call",
            Self::Retrieval => "retrieval",
            Self::Embedding => "embedding",
            Self::VectorDbOperation => "vector_db_operation",
            Self::CacheOperation => "cache_operation",
            Self::AgentCreate => "agent_create",
            Self::Error => "error",
            Self::Feedback => "feedback",
            Self::Output => "output",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deployment environment stamped on every event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Dev,
    Prod,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Prod => "prod",
        }
    }
}

/// Error type for parsing an environment from a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnvironmentError(pub String);

impl fmt::Display for ParseEnvironmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid environment '{}' (expected dev or prod)", self.0)
    }
}

impl std::error::Error for ParseEnvironmentError {}

impl FromStr for Environment {
    type Err = ParseEnvironmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dev" | "development" => Ok(Self::Dev),
            "prod" | "production" => Ok(Self::Prod),
            _ => Err(ParseEnvironmentError(s.to_string())),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Context
// ============================================================================

/// Isolation context derived once when the SDK is initialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    pub tenant_id: String,
    pub project_id: String,
    pub environment: Environment,
}

impl TenantContext {
    pub fn new(
        tenant_id: impl Into<String>,
        project_id: impl Into<String>,
        environment: Environment,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            project_id: project_id.into(),
            environment,
        }
    }
}

/// Optional correlation fields, propagated from a trace or set at a call site.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correlation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
}

impl Correlation {
    /// Fields set on `self` win; unset fields fall back to `base`.
    pub fn or(&self, base: &Correlation) -> Correlation {
        fn pick(a: &Option<String>, b: &Option<String>) -> Option<String> {
            a.clone().or_else(|| b.clone())
        }
        Correlation {
            conversation_id: pick(&self.conversation_id, &base.conversation_id),
            session_id: pick(&self.session_id, &base.session_id),
            user_id: pick(&self.user_id, &base.user_id),
            agent_name: pick(&self.agent_name, &base.agent_name),
            version: pick(&self.version, &base.version),
            route: pick(&self.route, &base.route),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Correlation::default()
    }
}

// ============================================================================
// Drafts and stamps
// ============================================================================

/// An event as produced by a capture adapter, before identifiers are stamped.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDraft {
    pub event_type: EventType,
    pub attributes: Attributes,
    /// Explicit parent span; defaults to the top of the trace's span stack.
    pub parent: Option<SpanId>,
    /// Call-site correlation overriding the trace's.
    pub correlation: Correlation,
}

impl EventDraft {
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            attributes: Attributes::new(),
            parent: None,
            correlation: Correlation::default(),
        }
    }

    /// Set an attribute. `Value::Null` is kept so `output: null` stays explicit.
    pub fn attr(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    /// Set an attribute only when a value is present.
    pub fn attr_opt<V: Into<Value>>(mut self, key: &str, value: Option<V>) -> Self {
        if let Some(value) = value {
            self.attributes.insert(key.to_string(), value.into());
        }
        self
    }

    pub fn with_parent(mut self, parent: Option<SpanId>) -> Self {
        self.parent = parent;
        self
    }

    pub fn with_correlation(mut self, correlation: Correlation) -> Self {
        self.correlation = correlation;
        self
    }
}

/// Identifiers and time assigned by the trace context manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventStamp {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub parent_span_id: Option<SpanId>,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Canonical Event
// ============================================================================

/// The normalized telemetry record emitted for any captured operation.
///
/// Immutable once assembled: fields are only readable through accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    tenant_id: String,
    project_id: String,
    environment: Environment,
    trace_id: TraceId,
    span_id: SpanId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent_span_id: Option<SpanId>,
    timestamp: DateTime<Utc>,
    event_type: EventType,
    #[serde(flatten)]
    correlation: Correlation,
    #[serde(default)]
    attributes: Attributes,
}

impl CanonicalEvent {
    /// Assemble an event from its parts, rejecting malformed identifiers.
    pub fn assemble(
        tenant: &TenantContext,
        stamp: EventStamp,
        correlation: Correlation,
        event_type: EventType,
        attributes: Attributes,
    ) -> Result<Self, ValidationError> {
        let event = Self {
            tenant_id: tenant.tenant_id.clone(),
            project_id: tenant.project_id.clone(),
            environment: tenant.environment,
            trace_id: stamp.trace_id,
            span_id: stamp.span_id,
            parent_span_id: stamp.parent_span_id,
            timestamp: stamp.timestamp,
            event_type,
            correlation,
            attributes,
        };
        event.validate()?;
        Ok(event)
    }

    /// Check required identifiers.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.tenant_id.trim().is_empty() {
            return Err(ValidationError::MissingIdentifier("tenant_id"));
        }
        if self.project_id.trim().is_empty() {
            return Err(ValidationError::MissingIdentifier("project_id"));
        }
        if self.trace_id.is_nil() {
            return Err(ValidationError::MissingIdentifier("trace_id"));
        }
        if self.span_id.is_nil() {
            return Err(ValidationError::MissingIdentifier("span_id"));
        }
        if self.parent_span_id == Some(self.span_id) {
            return Err(ValidationError::UnknownParent {
                parent: self.span_id.to_string(),
                trace: self.trace_id.to_string(),
            });
        }
        Ok(())
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    pub fn parent_span_id(&self) -> Option<SpanId> {
        self.parent_span_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn correlation(&self) -> &Correlation {
        &self.correlation
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Look up a single attribute.
    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
}

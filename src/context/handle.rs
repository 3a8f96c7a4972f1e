// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Trace handles and the task-scoped current trace.

use std::future::Future;

use serde_json::Value;

use crate::event::{Attributes, Correlation, TraceId};

tokio::task_local! {
    static CURRENT_TRACE: TraceHandle;
}

/// A reference to one open trace.
///
/// Cheap to copy. Captures that are handed a handle (or run inside
/// [`TraceHandle::scope`]) are attached to that trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceHandle {
    id: TraceId,
    sampled: bool,
}

impl TraceHandle {
    pub(crate) fn new(id: TraceId, sampled: bool) -> Self {
        Self { id, sampled }
    }

    pub fn id(&self) -> TraceId {
        self.id
    }

    /// The sampling decision made when the trace started.
    pub fn is_sampled(&self) -> bool {
        self.sampled
    }

    /// Run `fut` with this handle as the implicit trace for captures inside it.
    ///
    /// Scopes nest: the innermost scope wins, and the previous one is restored
    /// when the inner future completes.
    pub async fn scope<F>(self, fut: F) -> F::Output
    where
        F: Future,
    {
        CURRENT_TRACE.scope(self, fut).await
    }

    /// The handle of the enclosing [`scope`](Self::scope), if any.
    pub fn current() -> Option<TraceHandle> {
        CURRENT_TRACE.try_with(|handle| *handle).ok()
    }
}

/// Options for starting a trace.
#[derive(Debug, Clone, Default)]
pub struct TraceOptions {
    pub name: Option<String>,
    pub metadata: Attributes,
    pub correlation: Correlation,
}

impl TraceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create options with a trace name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_conversation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation.conversation_id = Some(id.into());
        self
    }

    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.correlation.session_id = Some(id.into());
        self
    }

    pub fn with_user_id(mut self, id: impl Into<String>) -> Self {
        self.correlation.user_id = Some(id.into());
        self
    }

    pub fn with_agent_name(mut self, name: impl Into<String>) -> Self {
        self.correlation.agent_name = Some(name.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.correlation.version = Some(version.into());
        self
    }

    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.correlation.route = Some(route.into());
        self
    }
}

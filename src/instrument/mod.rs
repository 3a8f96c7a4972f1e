// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Drop-in wrappers for provider clients.
//!
//! A wrapped client implements the same trait as the client it wraps, returns
//! the same results and errors, and records each call as it completes.

mod embedder;
mod provider;

pub use embedder::InstrumentedEmbedder;
pub use provider::InstrumentedProvider;

use crate::observer::Observer;
use crate::types::{EmbeddingProvider, Provider};

impl Observer {
    /// Wrap a chat client so its calls are captured.
    pub fn wrap<P: Provider>(&self, provider: P) -> InstrumentedProvider<P> {
        InstrumentedProvider::new(provider, self.clone())
    }

    /// Wrap an embedding client so its calls are captured.
    pub fn wrap_embedder<E: EmbeddingProvider>(&self, embedder: E) -> InstrumentedEmbedder<E> {
        InstrumentedEmbedder::new(embedder, self.clone())
    }
}

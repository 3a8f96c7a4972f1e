// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration module for llmscope.
//!
//! Handles the recognized options, loading them from `LLMSCOPE_*` environment
//! variables, and resolving the tenant context from the API key:
//! - JWT-style keys carry `tenantId`/`projectId`/`environment` in the payload
//! - Opaque keys fall back to explicit `tenantId`/`projectId`
//! - An explicit `environment` always wins over the key's

mod key;
mod loader;
mod types;

pub use key::{decode_opaque_key, resolve_tenant};
pub use loader::{load_from_env, load_with, ENV_PREFIX, ENV_VARS};
pub use types::{Mode, ObserverConfig, DEFAULT_API_URL, DEFAULT_MAX_RESPONSE_CHARS};

use crate::error::ConfigError;
use crate::event::TenantContext;

impl ObserverConfig {
    /// Load options from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        load_from_env()
    }
}

/// Validate a config and resolve its tenant context in one step.
///
/// This is the entry point used when an SDK instance is created.
pub fn resolve(config: &ObserverConfig) -> Result<TenantContext, ConfigError> {
    config.validate()?;
    resolve_tenant(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_validates_first() {
        let config = ObserverConfig::new("sk-legacy")
            .with_tenant("t", "p")
            .with_sample_rate(-0.1);
        assert!(matches!(
            resolve(&config),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_resolve_legacy() {
        let config = ObserverConfig::new("sk-legacy").with_tenant("t", "p");
        let tenant = resolve(&config).unwrap();
        assert_eq!(tenant.tenant_id, "t");
        assert_eq!(tenant.project_id, "p");
    }
}

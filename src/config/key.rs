// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! API key decoding and tenant resolution.
//!
//! A JWT-style key carries the tenant context in its payload segment. The
//! payload is decoded and parsed, never verified: authenticity is the
//! ingestion service's job.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::Deserialize;
use tracing::debug;

use super::types::ObserverConfig;
use crate::error::{ConfigError, DecodeError};
use crate::event::{Environment, TenantContext};

/// Claims read from a key payload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyClaims {
    tenant_id: Option<String>,
    project_id: Option<String>,
    environment: Option<String>,
    #[allow(dead_code)]
    iat: Option<i64>,
    #[allow(dead_code)]
    exp: Option<i64>,
}

/// Decode the tenant context from a JWT-style key without verifying it.
///
/// `tenantId` and `projectId` are required; `environment` defaults to `dev`
/// when absent or unrecognized.
pub fn decode_opaque_key(raw: &str) -> Result<TenantContext, DecodeError> {
    let segments: Vec<&str> = raw.trim().split('.').collect();
    if segments.len() != 3 || segments.iter().any(|s| s.is_empty()) {
        return Err(DecodeError::NotJwt);
    }

    let payload = decode_segment(segments[1])?;
    let claims: KeyClaims =
        serde_json::from_slice(&payload).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;

    let tenant_id = claims
        .tenant_id
        .filter(|s| !s.trim().is_empty())
        .ok_or(DecodeError::MissingField("tenantId"))?;
    let project_id = claims
        .project_id
        .filter(|s| !s.trim().is_empty())
        .ok_or(DecodeError::MissingField("projectId"))?;
    let environment = claims
        .environment
        .and_then(|e| e.parse::<Environment>().ok())
        .unwrap_or_default();

    Ok(TenantContext {
        tenant_id,
        project_id,
        environment,
    })
}

/// Base64url without padding is the JWT norm; padded and standard-alphabet
/// payloads are accepted too.
fn decode_segment(segment: &str) -> Result<Vec<u8>, DecodeError> {
    let trimmed = segment.trim_end_matches('=');
    URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| STANDARD.decode(pad(trimmed)))
        .map_err(|e| DecodeError::InvalidBase64(e.to_string()))
}

fn pad(segment: &str) -> String {
    let mut padded = segment.to_string();
    while padded.len() % 4 != 0 {
        padded.push('=');
    }
    padded
}

/// Resolve the tenant context for a config.
///
/// A decodable key wins for tenant and project. A non-JWT key falls back to
/// the explicit `tenantId`/`projectId`. A JWT whose payload is malformed is
/// also allowed to fall back, so long as explicit values exist. An explicit
/// `environment` always overrides the key's.
pub fn resolve_tenant(config: &ObserverConfig) -> Result<TenantContext, ConfigError> {
    let decoded = decode_opaque_key(&config.api_key);

    let mut tenant = match decoded {
        Ok(tenant) => tenant,
        Err(err) => {
            if !matches!(err, DecodeError::NotJwt) {
                debug!(error = %err, "API key payload unusable, trying explicit tenant");
            }
            let tenant_id = non_blank(&config.tenant_id);
            let project_id = non_blank(&config.project_id);
            match (tenant_id, project_id) {
                (Some(tenant_id), Some(project_id)) => {
                    TenantContext::new(tenant_id, project_id, Environment::Dev)
                }
                _ if !matches!(err, DecodeError::NotJwt) => return Err(err.into()),
                (None, _) => return Err(ConfigError::MissingField("tenantId".to_string())),
                (Some(_), None) => {
                    return Err(ConfigError::MissingField("projectId".to_string()))
                }
            }
        }
    };

    if let Some(environment) = config.environment {
        tenant.environment = environment;
    }
    Ok(tenant)
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt(payload: &str) -> String {
        format!(
            "{}.{}.signature",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#),
            URL_SAFE_NO_PAD.encode(payload)
        )
    }

    #[test]
    fn test_decode_valid_key() {
        let key = jwt(r#"{"tenantId":"acme","projectId":"bot","environment":"prod","iat":1,"exp":2}"#);
        let tenant = decode_opaque_key(&key).unwrap();
        assert_eq!(tenant.tenant_id, "acme");
        assert_eq!(tenant.project_id, "bot");
        assert_eq!(tenant.environment, Environment::Prod);
    }

    #[test]
    fn test_decode_defaults_environment() {
        let key = jwt(r#"{"tenantId":"acme","projectId":"bot"}"#);
        assert_eq!(decode_opaque_key(&key).unwrap().environment, Environment::Dev);
    }

    #[test]
    fn test_decode_accepts_padded_standard_base64() {
        let payload = STANDARD.encode(r#"{"tenantId":"t?>","projectId":"p"}"#);
        let key = format!("hdr.{payload}.sig");
        let tenant = decode_opaque_key(&key).unwrap();
        assert_eq!(tenant.tenant_id, "t?>");
    }

    #[test]
    fn test_decode_unverified_signature_accepted() {
        let key = jwt(r#"{"tenantId":"acme","projectId":"bot"}"#).replace("signature", "tampered");
        assert!(decode_opaque_key(&key).is_ok());
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(decode_opaque_key("sk-opaque-key"), Err(DecodeError::NotJwt));
        assert_eq!(decode_opaque_key("a..c"), Err(DecodeError::NotJwt));
        assert!(matches!(
            decode_opaque_key("a.!!!!.c"),
            Err(DecodeError::InvalidBase64(_))
        ));
        assert!(matches!(
            decode_opaque_key(&jwt("not json")),
            Err(DecodeError::InvalidJson(_))
        ));
        assert_eq!(
            decode_opaque_key(&jwt(r#"{"projectId":"bot"}"#)),
            Err(DecodeError::MissingField("tenantId"))
        );
        assert_eq!(
            decode_opaque_key(&jwt(r#"{"tenantId":"acme"}"#)),
            Err(DecodeError::MissingField("projectId"))
        );
    }

    #[test]
    fn test_resolve_from_jwt() {
        let config = ObserverConfig::new(jwt(r#"{"tenantId":"acme","projectId":"bot"}"#));
        let tenant = resolve_tenant(&config).unwrap();
        assert_eq!(tenant.tenant_id, "acme");
        assert_eq!(tenant.environment, Environment::Dev);
    }

    #[test]
    fn test_resolve_explicit_environment_wins() {
        let config = ObserverConfig::new(jwt(
            r#"{"tenantId":"acme","projectId":"bot","environment":"dev"}"#,
        ))
        .with_environment(Environment::Prod);
        assert_eq!(resolve_tenant(&config).unwrap().environment, Environment::Prod);
    }

    #[test]
    fn test_resolve_legacy_key() {
        let config = ObserverConfig::new("sk-legacy").with_tenant("t1", "p1");
        let tenant = resolve_tenant(&config).unwrap();
        assert_eq!(tenant.tenant_id, "t1");
        assert_eq!(tenant.project_id, "p1");
    }

    #[test]
    fn test_resolve_legacy_key_missing_fields() {
        let err = resolve_tenant(&ObserverConfig::new("sk-legacy")).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(ref f) if f == "tenantId"));

        let mut config = ObserverConfig::new("sk-legacy");
        config.tenant_id = Some("t1".to_string());
        let err = resolve_tenant(&config).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(ref f) if f == "projectId"));
    }

    #[test]
    fn test_resolve_malformed_jwt_without_fallback() {
        let config = ObserverConfig::new(jwt(r#"{"projectId":"bot"}"#));
        let err = resolve_tenant(&config).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidKey(DecodeError::MissingField("tenantId"))));
    }
}

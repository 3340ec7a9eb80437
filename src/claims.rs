use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::Value as JsonValue;

use crate::token::VerifiedToken;
use crate::types::{RoleRule, SubjectId};

/// Payload claims of an already verified access token.
///
/// Recomputed from the token whenever it is needed, never stored.
#[derive(Debug, Clone)]
pub struct DecodedClaims {
    inner: JsonValue,
}

impl DecodedClaims {
    /// Decodes the payload segment. No signature check happens here; the
    /// [`VerifiedToken`] argument is the proof that one already did.
    #[must_use]
    pub fn from_token(token: &VerifiedToken) -> Option<Self> {
        let mut segments = token.as_str().split('.');
        let (Some(_), Some(payload), Some(_), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            tracing::debug!("Access token is not a three-segment JWT");
            return None;
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .inspect_err(|e| tracing::debug!(error = %e, "Payload is not base64url"))
            .ok()?;
        let inner: JsonValue = serde_json::from_slice(&bytes)
            .inspect_err(|e| tracing::debug!(error = %e, "Payload is not JSON"))
            .ok()?;
        inner.is_object().then_some(Self { inner })
    }

    /// Gets a claim value by key.
    #[must_use]
    pub fn get_claim(&self, key: &str) -> Option<&JsonValue> {
        self.inner.get(key)
    }

    #[must_use]
    pub fn subject(&self) -> Option<SubjectId> {
        self.inner
            .get("sub")
            .and_then(JsonValue::as_str)
            .map(|s| SubjectId(s.to_owned()))
    }

    #[must_use]
    pub fn issuer(&self) -> Option<&str> {
        self.inner.get("iss").and_then(JsonValue::as_str)
    }

    /// `aud` as a set, whether the token carries a string or a list.
    #[must_use]
    pub fn audience(&self) -> Vec<&str> {
        match self.inner.get("aud") {
            Some(JsonValue::String(aud)) => vec![aud.as_str()],
            Some(JsonValue::Array(auds)) => auds.iter().filter_map(JsonValue::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// Roles under `resource_access.<resource>.roles`; empty when the path is absent.
    #[must_use]
    pub fn resource_roles(&self, resource: &str) -> Vec<&str> {
        self.inner
            .get("resource_access")
            .and_then(|access| access.get(resource))
            .and_then(|entry| entry.get("roles"))
            .and_then(JsonValue::as_array)
            .map(|roles| roles.iter().filter_map(JsonValue::as_str).collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn has_resource_role(&self, rule: &RoleRule) -> bool {
        self.resource_roles(&rule.resource)
            .iter()
            .any(|role| *role == rule.role)
    }
}

/// Admin check; any decoding or navigation failure means "not admin".
#[must_use]
pub fn is_admin(token: &VerifiedToken, rule: &RoleRule) -> bool {
    DecodedClaims::from_token(token).is_some_and(|claims| claims.has_resource_role(rule))
}

/// `sub` of the token, or `None` if it cannot be read.
#[must_use]
pub fn subject_id(token: &VerifiedToken) -> Option<SubjectId> {
    DecodedClaims::from_token(token).and_then(|claims| claims.subject())
}

use std::fmt;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::config::AuthConfig;
use crate::error::{ConfigError, VerificationError};
use crate::jwks::JwksClient;
use crate::oauth::build_http_client;
use crate::types::KeyId;

/// Access token whose signature, issuer and audience have been checked.
///
/// Only [`TokenVerifier`] hands these out; claim extraction and session
/// initialization accept nothing else.
#[derive(Clone)]
pub struct VerifiedToken {
    raw: String,
    key_id: KeyId,
    issuer: String,
    audience: Vec<String>,
}

impl VerifiedToken {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.raw
    }

    #[must_use]
    pub fn key_id(&self) -> &KeyId {
        &self.key_id
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn audience(&self) -> &[String] {
        &self.audience
    }

    #[cfg(test)]
    pub(crate) fn assume_verified(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            key_id: KeyId("test".into()),
            issuer: String::new(),
            audience: Vec::new(),
        }
    }
}

impl fmt::Debug for VerifiedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifiedToken")
            .field("key_id", &self.key_id)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(aud) => vec![aud],
            Self::Many(auds) => auds,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RegisteredClaims {
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    aud: Option<Audience>,
}

/// Validates access tokens against the provider's JWKS.
///
/// The key set is fetched on first use and cached for the lifetime of the
/// verifier. A token naming an unknown `kid` causes one refetch, which picks
/// up rotated keys.
pub struct TokenVerifier {
    jwks: JwksClient,
    issuer: String,
    audience: String,
    keys: RwLock<Option<JwkSet>>,
}

impl TokenVerifier {
    /// Create a verifier for the configured issuer and client ID.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::HttpClient`] if the HTTP client cannot be built.
    pub fn new(config: &AuthConfig) -> Result<Self, ConfigError> {
        Ok(Self::with_http_client(config, build_http_client(config)?))
    }

    /// Use a custom HTTP client for key-set fetches.
    #[must_use]
    pub fn with_http_client(config: &AuthConfig, http: reqwest::Client) -> Self {
        Self {
            jwks: JwksClient::new(http, config.jwks_url.clone(), config.jwks_size_limit),
            issuer: config.issuer.clone(),
            audience: config.client_id.clone(),
            keys: RwLock::new(None),
        }
    }

    /// Verifies an RS256 access token.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError`] if the token is malformed, its key is
    /// unknown or cannot be fetched, the signature is invalid, it expired or
    /// is not valid yet (`nbf`), or the `iss`/`aud` claims do not match the configuration.
    pub async fn verify(&self, token: &str) -> Result<VerifiedToken, VerificationError> {
        let header = jsonwebtoken::decode_header(token)
            .map_err(|e| VerificationError::Malformed(e.to_string()))?;
        if header.alg != Algorithm::RS256 {
            return Err(VerificationError::UnsupportedAlgorithm(format!(
                "{:?}",
                header.alg
            )));
        }
        let kid = header.kid.ok_or(VerificationError::MissingKeyId)?;

        let jwk = self.signing_key(&kid).await?;
        let key = DecodingKey::from_jwk(&jwk)
            .map_err(|e| VerificationError::KeyFetch(format!("unusable key '{kid}': {e}")))?;

        // iss/aud are compared below; the library checks signature, exp and nbf
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_aud = false;
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp"]);

        let data = jsonwebtoken::decode::<RegisteredClaims>(token, &key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => VerificationError::Expired,
                ErrorKind::ImmatureSignature => VerificationError::NotYetValid,
                ErrorKind::InvalidSignature => VerificationError::Signature(e.to_string()),
                ErrorKind::InvalidToken
                | ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_)
                | ErrorKind::MissingRequiredClaim(_) => VerificationError::Malformed(e.to_string()),
                _ => VerificationError::Signature(e.to_string()),
            })?;
        let claims = data.claims;

        let actual_issuer = claims.iss.unwrap_or_default();
        if actual_issuer != self.issuer {
            return Err(VerificationError::IssuerMismatch {
                expected: self.issuer.clone(),
                actual: actual_issuer,
            });
        }

        let audience = claims.aud.map(Audience::into_vec).unwrap_or_default();
        if !audience.iter().any(|aud| *aud == self.audience) {
            return Err(VerificationError::AudienceMismatch {
                expected: self.audience.clone(),
                actual: audience,
            });
        }

        Ok(VerifiedToken {
            raw: token.to_owned(),
            key_id: KeyId(kid),
            issuer: actual_issuer,
            audience,
        })
    }

    /// `(valid, validated_token)`: the token is echoed back only when valid.
    pub async fn verify_status(&self, token: &str) -> (bool, Option<String>) {
        match self.verify(token).await {
            Ok(verified) => (true, Some(verified.into_string())),
            Err(e) => {
                tracing::warn!(error = %e, "Token verification failed");
                (false, None)
            }
        }
    }

    /// Drop the cached key set and fetch it again.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError::KeyFetch`] if the JWKS endpoint fails.
    pub async fn refresh_keys(&self) -> Result<(), VerificationError> {
        let fresh = self.jwks.fetch().await?;
        *self.keys.write().await = Some(fresh);
        Ok(())
    }

    async fn signing_key(&self, kid: &str) -> Result<Jwk, VerificationError> {
        if let Some(jwk) = self.keys.read().await.as_ref().and_then(|set| set.find(kid)) {
            return Ok(jwk.clone());
        }

        tracing::debug!(kid = %kid, url = %self.jwks.url(), "Signing key not cached, fetching key set");
        self.refresh_keys().await?;

        self.keys
            .read()
            .await
            .as_ref()
            .and_then(|set| set.find(kid))
            .cloned()
            .ok_or_else(|| VerificationError::UnknownKey(kid.to_owned()))
    }
}

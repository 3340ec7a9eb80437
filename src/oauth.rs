use std::fmt;

use serde::{Deserialize, Serialize};

use crate::authorize::{AuthorizationResponse, PendingAuthorization};
use crate::config::AuthConfig;
use crate::error::{ConfigError, ExchangeError, LogoutError};
use crate::session::Session;
use crate::types::SubjectId;

/// Builds the HTTP client shared by every provider call.
pub(crate) fn build_http_client(config: &AuthConfig) -> Result<reqwest::Client, ConfigError> {
    reqwest::Client::builder()
        .connect_timeout(config.http_timeout)
        .read_timeout(config.http_timeout)
        .build()
        .map_err(Into::into)
}

/// Checks HTTP response status; returns the response on success or the
/// caller's status error built from the code and body.
pub(crate) async fn ensure_success<E>(
    response: reqwest::Response,
    operation: &'static str,
    status_error: impl FnOnce(u16, String) -> E,
) -> Result<reqwest::Response, E> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    tracing::warn!(operation, status, "Request rejected");
    Err(status_error(status, body))
}

/// Token response from the provider's token endpoint.
#[derive(Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// Standard OIDC userinfo claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct UserInfo {
    pub sub: SubjectId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: Option<bool>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
}

/// Client for the identity provider's token, logout and userinfo endpoints.
///
/// Authenticates as a confidential client (client ID + secret).
#[derive(Clone)]
pub struct AuthClient {
    config: AuthConfig,
    http: reqwest::Client,
}

impl AuthClient {
    /// Create a client with the configured connect/read timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::HttpClient`] if the HTTP client cannot be built.
    pub fn new(config: AuthConfig) -> Result<Self, ConfigError> {
        let http = build_http_client(&config)?;
        Ok(Self::from_shared(config, http))
    }

    /// Client over an HTTP client already built from `config`.
    pub(crate) fn from_shared(config: AuthConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Exchange an authorization code for tokens.
    ///
    /// One POST to the token endpoint, client authenticated with HTTP basic.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::Http`] on network failure,
    /// [`ExchangeError::Status`] on a non-2xx answer, or
    /// [`ExchangeError::MalformedBody`] if the body is not a token response.
    pub async fn exchange_code(
        &self,
        response: &AuthorizationResponse,
        pending: &PendingAuthorization,
    ) -> Result<TokenResponse, ExchangeError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", response.code()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code_verifier", pending.code_verifier()),
        ];

        let http_response = self
            .http
            .post(self.config.token_url.clone())
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&params)
            .send()
            .await?;

        let http_response = ensure_success(http_response, "token exchange", |status, detail| {
            ExchangeError::Status { status, detail }
        })
        .await?;

        let body = http_response.text().await?;
        let tokens: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| ExchangeError::MalformedBody(e.to_string()))?;
        if tokens.access_token.is_empty() {
            return Err(ExchangeError::MalformedBody("empty access_token".into()));
        }

        tracing::debug!(
            has_refresh_token = tokens.refresh_token.is_some(),
            expires_in = ?tokens.expires_in,
            "Token exchange succeeded"
        );
        Ok(tokens)
    }

    /// End the provider session for this refresh token.
    ///
    /// # Errors
    ///
    /// Returns [`LogoutError::Http`] on network failure or
    /// [`LogoutError::Status`] on a non-2xx answer.
    pub async fn revoke_session(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<(), LogoutError> {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ];

        let response = self
            .http
            .post(self.config.logout_url.clone())
            .bearer_auth(access_token)
            .form(&params)
            .send()
            .await?;

        ensure_success(response, "logout", |status, detail| LogoutError::Status {
            status,
            detail,
        })
        .await?;
        Ok(())
    }

    /// Log out at the provider, then clear the session.
    ///
    /// Local state is kept in sync with the provider: on any failure the
    /// session is left exactly as it was.
    ///
    /// # Errors
    ///
    /// Returns [`LogoutError::NotAuthenticated`] for an anonymous session,
    /// [`LogoutError::MissingRefreshToken`] if no refresh token was issued,
    /// or the revocation error.
    pub async fn logout(&self, session: &mut Session) -> Result<(), LogoutError> {
        let access_token = session
            .bearer()
            .ok_or(LogoutError::NotAuthenticated)?
            .to_owned();
        let refresh_token = session
            .refresh_token()
            .ok_or(LogoutError::MissingRefreshToken)?
            .to_owned();

        if let Err(e) = self.revoke_session(&access_token, &refresh_token).await {
            tracing::error!(error = %e, "Logout failed, session kept");
            return Err(e);
        }

        session.clear();
        tracing::info!("Logged out");
        Ok(())
    }

    /// Fetch the provider's userinfo for an access token.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::Http`] on network failure,
    /// [`ExchangeError::Status`] on a non-2xx answer, or
    /// [`ExchangeError::MalformedBody`] for an unexpected body.
    pub async fn get_user_info(&self, access_token: &str) -> Result<UserInfo, ExchangeError> {
        let response = self
            .http
            .get(self.config.userinfo_url.clone())
            .bearer_auth(access_token)
            .send()
            .await?;

        let response = ensure_success(response, "userinfo request", |status, detail| {
            ExchangeError::Status { status, detail }
        })
        .await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ExchangeError::MalformedBody(e.to_string()))
    }
}

impl fmt::Debug for AuthClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

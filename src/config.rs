use std::fmt;
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;
use crate::types::RoleRule;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_JWKS_SIZE_LIMIT: usize = 1024 * 1024;

/// Identity-provider and backend configuration for the client.
///
/// Required fields are constructor parameters. Every provider endpoint
/// defaults to the Keycloak realm layout below the issuer:
///
/// ```rust,ignore
/// use amis_auth::AuthConfig;
///
/// let config = AuthConfig::new(
///     "https://idp.example.com/realms/amis",
///     "amis-api",
///     "s3cret",
///     "amis://callback".parse()?,
/// )?
/// .with_api_url("https://api.example.com".parse()?);
/// ```
#[derive(Clone)]
#[non_exhaustive]
pub struct AuthConfig {
    pub(crate) issuer: String,
    pub(crate) issuer_url: Url,
    pub(crate) client_id: String,
    pub(crate) client_secret: String,
    pub(crate) redirect_uri: Url,
    pub(crate) auth_url: Url,
    pub(crate) token_url: Url,
    pub(crate) jwks_url: Url,
    pub(crate) logout_url: Url,
    pub(crate) userinfo_url: Url,
    pub(crate) api_url: Option<Url>,
    pub(crate) scopes: Vec<String>,
    pub(crate) admin_role: String,
    pub(crate) role_resource: String,
    pub(crate) http_timeout: Duration,
    pub(crate) jwks_size_limit: usize,
}

impl AuthConfig {
    /// Create a configuration for a confidential client of the given realm issuer.
    ///
    /// `issuer` is kept verbatim for the `iss` comparison; the endpoints are
    /// derived from its parsed form.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUrl`] if `issuer` is not a URL.
    pub fn new(
        issuer: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: Url,
    ) -> Result<Self, ConfigError> {
        let issuer = issuer.into();
        let issuer_url = issuer
            .parse::<Url>()
            .map_err(|source| ConfigError::InvalidUrl {
                name: "AMIS_ISSUER",
                source,
            })?;
        let client_id = client_id.into();
        Ok(Self {
            auth_url: realm_endpoint(&issuer_url, "auth"),
            token_url: realm_endpoint(&issuer_url, "token"),
            jwks_url: realm_endpoint(&issuer_url, "certs"),
            logout_url: realm_endpoint(&issuer_url, "logout"),
            userinfo_url: realm_endpoint(&issuer_url, "userinfo"),
            issuer,
            issuer_url,
            role_resource: client_id.clone(),
            client_id,
            client_secret: client_secret.into(),
            redirect_uri,
            api_url: None,
            scopes: vec!["openid".into(), "profile".into(), "email".into()],
            admin_role: "ADMIN".into(),
            http_timeout: DEFAULT_TIMEOUT,
            jwks_size_limit: DEFAULT_JWKS_SIZE_LIMIT,
        })
    }

    /// Create a configuration from environment variables.
    ///
    /// # Required env vars
    /// - `AMIS_ISSUER`: realm issuer URL (compared verbatim with the `iss` claim)
    /// - `AMIS_CLIENT_ID`: OAuth2 client ID
    /// - `AMIS_CLIENT_SECRET`: OAuth2 client secret
    /// - `AMIS_REDIRECT_URI`: redirect URI registered for the client
    ///
    /// # Optional env vars
    /// - `AMIS_AUTH_URL`, `AMIS_TOKEN_URL`, `AMIS_JWKS_URL`, `AMIS_LOGOUT_URL`,
    ///   `AMIS_USERINFO_URL`: endpoint overrides
    /// - `AMIS_API_URL`: backend REST API base URL
    /// - `AMIS_SCOPES`: comma-separated scopes
    /// - `AMIS_ADMIN_ROLE`: role granting admin rights (default `ADMIN`)
    /// - `AMIS_ROLE_RESOURCE`: `resource_access` entry holding the roles (default: client ID)
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a required variable is missing or a URL is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };
        let url = |name: &'static str, value: &str| {
            value
                .parse::<Url>()
                .map_err(|source| ConfigError::InvalidUrl { name, source })
        };

        let issuer = required("AMIS_ISSUER")?;
        url("AMIS_ISSUER", &issuer)?;
        let redirect_uri = url("AMIS_REDIRECT_URI", &required("AMIS_REDIRECT_URI")?)?;
        let mut config = Self::new(
            issuer,
            required("AMIS_CLIENT_ID")?,
            required("AMIS_CLIENT_SECRET")?,
            redirect_uri,
        )?;

        if let Some(v) = lookup("AMIS_AUTH_URL") {
            config = config.with_auth_url(url("AMIS_AUTH_URL", &v)?);
        }
        if let Some(v) = lookup("AMIS_TOKEN_URL") {
            config = config.with_token_url(url("AMIS_TOKEN_URL", &v)?);
        }
        if let Some(v) = lookup("AMIS_JWKS_URL") {
            config = config.with_jwks_url(url("AMIS_JWKS_URL", &v)?);
        }
        if let Some(v) = lookup("AMIS_LOGOUT_URL") {
            config = config.with_logout_url(url("AMIS_LOGOUT_URL", &v)?);
        }
        if let Some(v) = lookup("AMIS_USERINFO_URL") {
            config = config.with_userinfo_url(url("AMIS_USERINFO_URL", &v)?);
        }
        if let Some(v) = lookup("AMIS_API_URL") {
            config = config.with_api_url(url("AMIS_API_URL", &v)?);
        }
        if let Some(v) = lookup("AMIS_SCOPES") {
            let scopes: Vec<String> = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if scopes.is_empty() {
                return Err(ConfigError::Invalid {
                    name: "AMIS_SCOPES",
                    detail: "no scopes given".into(),
                });
            }
            config = config.with_scopes(scopes);
        }
        if let Some(v) = lookup("AMIS_ADMIN_ROLE") {
            config = config.with_admin_role(v);
        }
        if let Some(v) = lookup("AMIS_ROLE_RESOURCE") {
            config = config.with_role_resource(v);
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_auth_url(mut self, url: Url) -> Self {
        self.auth_url = url;
        self
    }

    #[must_use]
    pub fn with_token_url(mut self, url: Url) -> Self {
        self.token_url = url;
        self
    }

    #[must_use]
    pub fn with_jwks_url(mut self, url: Url) -> Self {
        self.jwks_url = url;
        self
    }

    #[must_use]
    pub fn with_logout_url(mut self, url: Url) -> Self {
        self.logout_url = url;
        self
    }

    #[must_use]
    pub fn with_userinfo_url(mut self, url: Url) -> Self {
        self.userinfo_url = url;
        self
    }

    /// Base URL of the backend REST API used by [`AccountClient`](crate::AccountClient).
    #[must_use]
    pub fn with_api_url(mut self, url: Url) -> Self {
        self.api_url = Some(url);
        self
    }

    /// Override the requested scopes (default: `["openid", "profile", "email"]`).
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    #[must_use]
    pub fn with_admin_role(mut self, role: impl Into<String>) -> Self {
        self.admin_role = role.into();
        self
    }

    /// Override the `resource_access` key holding the client roles.
    #[must_use]
    pub fn with_role_resource(mut self, resource: impl Into<String>) -> Self {
        self.role_resource = resource.into();
        self
    }

    /// Connect and read timeout for every provider call.
    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Largest key-set document accepted from the JWKS endpoint.
    #[must_use]
    pub fn with_jwks_size_limit(mut self, bytes: usize) -> Self {
        self.jwks_size_limit = bytes;
        self
    }

    /// Issuer exactly as configured; the `iss` claim must equal it.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn issuer_url(&self) -> &Url {
        &self.issuer_url
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    #[must_use]
    pub fn auth_url(&self) -> &Url {
        &self.auth_url
    }

    #[must_use]
    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    #[must_use]
    pub fn jwks_url(&self) -> &Url {
        &self.jwks_url
    }

    #[must_use]
    pub fn logout_url(&self) -> &Url {
        &self.logout_url
    }

    #[must_use]
    pub fn userinfo_url(&self) -> &Url {
        &self.userinfo_url
    }

    #[must_use]
    pub fn api_url(&self) -> Option<&Url> {
        self.api_url.as_ref()
    }

    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    #[must_use]
    pub fn admin_role(&self) -> &str {
        &self.admin_role
    }

    #[must_use]
    pub fn role_resource(&self) -> &str {
        &self.role_resource
    }

    /// Admin rule derived from [`role_resource`](Self::role_resource) and [`admin_role`](Self::admin_role).
    #[must_use]
    pub fn role_rule(&self) -> RoleRule {
        RoleRule::new(self.role_resource.clone(), self.admin_role.clone())
    }

    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        self.http_timeout
    }

    #[must_use]
    pub fn jwks_size_limit(&self) -> usize {
        self.jwks_size_limit
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("issuer", &self.issuer)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri.as_str())
            .field("auth_url", &self.auth_url.as_str())
            .field("token_url", &self.token_url.as_str())
            .field("jwks_url", &self.jwks_url.as_str())
            .field("logout_url", &self.logout_url.as_str())
            .field("userinfo_url", &self.userinfo_url.as_str())
            .field("api_url", &self.api_url.as_ref().map(Url::as_str))
            .field("scopes", &self.scopes)
            .field("admin_role", &self.admin_role)
            .field("role_resource", &self.role_resource)
            .field("http_timeout", &self.http_timeout)
            .field("jwks_size_limit", &self.jwks_size_limit)
            .finish()
    }
}

/// `{issuer}/protocol/openid-connect/{leaf}`; a non-hierarchical issuer is returned as is.
fn realm_endpoint(issuer: &Url, leaf: &str) -> Url {
    let mut url = issuer.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments
            .pop_if_empty()
            .extend(["protocol", "openid-connect", leaf]);
    }
    url
}

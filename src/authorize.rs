use std::fmt;

use url::Url;

use crate::config::AuthConfig;
use crate::error::AuthorizationError;
use crate::pkce;

/// One interactive login attempt against the identity provider.
///
/// Built fresh per attempt; each carries its own `state` and PKCE verifier.
#[derive(Clone)]
#[non_exhaustive]
pub struct AuthorizationRequest {
    authorization_endpoint: Url,
    token_endpoint: Url,
    client_id: String,
    redirect_uri: Url,
    scopes: Vec<String>,
    state: String,
    code_verifier: String,
}

impl AuthorizationRequest {
    pub const RESPONSE_TYPE: &'static str = "code";

    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            authorization_endpoint: config.auth_url.clone(),
            token_endpoint: config.token_url.clone(),
            client_id: config.client_id.clone(),
            redirect_uri: config.redirect_uri.clone(),
            scopes: config.scopes.clone(),
            state: pkce::generate_state(),
            code_verifier: pkce::generate_code_verifier(),
        }
    }

    /// Browser URL for the authorization endpoint.
    #[must_use]
    pub fn url(&self) -> Url {
        let code_challenge = pkce::generate_code_challenge(&self.code_verifier);
        let scope = self.scopes.join(" ");

        let mut url = self.authorization_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("response_type", Self::RESPONSE_TYPE)
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", self.redirect_uri.as_str())
            .append_pair("scope", &scope)
            .append_pair("state", &self.state)
            .append_pair("code_challenge", &code_challenge)
            .append_pair("code_challenge_method", pkce::CHALLENGE_METHOD);
        url
    }

    /// What the caller must keep until the redirect comes back.
    #[must_use]
    pub fn pending(&self) -> PendingAuthorization {
        PendingAuthorization {
            state: self.state.clone(),
            code_verifier: self.code_verifier.clone(),
        }
    }

    #[must_use]
    pub fn authorization_endpoint(&self) -> &Url {
        &self.authorization_endpoint
    }

    #[must_use]
    pub fn token_endpoint(&self) -> &Url {
        &self.token_endpoint
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
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    #[must_use]
    pub fn state(&self) -> &str {
        &self.state
    }
}

impl fmt::Debug for AuthorizationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationRequest")
            .field("authorization_endpoint", &self.authorization_endpoint.as_str())
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri.as_str())
            .field("scopes", &self.scopes)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// State and PKCE verifier of the attempt in flight.
#[derive(Clone, PartialEq, Eq)]
pub struct PendingAuthorization {
    state: String,
    code_verifier: String,
}

impl PendingAuthorization {
    #[must_use]
    pub fn state(&self) -> &str {
        &self.state
    }

    #[must_use]
    pub fn code_verifier(&self) -> &str {
        &self.code_verifier
    }
}

impl fmt::Debug for PendingAuthorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingAuthorization")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Opens the provider-controlled login page (browser, web view, terminal prompt).
pub trait Launcher {
    /// Hand the authorization URL to the user agent.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorizationError::Launch`] if the user agent cannot be opened.
    fn launch(&self, url: &Url) -> Result<(), AuthorizationError>;
}

impl<F> Launcher for F
where
    F: Fn(&Url) -> Result<(), AuthorizationError>,
{
    fn launch(&self, url: &Url) -> Result<(), AuthorizationError> {
        self(url)
    }
}

/// Build a fresh request and hand it to the launcher.
///
/// The result arrives later through [`on_redirect`].
///
/// # Errors
///
/// Returns the launcher's error; no attempt is pending in that case.
pub fn start_login(
    config: &AuthConfig,
    launcher: &dyn Launcher,
) -> Result<PendingAuthorization, AuthorizationError> {
    let request = AuthorizationRequest::new(config);
    launcher.launch(&request.url())?;
    tracing::debug!(state = %request.state(), "Authorization flow launched");
    Ok(request.pending())
}

/// Authorization code delivered by the redirect.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthorizationResponse {
    code: String,
    state: String,
}

impl AuthorizationResponse {
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    #[must_use]
    pub fn state(&self) -> &str {
        &self.state
    }
}

impl fmt::Debug for AuthorizationResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationResponse")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Classification of a redirect payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectOutcome {
    Code(AuthorizationResponse),
    Error(AuthorizationError),
    Cancelled,
}

/// Parse the redirect the OS handed back into a code, an error, or nothing.
///
/// Fails closed: anything that is not a well-formed code for the pending
/// attempt is never classified as [`RedirectOutcome::Code`].
#[must_use]
pub fn on_redirect(
    config: &AuthConfig,
    raw: &str,
    pending: &PendingAuthorization,
) -> RedirectOutcome {
    let Ok(url) = raw.trim().parse::<Url>() else {
        tracing::warn!("Redirect payload is not a URL");
        return RedirectOutcome::Cancelled;
    };

    if !same_target(&url, &config.redirect_uri) {
        tracing::warn!(target_uri = %strip_query(&url), "Redirect does not match the configured redirect URI");
        return RedirectOutcome::Cancelled;
    }

    let mut code = None;
    let mut state = None;
    let mut error = None;
    let mut error_description = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "error_description" => error_description = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error.filter(|e| !e.is_empty()) {
        tracing::warn!(error = %error, description = ?error_description, "Authorization error from provider");
        return RedirectOutcome::Error(AuthorizationError::Provider {
            code: error,
            description: error_description,
        });
    }

    let Some(code) = code.filter(|c| !c.is_empty()) else {
        tracing::info!("Redirect carried neither code nor error; treating as cancelled");
        return RedirectOutcome::Cancelled;
    };

    match state {
        Some(state) if state == pending.state => {
            RedirectOutcome::Code(AuthorizationResponse { code, state })
        }
        _ => {
            tracing::warn!("Authorization state mismatch");
            RedirectOutcome::Error(AuthorizationError::StateMismatch)
        }
    }
}

fn same_target(actual: &Url, expected: &Url) -> bool {
    actual.scheme() == expected.scheme()
        && actual.host_str() == expected.host_str()
        && actual.port_or_known_default() == expected.port_or_known_default()
        && actual.path().trim_end_matches('/') == expected.path().trim_end_matches('/')
}

fn strip_query(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.into()
}

use time::OffsetDateTime;

use crate::authorize::{self, Launcher, PendingAuthorization, RedirectOutcome};
use crate::config::AuthConfig;
use crate::error::{AuthorizationError, ConfigError, LoginError, LogoutError, VerificationError};
use crate::oauth::{AuthClient, build_http_client};
use crate::session::Session;
use crate::token::TokenVerifier;
use crate::types::SubjectId;

/// Result of a completed login.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct LoginOutcome {
    pub subject_id: Option<SubjectId>,
    pub is_admin: bool,
}

/// Redirect → token exchange → verification → session, as one pipeline.
///
/// ```rust,ignore
/// let flow = LoginFlow::new(AuthConfig::from_env()?)?;
/// let mut session = Session::new();
///
/// let pending = flow.start_login(&open_browser)?;
/// // ... the OS delivers the redirect ...
/// match flow.complete(&redirect, &pending, &mut session).await {
///     Ok(outcome) => show_account(outcome),
///     Err(LoginError::Cancelled) => {}
///     Err(e) => show_error(e),
/// }
/// ```
///
/// Concurrent attempts are not tracked here: a redirect is accepted only for
/// the [`PendingAuthorization`] it is completed with, so keeping just the
/// latest one makes a newer attempt supersede older ones.
pub struct LoginFlow {
    client: AuthClient,
    verifier: TokenVerifier,
}

impl LoginFlow {
    /// Build the client and verifier over one shared HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::HttpClient`] if the HTTP client cannot be built.
    pub fn new(config: AuthConfig) -> Result<Self, ConfigError> {
        let http = build_http_client(&config)?;
        let verifier = TokenVerifier::with_http_client(&config, http.clone());
        let client = AuthClient::from_shared(config, http);
        Ok(Self { client, verifier })
    }

    #[must_use]
    pub fn from_parts(client: AuthClient, verifier: TokenVerifier) -> Self {
        Self { client, verifier }
    }

    #[must_use]
    pub fn client(&self) -> &AuthClient {
        &self.client
    }

    #[must_use]
    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        self.client.config()
    }

    /// Launch the interactive flow; keep the returned value until the redirect.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorizationError::Launch`] if the launcher fails.
    pub fn start_login(
        &self,
        launcher: &dyn Launcher,
    ) -> Result<PendingAuthorization, AuthorizationError> {
        authorize::start_login(self.config(), launcher)
    }

    /// Finish a login from the raw redirect payload.
    ///
    /// The session is written only once every stage has succeeded; any
    /// failure leaves it untouched and is terminal for this attempt.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError`] tagged with the stage that failed.
    pub async fn complete(
        &self,
        raw_redirect: &str,
        pending: &PendingAuthorization,
        session: &mut Session,
    ) -> Result<LoginOutcome, LoginError> {
        let response = match authorize::on_redirect(self.config(), raw_redirect, pending) {
            RedirectOutcome::Code(response) => response,
            RedirectOutcome::Error(e) => return Err(e.into()),
            RedirectOutcome::Cancelled => return Err(LoginError::Cancelled),
        };

        let tokens = self
            .client
            .exchange_code(&response, pending)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Token exchange failed"))?;

        let verified = self
            .verifier
            .verify(&tokens.access_token)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Access token rejected"))?;

        session.initialize(
            Some(verified),
            tokens.refresh_token,
            &self.config().role_rule(),
        );
        session.set_expires_in(tokens.expires_in, OffsetDateTime::now_utc());

        tracing::info!(
            subject = ?session.subject_id(),
            admin = session.is_admin(),
            "Login successful"
        );

        Ok(LoginOutcome {
            subject_id: session.subject_id().cloned(),
            is_admin: session.is_admin(),
        })
    }

    /// Re-check the session's access token; a token found invalid ends the session.
    ///
    /// A key-set fetch failure proves nothing about the token, so the session
    /// is kept in that case.
    ///
    /// # Errors
    ///
    /// Returns the [`VerificationError`]; an anonymous session reports
    /// [`VerificationError::Malformed`].
    pub async fn revalidate(&self, session: &mut Session) -> Result<(), VerificationError> {
        let Some(token) = session.bearer().map(str::to_owned) else {
            return Err(VerificationError::Malformed("no access token".into()));
        };
        match self.verifier.verify(&token).await {
            Ok(_) => Ok(()),
            Err(e @ VerificationError::KeyFetch(_)) => {
                tracing::warn!(error = %e, "Could not revalidate session token");
                Err(e)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Session token no longer valid, clearing session");
                session.clear();
                Err(e)
            }
        }
    }

    /// See [`AuthClient::logout`].
    ///
    /// # Errors
    ///
    /// Returns the [`LogoutError`]; the session is unchanged in that case.
    pub async fn logout(&self, session: &mut Session) -> Result<(), LogoutError> {
        self.client.logout(session).await
    }
}

use std::fmt;

use reqwest::multipart::{Form, Part};
use url::Url;

use crate::account::{api_base, api_endpoint};
use crate::error::{AccountError, ConfigError};
use crate::oauth::{AuthClient, ensure_success};
use crate::session::Session;
use crate::types::{EventId, SubjectId};

const CERTIFICATE_MIME: &str = "application/pdf";

/// Medical certificate attached to an event registration.
#[derive(Clone)]
pub struct Certificate {
    file_name: String,
    bytes: Vec<u8>,
}

impl Certificate {
    #[must_use]
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("file_name", &self.file_name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// What a member shows at check-in: their subject ID, rendered as a QR code
/// by the app.
#[must_use]
pub fn check_in_payload(session: &Session) -> Option<&str> {
    session
        .subject_id()
        .filter(|_| session.is_logged_in())
        .map(SubjectId::as_str)
}

/// Event registration and check-in calls to the backend.
#[derive(Debug, Clone)]
pub struct EventClient {
    base: Url,
    http: reqwest::Client,
}

impl EventClient {
    /// Client for the configured backend, sharing the auth client's pool.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] if no backend URL is configured.
    pub fn new(auth: &AuthClient) -> Result<Self, ConfigError> {
        Ok(Self {
            base: api_base(auth)?,
            http: auth.http().clone(),
        })
    }

    #[must_use]
    pub fn with_base_url(base: Url, http: reqwest::Client) -> Self {
        Self { base, http }
    }

    /// `POST /api/events/{id}/register` with the certificate as the `file` part.
    ///
    /// # Errors
    ///
    /// Returns [`AccountError::NotAuthenticated`] for an anonymous session,
    /// otherwise the transport or status error.
    pub async fn register(
        &self,
        session: &Session,
        event: EventId,
        certificate: Certificate,
    ) -> Result<(), AccountError> {
        let token = session.bearer().ok_or(AccountError::NotAuthenticated)?;
        let part = Part::bytes(certificate.bytes)
            .file_name(certificate.file_name)
            .mime_str(CERTIFICATE_MIME)?;

        let response = self
            .http
            .post(api_endpoint(&self.base, &format!("api/events/{event}/register"))?)
            .bearer_auth(token)
            .multipart(Form::new().part("file", part))
            .send()
            .await?;
        ensure_success(response, "event registration", |status, detail| {
            AccountError::Status { status, detail }
        })
        .await?;

        tracing::info!(event = %event, "Registered to event");
        Ok(())
    }

    /// `GET /api/events/{id}/isRegistered` for the session's user.
    ///
    /// # Errors
    ///
    /// Same as [`register`](Self::register).
    pub async fn is_registered(
        &self,
        session: &Session,
        event: EventId,
    ) -> Result<bool, AccountError> {
        let token = session.bearer().ok_or(AccountError::NotAuthenticated)?;
        let url = api_endpoint(&self.base, &format!("api/events/{event}/isRegistered"))?;
        self.get_flag(url, token, "registration lookup").await
    }

    /// `DELETE /api/events/{id}/unregister`.
    ///
    /// # Errors
    ///
    /// Same as [`register`](Self::register).
    pub async fn unregister(&self, session: &Session, event: EventId) -> Result<(), AccountError> {
        let token = session.bearer().ok_or(AccountError::NotAuthenticated)?;
        let response = self
            .http
            .delete(api_endpoint(&self.base, &format!("api/events/{event}/unregister"))?)
            .bearer_auth(token)
            .send()
            .await?;
        ensure_success(response, "event unregistration", |status, detail| {
            AccountError::Status { status, detail }
        })
        .await?;

        tracing::info!(event = %event, "Unregistered from event");
        Ok(())
    }

    /// Check-in lookup for a scanned member: is `user` registered to `event`?
    ///
    /// Reserved to admins.
    ///
    /// # Errors
    ///
    /// Returns [`AccountError::NotAuthenticated`] or [`AccountError::NotAdmin`]
    /// before any request, otherwise the transport or status error.
    pub async fn check_registration(
        &self,
        session: &Session,
        event: EventId,
        user: &SubjectId,
    ) -> Result<bool, AccountError> {
        let token = session.bearer().ok_or(AccountError::NotAuthenticated)?;
        if !session.is_admin() {
            return Err(AccountError::NotAdmin);
        }

        let mut url = api_endpoint(&self.base, "api/events/checkRegistration")?;
        url.query_pairs_mut()
            .append_pair("eventId", &event.to_string())
            .append_pair("userId", user.as_str());
        self.get_flag(url, token, "check-in lookup").await
    }

    async fn get_flag(
        &self,
        url: Url,
        token: &str,
        operation: &'static str,
    ) -> Result<bool, AccountError> {
        let response = self.http.get(url).bearer_auth(token).send().await?;
        let response = ensure_success(response, operation, |status, detail| {
            AccountError::Status { status, detail }
        })
        .await?;
        Ok(parse_flag(&response.text().await?))
    }
}

/// Plain-text boolean body; anything but `true` reads as `false`.
fn parse_flag(body: &str) -> bool {
    body.trim().eq_ignore_ascii_case("true")
}

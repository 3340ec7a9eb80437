use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

use crate::error::{AccountError, ConfigError};
use crate::oauth::{AuthClient, ensure_success};
use crate::session::Session;

const UNKNOWN: &str = "Unknown";

/// Account details held by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct UserProfile {
    #[serde(default = "unknown")]
    pub given_name: String,
    #[serde(default = "unknown")]
    pub family_name: String,
    #[serde(default = "unknown")]
    pub email: String,
}

fn unknown() -> String {
    UNKNOWN.to_owned()
}

/// Outcome of a credential change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountUpdate {
    /// The backend accepted the change and the session was ended.
    LoggedOut,
    /// The backend refused the change with this message.
    Rejected(String),
}

/// Sign-up details for `POST /api/user/register`.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

impl fmt::Debug for NewAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewAccount")
            .field("username", &self.username)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Outcome of a sign-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Created,
    /// The backend refused the account with this message.
    Rejected(String),
}

#[derive(Deserialize)]
struct MessageBody {
    #[serde(default)]
    message: Option<String>,
}

/// Backend base URL from the configuration.
pub(crate) fn api_base(auth: &AuthClient) -> Result<Url, ConfigError> {
    auth.config()
        .api_url
        .clone()
        .ok_or(ConfigError::Missing("AMIS_API_URL"))
}

/// `path` below `base`, keeping any path prefix `base` carries.
pub(crate) fn api_endpoint(base: &Url, path: &str) -> Result<Url, AccountError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        base.set_path(&format!("{}/", base.path()));
    }
    base.join(path).map_err(|source| AccountError::InvalidEndpoint {
        path: path.to_owned(),
        source,
    })
}

/// `message` of a backend answer, `"Unknown error"` when absent.
async fn read_message(response: reqwest::Response) -> Result<String, AccountError> {
    let text = response.text().await?;
    Ok(serde_json::from_str::<MessageBody>(&text)
        .map_err(|e| AccountError::MalformedBody(e.to_string()))?
        .message
        .unwrap_or_else(|| "Unknown error".to_owned()))
}

/// Authenticated calls to the backend `/api/user` resource.
#[derive(Debug, Clone)]
pub struct AccountClient {
    base: Url,
    http: reqwest::Client,
}

impl AccountClient {
    /// Client for the backend configured with [`AuthConfig::with_api_url`](crate::AuthConfig::with_api_url),
    /// sharing the auth client's HTTP connection pool.
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

    /// Client for an explicit backend URL.
    #[must_use]
    pub fn with_base_url(base: Url, http: reqwest::Client) -> Self {
        Self { base, http }
    }

    /// `POST /api/user/register`; needs no session.
    ///
    /// # Errors
    ///
    /// Returns the transport, status or body error. A refusal the backend
    /// explains in its `message` is [`Registration::Rejected`].
    pub async fn register(&self, account: &NewAccount) -> Result<Registration, AccountError> {
        let response = self
            .http
            .post(self.endpoint("api/user/register")?)
            .json(account)
            .send()
            .await?;
        let response = ensure_success(response, "registration", |status, detail| {
            AccountError::Status { status, detail }
        })
        .await?;

        let message = read_message(response).await?;
        if message.contains("successfully") {
            tracing::info!(username = %account.username, "Account registered");
            Ok(Registration::Created)
        } else {
            tracing::warn!(username = %account.username, message = %message, "Registration refused");
            Ok(Registration::Rejected(message))
        }
    }

    /// `GET /api/user`. Missing fields read as `"Unknown"`.
    ///
    /// # Errors
    ///
    /// Returns [`AccountError::NotAuthenticated`] for an anonymous session,
    /// otherwise the transport, status or body error.
    pub async fn fetch_profile(&self, session: &Session) -> Result<UserProfile, AccountError> {
        let token = session.bearer().ok_or(AccountError::NotAuthenticated)?;
        let response = self
            .http
            .get(self.endpoint("api/user")?)
            .bearer_auth(token)
            .send()
            .await?;
        let response = ensure_success(response, "profile fetch", |status, detail| {
            AccountError::Status { status, detail }
        })
        .await?;

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| AccountError::MalformedBody(e.to_string()))
    }

    /// `PUT /api/user/email`; a successful change ends the session.
    ///
    /// # Errors
    ///
    /// See [`fetch_profile`](Self::fetch_profile); a failed logout after an
    /// accepted change is reported as [`AccountError::Logout`].
    pub async fn update_email(
        &self,
        session: &mut Session,
        auth: &AuthClient,
        new_email: &str,
    ) -> Result<AccountUpdate, AccountError> {
        self.update_credential(session, auth, "api/user/email", json!({ "newEmail": new_email }))
            .await
    }

    /// `PUT /api/user/password`; a successful change ends the session.
    ///
    /// # Errors
    ///
    /// Same as [`update_email`](Self::update_email).
    pub async fn update_password(
        &self,
        session: &mut Session,
        auth: &AuthClient,
        new_password: &str,
    ) -> Result<AccountUpdate, AccountError> {
        self.update_credential(
            session,
            auth,
            "api/user/password",
            json!({ "newPassword": new_password }),
        )
        .await
    }

    async fn update_credential(
        &self,
        session: &mut Session,
        auth: &AuthClient,
        path: &str,
        body: serde_json::Value,
    ) -> Result<AccountUpdate, AccountError> {
        let token = session.bearer().ok_or(AccountError::NotAuthenticated)?;
        let response = self
            .http
            .put(self.endpoint(path)?)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        let response = ensure_success(response, "credential update", |status, detail| {
            AccountError::Status { status, detail }
        })
        .await?;

        let message = read_message(response).await?;
        if !message.contains("successfully") {
            tracing::warn!(path, message = %message, "Credential update refused");
            return Ok(AccountUpdate::Rejected(message));
        }

        // changed credentials invalidate the provider session
        tracing::info!(path, "Credentials changed, logging out");
        auth.logout(session).await?;
        Ok(AccountUpdate::LoggedOut)
    }

    fn endpoint(&self, path: &str) -> Result<Url, AccountError> {
        api_endpoint(&self.base, path)
    }
}

/// Invalid or incomplete client configuration.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{name}: {source}")]
    InvalidUrl {
        name: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("{name}: {detail}")]
    Invalid { name: &'static str, detail: String },
    #[error("HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// The interactive authorization step did not yield a code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum AuthorizationError {
    /// The identity provider answered the redirect with an `error` parameter.
    #[error("provider rejected authorization: {code}{}", .description.as_deref().map(|d| format!(" ({d})")).unwrap_or_default())]
    Provider {
        code: String,
        description: Option<String>,
    },
    /// The redirect carried a code whose `state` does not belong to the pending attempt.
    #[error("authorization state mismatch")]
    StateMismatch,
    /// The interactive flow could not be opened.
    #[error("failed to launch authorization: {0}")]
    Launch(String),
}

/// Authorization code could not be exchanged for tokens.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ExchangeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("token endpoint returned {status}: {detail}")]
    Status { status: u16, detail: String },
    #[error("malformed token response: {0}")]
    MalformedBody(String),
}

/// Access token must not be trusted.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum VerificationError {
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("token header has no kid")]
    MissingKeyId,
    #[error("no signing key for kid '{0}'")]
    UnknownKey(String),
    #[error("signature verification failed: {0}")]
    Signature(String),
    #[error("token expired")]
    Expired,
    #[error("token not valid yet")]
    NotYetValid,
    #[error("iss: expected '{expected}', got '{actual}'")]
    IssuerMismatch { expected: String, actual: String },
    #[error("aud: expected '{expected}' in {actual:?}")]
    AudienceMismatch {
        expected: String,
        actual: Vec<String>,
    },
    #[error("key set fetch failed: {0}")]
    KeyFetch(String),
}

/// Revocation at the identity provider failed; the local session was kept.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum LogoutError {
    #[error("no authenticated session to log out")]
    NotAuthenticated,
    #[error("session has no refresh token")]
    MissingRefreshToken,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("logout endpoint returned {status}: {detail}")]
    Status { status: u16, detail: String },
}

/// Terminal outcome of a failed login attempt.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum LoginError {
    /// The redirect was neither a code nor a provider error.
    #[error("login cancelled")]
    Cancelled,
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
    #[error(transparent)]
    Verification(#[from] VerificationError),
}

/// Failure of a call to the backend API.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AccountError {
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("admin role required")]
    NotAdmin,
    #[error("invalid backend endpoint '{path}': {source}")]
    InvalidEndpoint {
        path: String,
        #[source]
        source: url::ParseError,
    },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("backend returned {status}: {detail}")]
    Status { status: u16, detail: String },
    #[error("malformed backend response: {0}")]
    MalformedBody(String),
    #[error(transparent)]
    Logout(#[from] LogoutError),
}

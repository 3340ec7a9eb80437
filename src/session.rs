use std::fmt;

use time::{Duration, OffsetDateTime};

use crate::claims;
use crate::token::VerifiedToken;
use crate::types::{RoleRule, SubjectId};

/// Top-level login state. `admin` is orthogonal to being authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Authenticated { admin: bool },
}

/// Post-login state of the client.
///
/// An explicit context object: whoever coordinates the screens owns it and
/// passes it by `&mut` to the operations that change it.
#[derive(Clone, Default)]
pub struct Session {
    access_token: Option<VerifiedToken>,
    refresh_token: Option<String>,
    is_logged_in: bool,
    is_admin: bool,
    subject_id: Option<SubjectId>,
    expires_at: Option<OffsetDateTime>,
}

impl Session {
    /// Empty, anonymous session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the tokens and derive `is_admin` and `subject_id` from the
    /// access token's payload.
    pub fn initialize(
        &mut self,
        access_token: Option<VerifiedToken>,
        refresh_token: Option<String>,
        rule: &RoleRule,
    ) {
        self.is_logged_in = access_token.is_some();
        self.is_admin = access_token
            .as_ref()
            .is_some_and(|token| claims::is_admin(token, rule));
        self.subject_id = access_token.as_ref().and_then(claims::subject_id);
        self.access_token = access_token;
        self.refresh_token = refresh_token;
        self.expires_at = None;

        tracing::debug!(
            logged_in = self.is_logged_in,
            admin = self.is_admin,
            subject = ?self.subject_id,
            "Session initialized"
        );
    }

    /// Record the access-token lifetime reported by the token endpoint.
    pub(crate) fn set_expires_in(&mut self, expires_in: Option<u64>, now: OffsetDateTime) {
        self.expires_at = expires_in
            .and_then(|secs| i64::try_from(secs).ok())
            .map(|secs| now + Duration::seconds(secs));
    }

    /// Back to anonymous.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        if self.is_logged_in {
            SessionState::Authenticated {
                admin: self.is_admin,
            }
        } else {
            SessionState::Anonymous
        }
    }

    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.is_logged_in
    }

    /// Only ever `true` for a logged-in session.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.is_logged_in && self.is_admin
    }

    #[must_use]
    pub fn subject_id(&self) -> Option<&SubjectId> {
        self.subject_id.as_ref()
    }

    #[must_use]
    pub fn access_token(&self) -> Option<&VerifiedToken> {
        self.access_token.as_ref()
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    /// Access token for `Authorization: Bearer`, present only while logged in.
    #[must_use]
    pub fn bearer(&self) -> Option<&str> {
        self.access_token
            .as_ref()
            .filter(|_| self.is_logged_in)
            .map(VerifiedToken::as_str)
    }

    #[must_use]
    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        self.expires_at
    }

    /// `false` when the lifetime is unknown.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("is_logged_in", &self.is_logged_in)
            .field("is_admin", &self.is_admin)
            .field("subject_id", &self.subject_id)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

#![doc = include_str!("../README.md")]

pub mod account;
pub mod authorize;
pub mod claims;
pub mod config;
pub mod error;
pub mod events;
pub mod flow;
mod jwks;
pub mod oauth;
pub mod pkce;
pub mod session;
pub mod token;
pub mod types;

// Re-exports for convenient access
pub use account::{AccountClient, AccountUpdate, NewAccount, Registration, UserProfile};
pub use authorize::{
    AuthorizationRequest, AuthorizationResponse, Launcher, PendingAuthorization,
    RedirectOutcome, on_redirect, start_login,
};
pub use claims::{DecodedClaims, is_admin, subject_id};
pub use config::AuthConfig;
pub use error::{
    AccountError, AuthorizationError, ConfigError, ExchangeError, LoginError, LogoutError,
    VerificationError,
};
pub use events::{Certificate, EventClient, check_in_payload};
pub use flow::{LoginFlow, LoginOutcome};
pub use oauth::{AuthClient, TokenResponse, UserInfo};
pub use session::{Session, SessionState};
pub use token::{TokenVerifier, VerifiedToken};
pub use types::{EventId, KeyId, RoleRule, SubjectId};

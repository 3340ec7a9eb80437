//! In-process identity provider and backend for the integration tests.
//!
//! Serves the Keycloak realm endpoints (token, certs, logout, userinfo) and
//! the backend `/api/user` resource on one ephemeral port.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use amis_auth::{
    AuthConfig, AuthorizationError, LoginError, LoginFlow, LoginOutcome, Session,
};
use axum::extract::{Form, Json, Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::Router;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{Value, json};
use url::Url;

pub const CLIENT_ID: &str = "amis-api";
pub const CLIENT_SECRET: &str = "s3cret";
pub const REDIRECT_URI: &str = "amis://callback";
pub const KID: &str = "amis-k1";

pub const IDP_KEY_PEM: &str = include_str!("../fixtures/idp_signing_key.pem");
pub const ROGUE_KEY_PEM: &str = include_str!("../fixtures/rogue_signing_key.pem");

const IDP_KEY_N: &str = "2oMrgEPuqbx7hpKqsWvimujTGOSK_3pcU6TJVtWpc1Xw4pZe2DysZ9TY_gNvlsy52S6sGCrrGEWIH_EgQrUHMekCd0iJBEXHZgSlJIbyS9VtH3lzKqDU5MaZj6ZwFkyAr67CMMnqICXQiwVKGkag4Zj5OwnY_jYmBIzCw7aRPE_ZP3XYhSWrciaK1_pJJ-vodinj-wOJzC_7pbD8T7uRba9Kyf_JwwQyX2c3oDphLz2pBJQyaw-xUF4K5lNBwlp6UpwpTeHXbXT2MttnMINA11iuN7VTc-E0gBoBlK_XkFYSFRrRvaFBaxT5fyzdj2iXtC_YxTpRr3mv1EaYwt0vdQ";
const ROGUE_KEY_N: &str = "xtyX4AgzMO4vciV_vZOx4A3XyDWO9Gi1Z4t1JPPlfZGctkug7HLeuDEhISMqE-nrLPCT-EmlftQXLCQEraKeG9J_R4e1ElfxcvPS6EJntpkg8yId0MXoMOap0uN2fl5L4DmzEX1pFYfTEAur0T_B3zZDvgdU7r1LCgRX73zJNFY3JklUHVUaZpKpSQ90z3Jz6Pm9Fw3D9qkkHYyDT7cY_WOdI3bxxXGwHuZxDaYX67eP2baOhwfOuXRuKoTA2uTA_yHTu_EXmpj4y3_Y4feVczwXKYVszSoRN3e_EitQBC0LZSucoGDtTI4kqnap5o-B9ZPEkuZLPlQfr2GdBWKFnw";

/// A request the token endpoint received.
#[derive(Debug, Clone)]
pub struct TokenRequest {
    pub params: HashMap<String, String>,
    pub authorization: Option<String>,
}

/// A certificate upload the backend received.
#[derive(Debug, Clone)]
pub struct Upload {
    pub event_id: i64,
    pub field: Option<String>,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    pub bearer: Option<String>,
}

/// Member whose registrations the backend tracks.
pub const MEMBER: &str = "user-7";

/// What the mock answers, and what it has seen.
pub struct MockState {
    pub jwks_status: StatusCode,
    pub jwks: Value,
    pub jwks_hits: usize,
    pub token_status: StatusCode,
    pub token_body: String,
    pub token_requests: Vec<TokenRequest>,
    pub logout_status: StatusCode,
    pub logout_requests: Vec<HashMap<String, String>>,
    pub logout_bearer: Option<String>,
    pub userinfo: Value,
    pub profile_status: StatusCode,
    pub profile: Value,
    pub api_bearer: Option<String>,
    pub update_message: String,
    pub updates: Vec<(String, Value)>,
    pub register_message: String,
    pub sign_ups: Vec<Value>,
    pub event_status: StatusCode,
    pub registered: HashSet<i64>,
    pub uploads: Vec<Upload>,
    pub event_requests: usize,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            jwks_status: StatusCode::OK,
            jwks: key_set(KID, IDP_KEY_N),
            jwks_hits: 0,
            token_status: StatusCode::OK,
            token_body: String::new(),
            token_requests: Vec::new(),
            logout_status: StatusCode::NO_CONTENT,
            logout_requests: Vec::new(),
            logout_bearer: None,
            userinfo: json!({ "sub": "user-42", "email": "lea@amis.fr" }),
            profile_status: StatusCode::OK,
            profile: json!({ "given_name": "Léa", "family_name": "Martin", "email": "lea@amis.fr" }),
            api_bearer: None,
            update_message: "Email updated successfully".into(),
            updates: Vec::new(),
            register_message: "User registered successfully".into(),
            sign_ups: Vec::new(),
            event_status: StatusCode::OK,
            registered: HashSet::new(),
            uploads: Vec::new(),
            event_requests: 0,
        }
    }
}

type Shared = Arc<Mutex<MockState>>;

pub struct MockIdp {
    pub addr: SocketAddr,
    pub state: Shared,
}

impl MockIdp {
    pub async fn start() -> Self {
        let state: Shared = Arc::new(Mutex::new(MockState::default()));
        let realm = "/realms/amis/protocol/openid-connect";
        let app = Router::new()
            .route(&format!("{realm}/token"), post(token))
            .route(&format!("{realm}/certs"), get(certs))
            .route(&format!("{realm}/logout"), post(logout))
            .route(&format!("{realm}/userinfo"), get(userinfo))
            .route("/api/user", get(profile))
            .route("/api/user/email", put(update_email))
            .route("/api/user/password", put(update_password))
            .route("/api/user/register", post(sign_up))
            .route("/api/events/{id}/register", post(upload_certificate))
            .route("/api/events/{id}/isRegistered", get(is_registered))
            .route("/api/events/{id}/unregister", delete(unregister))
            .route("/api/events/checkRegistration", get(check_registration))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        Self { addr, state }
    }

    pub fn issuer(&self) -> String {
        format!("http://{}/realms/amis", self.addr)
    }

    pub fn config(&self) -> AuthConfig {
        self.config_with_issuer(&self.issuer())
    }

    /// Same endpoints, with the issuer spelled as given.
    pub fn config_with_issuer(&self, issuer: &str) -> AuthConfig {
        AuthConfig::new(issuer, CLIENT_ID, CLIENT_SECRET, REDIRECT_URI.parse().unwrap())
            .unwrap()
            .with_api_url(format!("http://{}", self.addr).parse().unwrap())
    }

    pub fn flow(&self) -> LoginFlow {
        LoginFlow::new(self.config()).unwrap()
    }

    pub fn mock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Make the token endpoint hand out this access token.
    pub fn issue(&self, access_token: &str) {
        self.mock().token_body = json!({
            "access_token": access_token,
            "refresh_token": "r1",
            "expires_in": 300,
            "token_type": "Bearer",
        })
        .to_string();
    }

    /// Publish the rogue key under the regular key ID.
    pub fn rotate_to_rogue_key(&self) {
        self.mock().jwks = key_set(KID, ROGUE_KEY_N);
    }

    /// Claims of a valid access token for `sub` holding `roles` on the client.
    pub fn claims(&self, sub: &str, roles: &[&str]) -> Value {
        json!({
            "iss": self.issuer(),
            "aud": ["account", CLIENT_ID],
            "sub": sub,
            "exp": time::OffsetDateTime::now_utc().unix_timestamp() + 3600,
            "resource_access": { CLIENT_ID: { "roles": roles } },
        })
    }

    pub fn admin_token(&self) -> String {
        sign(&self.claims("user-42", &["USER", "ADMIN"]), IDP_KEY_PEM, Some(KID))
    }

    pub fn user_token(&self) -> String {
        sign(&self.claims(MEMBER, &["USER"]), IDP_KEY_PEM, Some(KID))
    }
}

pub fn key_set(kid: &str, n: &str) -> Value {
    json!({
        "keys": [{ "kty": "RSA", "kid": kid, "use": "sig", "alg": "RS256", "n": n, "e": "AQAB" }]
    })
}

pub fn sign(claims: &Value, key_pem: &str, kid: Option<&str>) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_owned);
    let key = EncodingKey::from_rsa_pem(key_pem.as_bytes()).unwrap();
    jsonwebtoken::encode(&header, claims, &key).unwrap()
}

/// Redirect the provider would send back for this attempt.
pub fn redirect_for(state: &str) -> String {
    format!("{REDIRECT_URI}?code=c0de&state={state}&session_state=abc")
}

/// Runs a whole login against the mock, with a launcher that opens nothing.
pub async fn login(flow: &LoginFlow, session: &mut Session) -> Result<LoginOutcome, LoginError> {
    let pending = flow.start_login(&|_: &Url| -> Result<(), AuthorizationError> { Ok(()) })?;
    flow.complete(&redirect_for(pending.state()), &pending, session)
        .await
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_owned)
}

fn json_response(status: StatusCode, body: String) -> impl IntoResponse {
    (status, [(header::CONTENT_TYPE, "application/json")], body)
}

async fn token(
    State(state): State<Shared>,
    headers: HeaderMap,
    Form(params): Form<HashMap<String, String>>,
) -> impl IntoResponse {
    let mut state = state.lock().unwrap();
    state.token_requests.push(TokenRequest {
        params,
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned),
    });
    json_response(state.token_status, state.token_body.clone())
}

async fn certs(State(state): State<Shared>) -> impl IntoResponse {
    let mut state = state.lock().unwrap();
    state.jwks_hits += 1;
    json_response(state.jwks_status, state.jwks.to_string())
}

async fn logout(
    State(state): State<Shared>,
    headers: HeaderMap,
    Form(params): Form<HashMap<String, String>>,
) -> impl IntoResponse {
    let mut state = state.lock().unwrap();
    state.logout_bearer = bearer(&headers);
    state.logout_requests.push(params);
    state.logout_status
}

async fn userinfo(State(state): State<Shared>, headers: HeaderMap) -> impl IntoResponse {
    let state = state.lock().unwrap();
    if bearer(&headers).is_none() {
        return json_response(StatusCode::UNAUTHORIZED, String::new());
    }
    json_response(StatusCode::OK, state.userinfo.to_string())
}

async fn profile(State(state): State<Shared>, headers: HeaderMap) -> impl IntoResponse {
    let mut state = state.lock().unwrap();
    state.api_bearer = bearer(&headers);
    json_response(state.profile_status, state.profile.to_string())
}

async fn update_email(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    record_update(&state, &headers, "email", body)
}

async fn update_password(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    record_update(&state, &headers, "password", body)
}

fn record_update(state: &Shared, headers: &HeaderMap, what: &str, body: Value) -> Response {
    let mut state = state.lock().unwrap();
    state.api_bearer = bearer(headers);
    state.updates.push((what.to_owned(), body));
    json_response(
        StatusCode::OK,
        json!({ "message": state.update_message }).to_string(),
    )
    .into_response()
}

async fn sign_up(State(state): State<Shared>, Json(body): Json<Value>) -> impl IntoResponse {
    let mut state = state.lock().unwrap();
    state.sign_ups.push(body);
    json_response(
        StatusCode::OK,
        json!({ "message": state.register_message }).to_string(),
    )
}

async fn upload_certificate(
    State(state): State<Shared>,
    Path(event_id): Path<i64>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> StatusCode {
    let mut uploads = Vec::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let field_name = field.name().map(str::to_owned);
        let file_name = field.file_name().map(str::to_owned);
        let content_type = field.content_type().map(str::to_owned);
        let bytes = field.bytes().await.unwrap().to_vec();
        uploads.push(Upload {
            event_id,
            field: field_name,
            file_name,
            content_type,
            bytes,
            bearer: bearer(&headers),
        });
    }

    let mut state = state.lock().unwrap();
    state.event_requests += 1;
    state.uploads.extend(uploads);
    if state.event_status.is_success() {
        state.registered.insert(event_id);
    }
    state.event_status
}

async fn is_registered(
    State(state): State<Shared>,
    Path(event_id): Path<i64>,
    headers: HeaderMap,
) -> (StatusCode, String) {
    let mut state = state.lock().unwrap();
    state.event_requests += 1;
    if bearer(&headers).is_none() {
        return (StatusCode::UNAUTHORIZED, String::new());
    }
    (StatusCode::OK, state.registered.contains(&event_id).to_string())
}

async fn unregister(
    State(state): State<Shared>,
    Path(event_id): Path<i64>,
    headers: HeaderMap,
) -> StatusCode {
    let mut state = state.lock().unwrap();
    state.event_requests += 1;
    if bearer(&headers).is_none() {
        return StatusCode::UNAUTHORIZED;
    }
    state.registered.remove(&event_id);
    StatusCode::NO_CONTENT
}

async fn check_registration(
    State(state): State<Shared>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, String) {
    let mut state = state.lock().unwrap();
    state.event_requests += 1;
    let registered = params
        .get("eventId")
        .and_then(|id| id.parse::<i64>().ok())
        .is_some_and(|id| state.registered.contains(&id))
        && params.get("userId").map(String::as_str) == Some(MEMBER);
    (StatusCode::OK, registered.to_string())
}

// Authentication types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Tenant used when the caller does not pick one
pub const DEFAULT_TENANT: &str = "kleff";

/// Signed-in user as shown to consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Bearer token pair, persisted verbatim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// In-memory session state owned by the session manager
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user: Option<User>,
    /// Always derived from the same `me` response as `user`
    pub tenant: Option<String>,
    pub tokens: Option<TokenPair>,
    /// Access token expiry, when the server reported one
    pub expires_at: Option<DateTime<Utc>>,
    /// Initial hydration in progress
    pub loading: bool,
    /// A login, signup or refresh is in flight
    pub auth_loading: bool,
    pub auth_error: Option<String>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            user: None,
            tenant: None,
            tokens: None,
            expires_at: None,
            loading: true,
            auth_loading: false,
            auth_error: None,
        }
    }
}

impl Session {
    /// Tokens alone do not count; only a validated user does
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

/// OAuth identity providers supported by the identity server
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OAuthProvider {
    Google,
    Github,
}

impl OAuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "google",
            OAuthProvider::Github => "github",
        }
    }
}

/// User object inside the `me` response
#[derive(Debug, Clone, Deserialize)]
pub struct MeUser {
    pub id: String,
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

impl MeUser {
    /// Split into the consumer-facing user and its tenant
    pub fn into_parts(self) -> (User, Option<String>) {
        let user = User {
            id: self.id,
            email: self.email,
            username: self.username,
            name: self.name,
        };
        (user, self.tenant_id)
    }
}

/// GET /auth/me response
#[derive(Debug, Clone, Deserialize)]
pub struct MeResponse {
    pub user: MeUser,
}

/// Session payload issued by signin, signup and refresh
///
/// Every field is optional so a partial payload still parses; `token_pair` decides whether it
/// is usable.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionPayload {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl SessionPayload {
    /// Both tokens present and non-empty
    pub fn token_pair(&self) -> Option<TokenPair> {
        match (&self.access_token, &self.refresh_token) {
            (Some(access), Some(refresh)) if !access.is_empty() && !refresh.is_empty() => {
                Some(TokenPair {
                    access_token: access.clone(),
                    refresh_token: refresh.clone(),
                })
            }
            _ => None,
        }
    }

    /// Absolute expiry computed from `expires_in`
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_in
            .filter(|secs| *secs > 0)
            .map(|secs| Utc::now() + Duration::seconds(secs))
    }
}

/// POST /auth/signin request
#[derive(Debug, Serialize)]
pub struct SignInRequest<'a> {
    pub tenant: &'a str,
    pub identifier: &'a str,
    pub password: &'a str,
}

/// POST /auth/signin response
///
/// The user echoed back here is ignored; `me` is the source of the signed-in user.
#[derive(Debug, Clone, Deserialize)]
pub struct SignInResponse {
    #[serde(default)]
    pub session: Option<SessionPayload>,
}

/// Body for endpoints that take the refresh token explicitly
#[derive(Debug, Serialize)]
pub struct RefreshTokenRequest<'a> {
    pub refresh_token: &'a str,
}

/// POST /auth/refresh response, nested or flat
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    #[serde(default)]
    pub session: Option<SessionPayload>,
    #[serde(flatten)]
    pub flat: SessionPayload,
}

impl RefreshResponse {
    /// The payload carrying a usable pair, preferring the nested shape
    pub fn payload(&self) -> Option<&SessionPayload> {
        self.session
            .as_ref()
            .filter(|session| session.token_pair().is_some())
            .or_else(|| Some(&self.flat).filter(|flat| flat.token_pair().is_some()))
    }
}

/// POST /auth/signup request
#[derive(Debug, Clone, Serialize)]
pub struct SignupRequest {
    pub tenant: String,
    pub email: String,
    pub username: String,
    pub password: String,
    pub attrs: Map<String, Value>,
}

/// POST /auth/signup response
#[derive(Debug, Clone, Deserialize)]
pub struct SignupResponse {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub session: Option<SessionPayload>,
}

/// What a consumer supplies to register a new account
#[derive(Debug, Clone, Default)]
pub struct RegisterInput {
    pub email: String,
    pub username: String,
    pub password: String,
    /// Free-form profile attributes, forwarded untouched
    pub attrs: Map<String, Value>,
}

impl RegisterInput {
    pub fn new(
        email: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            username: username.into(),
            password: password.into(),
            attrs: Map::new(),
        }
    }

    /// Attach a display name; blank names are left out
    pub fn with_name(mut self, name: &str) -> Self {
        let name = name.trim();
        if !name.is_empty() {
            self.attrs
                .insert("name".to_string(), Value::String(name.to_string()));
        }
        self
    }
}

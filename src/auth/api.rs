// Identity API requests
// Stateless builders over the HTTP client; failures propagate untouched

use reqwest::Url;
use std::sync::Arc;

use super::types::{
    MeResponse, OAuthProvider, RefreshResponse, RefreshTokenRequest, SignInRequest,
    SignInResponse, SignupRequest, SignupResponse, DEFAULT_TENANT,
};
use crate::error::HttpException;
use crate::http_client::{ApiVersion, PortalHttpClient, RequestOptions};

/// Client id registered for the portal with the identity server
pub const DEFAULT_CLIENT_ID: &str = "kleff-dashboard";

/// Where the identity server sends the browser after an OAuth login
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:5173/dashboard";

/// OAuth client registration used to build redirect URLs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthSettings {
    pub client_id: String,
    pub redirect_uri: String,
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            client_id: DEFAULT_CLIENT_ID.to_string(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
        }
    }
}

/// Typed calls against the identity server's `/auth` routes
#[derive(Clone)]
pub struct IdentityClient {
    http: Arc<PortalHttpClient>,
    oauth: OAuthSettings,
}

impl IdentityClient {
    pub fn new(http: Arc<PortalHttpClient>, oauth: OAuthSettings) -> Self {
        Self { http, oauth }
    }

    /// Current user for the persisted access token
    pub async fn me(&self) -> Result<MeResponse, HttpException> {
        self.http.get("/auth/me", RequestOptions::default()).await
    }

    /// Exchange credentials for a session; `tenant` defaults to the platform tenant
    pub async fn signin(
        &self,
        identity: &str,
        password: &str,
        tenant: Option<&str>,
    ) -> Result<SignInResponse, HttpException> {
        let body = SignInRequest {
            tenant: tenant.unwrap_or(DEFAULT_TENANT),
            identifier: identity,
            password,
        };

        tracing::debug!(tenant = body.tenant, "Signing in");
        self.http
            .post("/auth/signin", Some(&body), RequestOptions::anonymous())
            .await
    }

    /// Rotate the token pair
    ///
    /// The refresh token travels in the JSON body. With no token the request is sent bare and
    /// the server's rejection comes back as the usual taxonomy.
    pub async fn refresh(
        &self,
        refresh_token: Option<&str>,
    ) -> Result<RefreshResponse, HttpException> {
        let body = refresh_token.map(|refresh_token| RefreshTokenRequest { refresh_token });
        self.http
            .post("/auth/refresh", body.as_ref(), RequestOptions::anonymous())
            .await
    }

    /// Register a new account
    pub async fn signup(&self, request: &SignupRequest) -> Result<SignupResponse, HttpException> {
        tracing::debug!(tenant = %request.tenant, username = %request.username, "Signing up");
        self.http
            .post("/auth/signup", Some(request), RequestOptions::anonymous())
            .await
    }

    /// Revoke the server-side session behind `refresh_token`
    pub async fn logout(&self, refresh_token: &str) -> Result<(), HttpException> {
        let body = RefreshTokenRequest { refresh_token };
        self.http
            .post_no_content("/auth/logout", Some(&body), RequestOptions::anonymous())
            .await
    }

    /// URL that starts an OAuth login with `provider`; no request is made
    pub fn begin_oauth(&self, tenant: &str, provider: OAuthProvider) -> String {
        let path = format!("/auth/oauth/{}/start", provider.as_str());
        let base = self.http.url_for(&path, ApiVersion::V1);

        match Url::parse(&base) {
            Ok(mut url) => {
                url.query_pairs_mut()
                    .append_pair("tenant", tenant)
                    .append_pair("client_id", &self.oauth.client_id)
                    .append_pair("redirect_uri", &self.oauth.redirect_uri);
                url.to_string()
            }
            // The base origin was validated at construction
            Err(_) => base,
        }
    }
}

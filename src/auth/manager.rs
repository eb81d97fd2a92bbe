use chrono::{Duration, Utc};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;

use super::api::IdentityClient;
use super::store::TokenStore;
use super::types::{
    MeResponse, OAuthProvider, RegisterInput, Session, SessionPayload, SignupRequest, TokenPair,
    DEFAULT_TENANT,
};
use crate::error::HttpException;
use crate::routes::Navigator;

const SIGN_IN_FAILED: &str = "Failed to sign in";
const SIGN_UP_FAILED: &str = "Failed to create account";
const REFRESH_FAILED: &str = "Failed to refresh session";

/// Session manager
/// Owns the client-side session and runs every authentication flow against it
///
/// State changes are published through a watch channel; consumers call `subscribe` and read
/// the latest `Session`. Operations are expected to run one at a time and are not guarded
/// against concurrent invocation.
pub struct SessionManager {
    /// Identity API requests
    api: IdentityClient,

    /// Persisted token pair, shared with the HTTP client
    store: Arc<TokenStore>,

    /// Target for OAuth redirects
    navigator: Arc<dyn Navigator>,

    /// Current session, published to subscribers
    state: watch::Sender<Session>,
}

/// Clears a flag on drop so every exit path resets it
struct FlagGuard<'a> {
    state: &'a watch::Sender<Session>,
    clear: fn(&mut Session),
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.state.send_modify(self.clear);
    }
}

impl SessionManager {
    /// Create a manager seeded with whatever tokens are already persisted
    pub fn new(api: IdentityClient, store: Arc<TokenStore>, navigator: Arc<dyn Navigator>) -> Self {
        let tokens = store.load();
        let expires_at = tokens.as_ref().and_then(|_| store.load_expiry());
        let session = Session {
            tokens,
            expires_at,
            ..Session::default()
        };
        let (state, _) = watch::channel(session);

        Self {
            api,
            store,
            navigator,
            state,
        }
    }

    /// Receive every future session change
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    /// Copy of the current session
    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    /// Startup check for a still-valid server session
    ///
    /// A failed `me` means "signed out" and is not an error.
    pub async fn hydrate(&self) {
        self.state.send_modify(|s| s.loading = true);
        let _loading = FlagGuard {
            state: &self.state,
            clear: |s: &mut Session| s.loading = false,
        };

        self.refresh_identity().await;
    }

    /// Sign in with identity (email or username) and password
    ///
    /// Failure is reported through `auth_error` and leaves the previous session untouched.
    pub async fn login_with_credentials(&self, identity: &str, password: &str) {
        let _auth = self.begin_auth();

        if let Err(e) = self.credential_login(identity, password).await {
            tracing::warn!(status = e.status(), error = %e, "Sign in failed");
            let message = e.message_or(SIGN_IN_FAILED);
            self.state.send_modify(|s| s.auth_error = Some(message));
        }
    }

    async fn credential_login(&self, identity: &str, password: &str) -> Result<(), HttpException> {
        let response = self.api.signin(identity, password, None).await?;

        match response.session.as_ref() {
            Some(payload) if self.store_session(payload) => {}
            _ => tracing::debug!("Sign in response carried no token pair"),
        }

        let me = self.api.me().await?;
        self.apply_identity(me);
        tracing::info!("Signed in");
        Ok(())
    }

    /// Send the user to the identity server's OAuth flow
    ///
    /// Nothing changes locally; the session appears on the next hydration after the redirect
    /// comes back.
    pub fn login_with_provider(&self, tenant: &str, provider: OAuthProvider) {
        let url = self.api.begin_oauth(tenant, provider);
        tracing::debug!(provider = provider.as_str(), tenant = tenant, "Starting OAuth login");
        self.navigator.navigate(&url);
    }

    /// Create an account, signing in right away when the server issues a session
    ///
    /// Unlike login, failure is also returned so callers can stay on the form.
    pub async fn register_with_credentials(
        &self,
        input: RegisterInput,
    ) -> Result<(), HttpException> {
        let _auth = self.begin_auth();

        let mut attrs = input.attrs;
        attrs.insert("marketing_opt_in".to_string(), Value::Bool(false));

        let request = SignupRequest {
            tenant: DEFAULT_TENANT.to_string(),
            email: input.email,
            username: input.username,
            password: input.password,
            attrs,
        };

        match self.api.signup(&request).await {
            Ok(response) => {
                tracing::info!(user_id = ?response.user_id, "Account created");
                if let Some(payload) = response.session.as_ref() {
                    if self.store_session(payload) {
                        self.refresh_identity().await;
                    }
                }
                Ok(())
            }
            Err(e) => {
                tracing::warn!(status = e.status(), error = %e, "Sign up failed");
                let message = e.message_or(SIGN_UP_FAILED);
                self.state.send_modify(|s| s.auth_error = Some(message));
                Err(e)
            }
        }
    }

    /// Rotate tokens using the last persisted refresh token
    ///
    /// Existing tokens are kept when the refresh fails.
    pub async fn refresh_tokens(&self) {
        let _auth = self.begin_auth();

        let refresh_token = self.current_tokens().map(|tokens| tokens.refresh_token);

        match self.api.refresh(refresh_token.as_deref()).await {
            Ok(response) => match response.payload() {
                Some(payload) => {
                    self.store_session(payload);
                    tracing::info!("Session refreshed");
                }
                None => tracing::warn!("Refresh response carried no token pair"),
            },
            Err(e) => {
                tracing::warn!(status = e.status(), error = %e, "Token refresh failed");
                let message = e.message_or(REFRESH_FAILED);
                self.state.send_modify(|s| s.auth_error = Some(message));
            }
        }
    }

    /// Forget the session locally; no request is made
    pub fn logout(&self) {
        self.store.clear();
        self.state.send_modify(|s| {
            s.tokens = None;
            s.expires_at = None;
            s.user = None;
            s.tenant = None;
        });
        tracing::info!("Signed out");
    }

    /// Ask the server to revoke the refresh token, then log out locally
    ///
    /// Revocation is best effort; the local logout happens regardless.
    pub async fn revoke_and_logout(&self) {
        if let Some(tokens) = self.current_tokens() {
            if let Err(e) = self.api.logout(&tokens.refresh_token).await {
                tracing::warn!(status = e.status(), error = %e, "Server-side logout failed");
            }
        }

        self.logout();
    }

    /// Tokens outlive this process
    pub fn persists_tokens(&self) -> bool {
        self.store.is_persistent()
    }

    /// Access token is known to expire within `window`
    pub fn token_expiring_within(&self, window: Duration) -> bool {
        match self.state.borrow().expires_at {
            Some(expires_at) => expires_at <= Utc::now() + window,
            None => false,
        }
    }

    /// Set `auth_loading` and clear the previous error until the guard drops
    fn begin_auth(&self) -> FlagGuard<'_> {
        self.state.send_modify(|s| {
            s.auth_loading = true;
            s.auth_error = None;
        });

        FlagGuard {
            state: &self.state,
            clear: |s: &mut Session| s.auth_loading = false,
        }
    }

    /// Last persisted pair, else whatever is held in memory
    fn current_tokens(&self) -> Option<TokenPair> {
        self.store.load().or_else(|| self.state.borrow().tokens.clone())
    }

    /// Persist and publish a usable token pair; false when the payload has none
    fn store_session(&self, payload: &SessionPayload) -> bool {
        let Some(tokens) = payload.token_pair() else {
            return false;
        };

        let expires_at = payload.expires_at();
        self.store.save(&tokens);
        self.store.save_expiry(expires_at);
        self.state.send_modify(|s| {
            s.tokens = Some(tokens);
            s.expires_at = expires_at;
        });
        true
    }

    /// Re-fetch `me`; failure leaves the session signed out without an error
    async fn refresh_identity(&self) {
        match self.api.me().await {
            Ok(me) => self.apply_identity(me),
            Err(e) => {
                tracing::debug!(status = e.status(), error = %e, "No active session");
                self.state.send_modify(|s| {
                    s.user = None;
                    s.tenant = None;
                });
            }
        }
    }

    /// `user` and `tenant` always come from the same response
    fn apply_identity(&self, me: MeResponse) {
        let (user, tenant) = me.user.into_parts();
        tracing::debug!(user_id = %user.id, tenant = ?tenant, "Session user loaded");
        self.state.send_modify(|s| {
            s.user = Some(user);
            s.tenant = tenant;
        });
    }
}

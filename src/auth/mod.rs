// Authentication module
// Token persistence, identity API calls and the session lifecycle built on them

mod api;
mod manager;
mod store;
mod types;

pub use api::{IdentityClient, OAuthSettings, DEFAULT_CLIENT_ID, DEFAULT_REDIRECT_URI};
pub use manager::SessionManager;
pub use store::{
    KeyValueStorage, MemoryStorage, SqliteStorage, StorageError, TokenStore, EXPIRY_KEY, TOKEN_KEY,
};
pub use types::{
    MeResponse, MeUser, OAuthProvider, RefreshResponse, RegisterInput, Session, SessionPayload,
    SignInResponse, SignupRequest, SignupResponse, TokenPair, User, DEFAULT_TENANT,
};

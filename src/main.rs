use anyhow::Result;
use std::sync::Arc;

use kleff_portal::auth::{IdentityClient, RegisterInput, Session, SessionManager, TokenStore};
use kleff_portal::config::{self, Command};
use kleff_portal::http_client::PortalHttpClient;
use kleff_portal::routes::{self, Route, RouteDecision, StdoutNavigator};

/// Refresh hint threshold for `status`
const EXPIRY_HINT_MINUTES: i64 = 5;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let config = config::Config::load()?;
    config.validate()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::debug!(backend = %config.backend_url, "Kleff Portal starting");

    let store = Arc::new(match &config.token_db {
        Some(path) => TokenStore::open_sqlite(path),
        None => TokenStore::in_memory(),
    });

    let http = Arc::new(PortalHttpClient::new(&config.backend_url, store.clone())?);
    let api = IdentityClient::new(http, config.oauth.clone());
    let manager = SessionManager::new(api, store, Arc::new(StdoutNavigator));

    run(&manager, config.command).await
}

async fn run(manager: &SessionManager, command: Command) -> Result<()> {
    match command {
        Command::Status => {
            manager.hydrate().await;
            let session = manager.snapshot();
            print_session(&session);

            match routes::guard(&session, Route::Dashboard) {
                RouteDecision::Render => println!("Dashboard: available"),
                RouteDecision::Redirect(route) => {
                    println!("Dashboard: sign in required (redirects to {})", route.path())
                }
                RouteDecision::Loading => println!("Dashboard: loading"),
            }

            if !manager.persists_tokens() {
                println!("Token store: not persistent (tokens are lost on exit)");
            }

            if manager.token_expiring_within(chrono::Duration::minutes(EXPIRY_HINT_MINUTES)) {
                println!("Access token expires soon; run `kleff-portal refresh`.");
            }
        }

        Command::Login { identity, password } => {
            let identity = match identity {
                Some(identity) => identity,
                None => config::prompt_identity()?,
            };
            let password = match password {
                Some(password) => password,
                None => config::prompt_password()?,
            };

            manager.login_with_credentials(&identity, &password).await;
            let session = ensure_no_auth_error(manager.snapshot())?;
            print_session(&session);
        }

        Command::Signup {
            email,
            username,
            name,
        } => {
            let password = config::prompt_new_password()?;
            let input = RegisterInput::new(email, username, password)
                .with_name(name.as_deref().unwrap_or_default());

            manager
                .register_with_credentials(input)
                .await
                .map_err(|e| anyhow::anyhow!("Sign up failed: {}", e))?;

            let session = manager.snapshot();
            if session.is_authenticated() {
                println!("Account created.");
                print_session(&session);
            } else {
                println!("Account created. Sign in with `kleff-portal login`.");
            }
        }

        Command::Oauth { provider, tenant } => {
            manager.login_with_provider(&tenant, provider);
        }

        Command::Refresh => {
            manager.refresh_tokens().await;
            let session = ensure_no_auth_error(manager.snapshot())?;
            match session.tokens {
                Some(tokens) => println!("Tokens refreshed ({}...)", preview(&tokens.access_token)),
                None => println!("Refresh returned no tokens."),
            }
        }

        Command::Logout { revoke } => {
            if revoke {
                manager.revoke_and_logout().await;
            } else {
                manager.logout();
            }
            println!("Signed out.");
        }
    }

    Ok(())
}

/// Turn a recorded `auth_error` into a failing exit
fn ensure_no_auth_error(session: Session) -> Result<Session> {
    if let Some(error) = &session.auth_error {
        anyhow::bail!("{}", error);
    }
    Ok(session)
}

fn print_session(session: &Session) {
    match &session.user {
        Some(user) => {
            let display = user.name.as_deref().unwrap_or(&user.username);
            println!("Signed in as {} <{}> (id {})", display, user.email, user.id);
            println!(
                "Tenant: {}",
                session.tenant.as_deref().unwrap_or("(none)")
            );
        }
        None => println!("Not signed in."),
    }

    if let Some(tokens) = &session.tokens {
        println!("Access token: {}...", preview(&tokens.access_token));
    }
    if let Some(expires_at) = session.expires_at {
        println!("Expires: {}", expires_at.to_rfc3339());
    }
}

/// First few characters of a token, safe for logs and terminals
fn preview(token: &str) -> String {
    token.chars().take(8).collect()
}

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::{Input, Password};
use std::path::PathBuf;

use crate::auth::{OAuthProvider, OAuthSettings, DEFAULT_CLIENT_ID, DEFAULT_REDIRECT_URI, DEFAULT_TENANT};
use crate::http_client::normalize_base_url;

/// Identity server origin used when none is configured
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8080";

/// Kleff Portal - session client for the Kleff identity platform
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Identity server origin (no path)
    #[arg(short = 'b', long, env = "KLEFF_BACKEND_URL", default_value = DEFAULT_BACKEND_URL)]
    pub backend_url: String,

    /// Path to the SQLite token database
    #[arg(short = 'd', long, env = "KLEFF_TOKEN_DB")]
    pub db_file: Option<String>,

    /// Keep tokens in memory only for this run
    #[arg(long)]
    pub ephemeral: bool,

    /// OAuth client id registered with the identity server
    #[arg(long, env = "KLEFF_CLIENT_ID", default_value = DEFAULT_CLIENT_ID)]
    pub client_id: String,

    /// Where the identity server redirects after OAuth
    #[arg(long, env = "KLEFF_REDIRECT_URI", default_value = DEFAULT_REDIRECT_URI)]
    pub redirect_uri: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Check the stored session against the server
    Status,

    /// Sign in with email or username and password
    Login {
        /// Email or username (prompted when omitted)
        #[arg(short, long)]
        identity: Option<String>,

        /// Password (prompted when omitted)
        #[arg(short, long, env = "KLEFF_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Create a new account
    Signup {
        #[arg(long)]
        email: String,

        #[arg(long)]
        username: String,

        /// Display name
        #[arg(long)]
        name: Option<String>,
    },

    /// Print the URL that starts an OAuth login
    Oauth {
        #[arg(long, value_enum)]
        provider: OAuthProvider,

        #[arg(long, default_value = DEFAULT_TENANT)]
        tenant: String,
    },

    /// Rotate the stored token pair
    Refresh,

    /// Forget the stored session
    Logout {
        /// Also revoke the refresh token on the server
        #[arg(long)]
        revoke: bool,
    },
}

#[derive(Clone, Debug)]
pub struct Config {
    // Identity server
    pub backend_url: String,
    pub oauth: OAuthSettings,

    // Token persistence; None keeps tokens in memory
    pub token_db: Option<PathBuf>,

    // Logging
    pub log_level: String,

    pub command: Command,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        Self::from_args(CliArgs::parse())
    }

    pub fn from_args(args: CliArgs) -> Result<Self> {
        let token_db = if args.ephemeral {
            None
        } else {
            let path = args
                .db_file
                .map(|s| expand_tilde(&s))
                .or_else(default_token_db_path)
                .context(
                    "Could not determine where to store tokens (use -d or set KLEFF_TOKEN_DB)",
                )?;
            Some(path)
        };

        Ok(Config {
            backend_url: args.backend_url,
            oauth: OAuthSettings {
                client_id: args.client_id,
                redirect_uri: args.redirect_uri,
            },
            token_db,
            log_level: args.log_level,
            command: args.command,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        normalize_base_url(&self.backend_url)?;

        if self.oauth.client_id.trim().is_empty() {
            anyhow::bail!("KLEFF_CLIENT_ID cannot be empty");
        }

        reqwest::Url::parse(&self.oauth.redirect_uri).with_context(|| {
            format!(
                "KLEFF_REDIRECT_URI is not a valid absolute URL: \"{}\"",
                self.oauth.redirect_uri
            )
        })?;

        Ok(())
    }
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Platform data directory, e.g. ~/.local/share/kleff-portal/tokens.sqlite3 on Linux
fn default_token_db_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("kleff-portal").join("tokens.sqlite3"))
}

// === Interactive prompts ===

/// Ask for an email or username
pub fn prompt_identity() -> Result<String> {
    let identity: String = Input::new()
        .with_prompt("Email or username")
        .interact_text()
        .context("Failed to read identity")?;

    let identity = identity.trim().to_string();
    if identity.is_empty() {
        anyhow::bail!("Identity cannot be empty");
    }
    Ok(identity)
}

/// Ask for an existing password
pub fn prompt_password() -> Result<String> {
    Password::new()
        .with_prompt("Password")
        .interact()
        .context("Failed to read password")
}

/// Ask for a new password twice
pub fn prompt_new_password() -> Result<String> {
    let password = Password::new()
        .with_prompt("Password")
        .with_confirmation("Confirm password", "Passwords do not match.")
        .interact()
        .context("Failed to read password")?;

    if password.is_empty() {
        anyhow::bail!("Password cannot be empty");
    }
    Ok(password)
}

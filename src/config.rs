use anyhow::{Context, Result};
use clap::Parser;
use dialoguer::{Confirm, Input, Password};
use serde::Serialize;
use std::fmt;
use std::io::{IsTerminal, Write};
use std::path::PathBuf;

use crate::auth::{TokenManagerOptions, MAX_BUFFER_MINUTES};

pub const DEFAULT_BASE_URL: &str = "https://api.zoom.us/v2";
pub const DEFAULT_TOKEN_URL: &str = "https://zoom.us/oauth/token";
const DEFAULT_TOKEN_FILE: &str = "~/.config/webinar-gateway/token.json";

/// Webinar Gateway - Zoom tool server with cached OAuth tokens
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Server host address
    #[arg(short = 'H', long, env = "SERVER_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Server port
    #[arg(short, long, env = "SERVER_PORT", default_value = "8000")]
    pub port: u16,

    /// API key clients must present to call tools
    #[arg(short = 'k', long, env = "GATEWAY_API_KEY")]
    pub api_key: Option<String>,

    /// Zoom account ID
    #[arg(long, env = "ZOOM_ACCOUNT_ID")]
    pub account_id: Option<String>,

    /// Zoom app client ID
    #[arg(long, env = "ZOOM_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Zoom app client secret
    #[arg(long, env = "ZOOM_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Zoom REST API base URL
    #[arg(long, env = "ZOOM_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Zoom OAuth token endpoint
    #[arg(long, env = "ZOOM_TOKEN_URL", default_value = DEFAULT_TOKEN_URL)]
    pub token_url: String,

    /// Where the cached token is persisted (.json file, or .sqlite/.db database)
    #[arg(short = 't', long, env = "ZOOM_TOKEN_FILE", default_value = DEFAULT_TOKEN_FILE)]
    pub token_file: String,

    /// Minutes before expiry at which a token is refreshed
    #[arg(long, env = "TOKEN_REFRESH_BUFFER_MINUTES", default_value = "5")]
    pub refresh_buffer_minutes: i64,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30")]
    pub http_timeout: u64,

    /// HTTP connect timeout in seconds
    #[arg(long, env = "HTTP_CONNECT_TIMEOUT", default_value = "10")]
    pub http_connect_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// Credentials and endpoints for one Zoom Server-to-Server OAuth app
#[derive(Clone, PartialEq)]
pub struct ZoomConfig {
    pub account_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub base_url: String,
    pub token_url: String,
}

impl ZoomConfig {
    /// Build from explicit credentials with default endpoints
    pub fn new(account_id: String, client_id: String, client_secret: String) -> Self {
        Self {
            account_id,
            client_id,
            client_secret,
            base_url: DEFAULT_BASE_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
        }
    }

    /// Read credentials from ZOOM_* environment variables.
    /// Returns None unless all three are set and non-empty.
    pub fn from_env() -> Option<Self> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        let mut config = Self::new(
            var("ZOOM_ACCOUNT_ID")?,
            var("ZOOM_CLIENT_ID")?,
            var("ZOOM_CLIENT_SECRET")?,
        );
        if let Some(base_url) = var("ZOOM_BASE_URL") {
            config.base_url = base_url;
        }
        if let Some(token_url) = var("ZOOM_TOKEN_URL") {
            config.token_url = token_url;
        }
        Some(config)
    }

    /// Identifier view safe to show to operators
    pub fn masked(&self) -> MaskedZoomConfig {
        MaskedZoomConfig {
            account_id: mask(&self.account_id),
            client_id: mask(&self.client_id),
            client_secret: "***loaded***".to_string(),
            base_url: self.base_url.clone(),
        }
    }
}

impl fmt::Debug for ZoomConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZoomConfig")
            .field("account_id", &self.account_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("base_url", &self.base_url)
            .field("token_url", &self.token_url)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MaskedZoomConfig {
    pub account_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub base_url: String,
}

/// First 8 characters followed by an ellipsis
pub fn mask(value: &str) -> String {
    let prefix: String = value.chars().take(8).collect();
    format!("{}...", prefix)
}

#[derive(Clone, Debug)]
pub struct Config {
    // Server settings
    pub server_host: String,
    pub server_port: u16,

    // Gateway authentication
    pub gateway_api_key: Option<String>,

    // Zoom credentials (absent until configured)
    pub zoom: Option<ZoomConfig>,

    // Endpoints applied to manually configured credentials
    pub base_url: String,
    pub token_url: String,

    // Token cache
    pub token_file: PathBuf,
    pub refresh_buffer_minutes: i64,

    // HTTP client
    pub http_request_timeout: u64,
    pub http_connect_timeout: u64,

    pub log_level: String,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();
        Ok(Self::from_args(args))
    }

    pub fn from_args(args: CliArgs) -> Self {
        let zoom = match (args.account_id, args.client_id, args.client_secret) {
            (Some(account_id), Some(client_id), Some(client_secret))
                if !account_id.is_empty() && !client_id.is_empty() && !client_secret.is_empty() =>
            {
                Some(ZoomConfig {
                    account_id,
                    client_id,
                    client_secret,
                    base_url: args.base_url.clone(),
                    token_url: args.token_url.clone(),
                })
            }
            _ => None,
        };

        Config {
            server_host: args.host,
            server_port: args.port,
            gateway_api_key: args.api_key.filter(|k| !k.is_empty()),
            zoom,
            base_url: args.base_url,
            token_url: args.token_url,
            token_file: expand_tilde(&args.token_file),
            refresh_buffer_minutes: args.refresh_buffer_minutes,
            http_request_timeout: args.http_timeout,
            http_connect_timeout: args.http_connect_timeout,
            log_level: args.log_level,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !(0..=MAX_BUFFER_MINUTES).contains(&self.refresh_buffer_minutes) {
            anyhow::bail!(
                "TOKEN_REFRESH_BUFFER_MINUTES must be between 0 and {} (got {})",
                MAX_BUFFER_MINUTES,
                self.refresh_buffer_minutes
            );
        }
        if self.http_request_timeout == 0 {
            anyhow::bail!("HTTP_REQUEST_TIMEOUT must be at least 1 second");
        }
        for (name, url) in [("ZOOM_BASE_URL", &self.base_url), ("ZOOM_TOKEN_URL", &self.token_url)] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("{} must be an http(s) URL: {}", name, url);
            }
        }
        Ok(())
    }

    /// Apply the configured endpoints to manually supplied credentials
    pub fn zoom_config(&self, account_id: String, client_id: String, client_secret: String) -> ZoomConfig {
        ZoomConfig {
            account_id,
            client_id,
            client_secret,
            base_url: self.base_url.clone(),
            token_url: self.token_url.clone(),
        }
    }

    pub fn token_manager_options(&self) -> TokenManagerOptions {
        TokenManagerOptions {
            buffer_minutes: self.refresh_buffer_minutes,
            request_timeout: self.http_request_timeout,
            connect_timeout: self.http_connect_timeout,
        }
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

// === Interactive Setup ===

/// Check if interactive setup is needed (no .env file, missing credentials, attached terminal)
pub fn needs_interactive_setup() -> bool {
    let env_file_exists = std::path::Path::new(".env").exists();
    let has_credentials = ["ZOOM_ACCOUNT_ID", "ZOOM_CLIENT_ID", "ZOOM_CLIENT_SECRET"]
        .iter()
        .all(|name| std::env::var(name).is_ok());

    !env_file_exists && !has_credentials && std::io::stdin().is_terminal()
}

/// Credentials collected from interactive setup
#[derive(Debug, Clone)]
pub struct InteractiveConfig {
    pub account_id: String,
    pub client_id: String,
    pub client_secret: String,
}

/// Prompt for Zoom credentials. Returns None if the user skips setup.
pub fn run_interactive_setup() -> Result<Option<InteractiveConfig>> {
    println!();
    println!("Webinar Gateway - First Time Setup");
    println!();
    println!("No Zoom credentials found. They can also be supplied later");
    println!("through the configure_zoom tool.");
    println!();

    let proceed = Confirm::new()
        .with_prompt("Enter Zoom Server-to-Server OAuth credentials now?")
        .default(true)
        .interact()
        .context("Failed to read confirmation")?;
    if !proceed {
        return Ok(None);
    }

    let account_id: String = Input::new()
        .with_prompt("Zoom account ID (ZOOM_ACCOUNT_ID)")
        .interact_text()
        .context("Failed to read ZOOM_ACCOUNT_ID")?;

    let client_id: String = Input::new()
        .with_prompt("Zoom client ID (ZOOM_CLIENT_ID)")
        .interact_text()
        .context("Failed to read ZOOM_CLIENT_ID")?;

    let client_secret: String = Password::new()
        .with_prompt("Zoom client secret (ZOOM_CLIENT_SECRET)")
        .interact()
        .context("Failed to read ZOOM_CLIENT_SECRET")?;

    if account_id.is_empty() || client_id.is_empty() || client_secret.is_empty() {
        anyhow::bail!("Zoom credentials cannot be empty");
    }

    let config = InteractiveConfig {
        account_id,
        client_id,
        client_secret,
    };

    let save_to_env = Confirm::new()
        .with_prompt("Save credentials to .env file?")
        .default(true)
        .interact()
        .context("Failed to read save confirmation")?;

    if save_to_env {
        save_env_file(&config)?;
        println!("Configuration saved to .env file");
    }

    println!();
    Ok(Some(config))
}

fn render_env_file(config: &InteractiveConfig) -> String {
    format!(
        r#"# Webinar Gateway Configuration
# Generated by interactive setup

# Zoom Server-to-Server OAuth app (required)
ZOOM_ACCOUNT_ID={}
ZOOM_CLIENT_ID={}
ZOOM_CLIENT_SECRET={}

# Token cache location
ZOOM_TOKEN_FILE={}

# Server settings
SERVER_HOST=127.0.0.1
SERVER_PORT=8000

# Logging (trace, debug, info, warn, error)
LOG_LEVEL=info
"#,
        config.account_id, config.client_id, config.client_secret, DEFAULT_TOKEN_FILE,
    )
}

/// Save configuration to .env file
fn save_env_file(config: &InteractiveConfig) -> Result<()> {
    let mut file = std::fs::File::create(".env").context("Failed to create .env file")?;
    file.write_all(render_env_file(config).as_bytes())
        .context("Failed to write .env file")?;
    Ok(())
}

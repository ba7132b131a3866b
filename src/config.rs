use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use crate::auth::OAuthSettings;

/// Upper bound for TOKEN_REFRESH_THRESHOLD (one day)
const MAX_REFRESH_THRESHOLD: u64 = 86_400;

/// Webflow CMS proxy with OAuth credential management
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Server host address
    #[arg(short = 'H', long, env = "SERVER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Server port
    #[arg(short, long, env = "SERVER_PORT", default_value = "8000")]
    pub port: u16,

    /// Optional API key required on /cms routes
    #[arg(short = 'k', long, env = "PROXY_API_KEY")]
    pub api_key: Option<String>,

    /// OAuth client id
    #[arg(long, env = "WEBFLOW_CLIENT_ID")]
    pub client_id: Option<String>,

    /// OAuth client secret
    #[arg(long, env = "WEBFLOW_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Redirect URI registered with the OAuth app
    #[arg(long, env = "WEBFLOW_REDIRECT_URI")]
    pub redirect_uri: Option<String>,

    /// Space-separated OAuth scopes
    #[arg(long, env = "WEBFLOW_SCOPE", default_value = "cms:read cms:write")]
    pub scope: String,

    /// Path to the SQLite credential database
    #[arg(
        short = 'd',
        long,
        env = "CREDENTIALS_DB_FILE",
        default_value = "~/.local/share/webflow-proxy/credentials.sqlite3"
    )]
    pub db_file: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30")]
    pub http_timeout: u64,
}

#[derive(Clone, Debug)]
pub struct Config {
    // Server settings
    pub server_host: String,
    pub server_port: u16,

    // Proxy authentication
    pub proxy_api_key: Option<String>,

    // OAuth
    pub oauth: OAuthSettings,

    // Upstream
    pub cms_api_base_url: String,

    // Credential storage
    pub credentials_db_file: PathBuf,
    pub credentials_storage_key: String,

    // Token lifecycle
    pub token_refresh_threshold: u64,
    pub token_refresh_interval: u64,

    // HTTP client
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,

    pub log_level: String,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();
        Self::from_args(args)
    }

    fn from_args(args: CliArgs) -> Result<Self> {
        let config = Config {
            server_host: args.host,
            server_port: args.port,

            proxy_api_key: args.api_key.filter(|k| !k.is_empty()),

            oauth: OAuthSettings {
                client_id: args
                    .client_id
                    .context("WEBFLOW_CLIENT_ID is required (use --client-id or set WEBFLOW_CLIENT_ID)")?,
                client_secret: args
                    .client_secret
                    .context("WEBFLOW_CLIENT_SECRET is required (use --client-secret or set WEBFLOW_CLIENT_SECRET)")?,
                redirect_uri: args
                    .redirect_uri
                    .context("WEBFLOW_REDIRECT_URI is required (use --redirect-uri or set WEBFLOW_REDIRECT_URI)")?,
                scope: args.scope,
                authorize_url: env_or("WEBFLOW_AUTHORIZE_URL", "https://webflow.com/oauth/authorize"),
                token_url: env_or(
                    "WEBFLOW_TOKEN_URL",
                    "https://api.webflow.com/oauth/access_token",
                ),
            },

            cms_api_base_url: env_or("WEBFLOW_API_BASE_URL", "https://api.webflow.com/v2"),

            credentials_db_file: expand_tilde(&args.db_file),
            credentials_storage_key: env_or("CREDENTIALS_STORAGE_KEY", "webflow:oauth:token"),

            token_refresh_threshold: env_parse("TOKEN_REFRESH_THRESHOLD", 300),
            token_refresh_interval: env_parse("TOKEN_REFRESH_INTERVAL", 60),

            http_connect_timeout: env_parse("HTTP_CONNECT_TIMEOUT", 10),
            http_request_timeout: args.http_timeout,

            log_level: args.log_level,
        };

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("WEBFLOW_CLIENT_ID", &self.oauth.client_id),
            ("WEBFLOW_CLIENT_SECRET", &self.oauth.client_secret),
            ("WEBFLOW_REDIRECT_URI", &self.oauth.redirect_uri),
        ] {
            if value.trim().is_empty() {
                anyhow::bail!("{} cannot be empty", name);
            }
        }

        for (name, value) in [
            ("WEBFLOW_AUTHORIZE_URL", &self.oauth.authorize_url),
            ("WEBFLOW_TOKEN_URL", &self.oauth.token_url),
            ("WEBFLOW_API_BASE_URL", &self.cms_api_base_url),
            ("WEBFLOW_REDIRECT_URI", &self.oauth.redirect_uri),
        ] {
            reqwest::Url::parse(value).with_context(|| format!("{} is not a valid URL: {}", name, value))?;
        }

        if self.token_refresh_interval == 0 {
            anyhow::bail!("TOKEN_REFRESH_INTERVAL must be greater than zero");
        }

        if self.token_refresh_threshold > MAX_REFRESH_THRESHOLD {
            anyhow::bail!(
                "TOKEN_REFRESH_THRESHOLD must be at most {} seconds, got {}",
                MAX_REFRESH_THRESHOLD,
                self.token_refresh_threshold
            );
        }

        Ok(())
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
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

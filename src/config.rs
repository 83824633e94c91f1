use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::Url;
use std::path::PathBuf;
use std::time::Duration;

use crate::http_client::ClientOptions;
use crate::models::LoginKeyStyle;

/// Envelope Client - authenticated API client with transparent session refresh
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// API server address, e.g. http://192.168.0.8
    #[arg(short = 's', long, env = "API_SERVER_ADDRESS")]
    pub server: Option<String>,

    /// API server port (overrides the port in the address)
    #[arg(short, long, env = "API_SERVER_PORT")]
    pub port: Option<u16>,

    /// Login username
    #[arg(short, long, env = "API_USERNAME", default_value = "")]
    pub username: String,

    /// Login password
    #[arg(long, env = "API_PASSWORD", default_value = "", hide_env_values = true)]
    pub password: String,

    /// Path of the login endpoint
    #[arg(long, env = "API_LOGIN_PATH", default_value = "/user/login")]
    pub login_path: String,

    /// Path of the upload endpoint
    #[arg(long, env = "API_UPLOAD_PATH", default_value = "/uploadMinio")]
    pub upload_path: String,

    /// Storage bucket passed to the upload endpoint
    #[arg(long, env = "API_BUCKET_NAME", default_value = "")]
    pub bucket: String,

    /// Login body key style (camel, lower)
    #[arg(long, env = "API_LOGIN_STYLE", default_value = "camel")]
    pub login_style: String,

    /// Initial session token
    #[arg(long, env = "API_TOKEN", default_value = "", hide_env_values = true)]
    pub token: String,

    /// Tenant identifier sent with every request
    #[arg(long, env = "API_TENANT", default_value = "")]
    pub tenant: String,

    /// Business code meaning "session expired" in a 200 response
    #[arg(long, env = "SESSION_EXPIRED_CODE", default_value = "401")]
    pub session_expired_code: i64,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30")]
    pub request_timeout: u64,

    /// HTTP connect timeout in seconds
    #[arg(long, env = "HTTP_CONNECT_TIMEOUT", default_value = "30")]
    pub connect_timeout: u64,

    /// Download timeout in seconds
    #[arg(long, env = "DOWNLOAD_TIMEOUT", default_value = "1200")]
    pub download_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Send a GET request and print the envelope
    Get {
        /// Path relative to the server, or an absolute URL
        target: String,

        /// Query parameter as key=value (repeatable)
        #[arg(short, long = "query", value_parser = parse_key_value)]
        query: Vec<(String, String)>,
    },

    /// Send a POST request with a JSON body and print the envelope
    Post {
        target: String,

        /// JSON request body
        #[arg(short, long, default_value = "{}")]
        body: String,

        #[arg(short, long = "query", value_parser = parse_key_value)]
        query: Vec<(String, String)>,
    },

    /// Log in and print the new token
    Login,

    /// Download a file with progress
    Download {
        url: String,
        destination: String,
    },

    /// Upload a file to the configured bucket
    Upload {
        file: String,

        /// Content type of the uploaded part
        #[arg(long, default_value = crate::transfer::DEFAULT_UPLOAD_CONTENT_TYPE)]
        content_type: String,
    },
}

#[derive(Clone, Debug)]
pub struct Config {
    // Server
    pub server_address: String,
    pub server_port: Option<u16>,

    // Login
    pub username: String,
    pub password: String,
    pub login_path: String,
    pub login_key_style: LoginKeyStyle,

    // Upload
    pub upload_file_path: String,
    pub bucket_name: String,

    // Initial session
    pub token: String,
    pub tenant: String,

    // Transport
    pub session_expired_code: i64,
    pub http_request_timeout: u64,
    pub http_connect_timeout: u64,
    pub download_timeout: u64,

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
        let login_key_style = args
            .login_style
            .parse::<LoginKeyStyle>()
            .map_err(anyhow::Error::msg)
            .context("Invalid API_LOGIN_STYLE")?;

        let command = match args.command {
            Command::Download { url, destination } => Command::Download {
                url,
                destination: expand_tilde(&destination).to_string_lossy().into_owned(),
            },
            Command::Upload { file, content_type } => Command::Upload {
                file: expand_tilde(&file).to_string_lossy().into_owned(),
                content_type,
            },
            other => other,
        };

        Ok(Config {
            server_address: args
                .server
                .context("API_SERVER_ADDRESS is required (use -s or set API_SERVER_ADDRESS env var)")?,
            server_port: args.port,

            username: args.username,
            password: args.password,
            login_path: args.login_path,
            login_key_style,

            upload_file_path: args.upload_path,
            bucket_name: args.bucket,

            token: args.token,
            tenant: args.tenant,

            session_expired_code: args.session_expired_code,
            http_request_timeout: args.request_timeout,
            http_connect_timeout: args.connect_timeout,
            download_timeout: args.download_timeout,

            log_level: args.log_level,
            command,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let address = self.server_address.trim();
        if address.is_empty() {
            anyhow::bail!("API_SERVER_ADDRESS must not be empty");
        }

        let with_scheme = if address.contains("://") {
            address.to_string()
        } else {
            format!("http://{}", address)
        };
        let url = Url::parse(&with_scheme)
            .with_context(|| format!("API_SERVER_ADDRESS is not a valid URL: {}", address))?;
        if url.host_str().is_none() {
            anyhow::bail!("API_SERVER_ADDRESS has no host: {}", address);
        }

        Ok(())
    }

    /// Transport options for [`crate::ApiClient`]
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            connect_timeout: Duration::from_secs(self.http_connect_timeout),
            request_timeout: Duration::from_secs(self.http_request_timeout),
            download_timeout: Duration::from_secs(self.download_timeout),
            session_expired_code: self.session_expired_code,
            ..ClientOptions::default()
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

/// Parse a `key=value` query argument
fn parse_key_value(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", s))
}

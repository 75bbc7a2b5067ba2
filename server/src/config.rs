//! Server configuration module.
//!
//! Parses configuration from environment variables for the Spotlight server.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `JWT_SECRET` | Yes | - | HS256 signing secret for bearer tokens |
//! | `PORT` | No | 8080 | HTTP server port |
//! | `DATABASE_URL` | No | `sqlite://spotlight.db?mode=rwc` | SQLite connection string |
//! | `GOOGLE_CLIENT_ID` | No | - | Audience for Google ID tokens |
//! | `FIREBASE_PROJECT_ID` | No | - | Project id for Firebase ID tokens |
//! | `UPLOAD_DIR` | No | `uploads` | Directory for uploaded media |
//! | `CORS_ALLOWED_ORIGINS` | No | known front-ends | Comma-separated origin list |
//! | `RATE_LIMIT_PER_MINUTE` | No | 100 | Requests per client and path per minute |
//! | `LOCAL_DEV` | No | false | Disable rate limiting and security headers |
//!
//! The server refuses to start without `JWT_SECRET`; there is no mode in which
//! token signing is disabled.

use std::env;
use std::fmt;
use std::path::PathBuf;

use axum::http::HeaderValue;
use thiserror::Error;
use tracing::warn;

/// Default HTTP server port.
const DEFAULT_PORT: u16 = 8080;

/// Default SQLite database, created on first start.
const DEFAULT_DATABASE_URL: &str = "sqlite://spotlight.db?mode=rwc";

/// Default directory for uploaded files.
const DEFAULT_UPLOAD_DIR: &str = "uploads";

/// Default per-client, per-path request budget for one minute.
const DEFAULT_RATE_LIMIT_PER_MINUTE: u32 = 100;

/// Front-ends allowed to call the API when `CORS_ALLOWED_ORIGINS` is unset.
const DEFAULT_CORS_ORIGINS: &[&str] = &[
    "http://localhost:3000",
    "http://localhost:5173",
    "http://localhost:8080",
    "https://spot.smartrating.in",
    "https://spotlight-backend-go.onrender.com",
];

/// Errors that can occur when parsing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable has invalid format.
    #[error("invalid format for {var}: {message}")]
    InvalidFormat { var: String, message: String },

    /// Port number is invalid.
    #[error("invalid port number: {0}")]
    InvalidPort(#[from] std::num::ParseIntError),

    /// Configuration validation failed.
    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

/// Server configuration parsed from environment variables.
#[derive(Clone)]
pub struct Config {
    /// Shared secret used to sign and verify bearer tokens.
    pub jwt_secret: String,

    /// HTTP server port.
    pub port: u16,

    /// SQLite connection string.
    pub database_url: String,

    /// OAuth client id that Google ID tokens must be issued for.
    pub google_client_id: Option<String>,

    /// Firebase project id that Firebase ID tokens must be issued for.
    pub firebase_project_id: Option<String>,

    /// Directory uploaded media is written to and served from.
    pub upload_dir: PathBuf,

    /// Origins allowed by the CORS layer.
    pub cors_allowed_origins: Vec<String>,

    /// Requests allowed per client and path in a one minute window.
    pub rate_limit_per_minute: u32,

    /// When true, rate limiting and security headers are skipped.
    pub local_dev: bool,
}

impl Config {
    /// Parse configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - `JWT_SECRET` is missing or empty
    /// - Environment variables have invalid format
    /// - Port number is not a valid u16
    ///
    /// # Example
    ///
    /// ```no_run
    /// use spotlight_server::config::Config;
    ///
    /// let config = Config::from_env().expect("Failed to load config");
    /// println!("Server will listen on port {}", config.port);
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret = env::var("JWT_SECRET").unwrap_or_default();
        let port = parse_port()?;
        let database_url = parse_string_env("DATABASE_URL", DEFAULT_DATABASE_URL);
        let google_client_id = parse_optional_env("GOOGLE_CLIENT_ID");
        let firebase_project_id = parse_optional_env("FIREBASE_PROJECT_ID");
        let upload_dir = PathBuf::from(parse_string_env("UPLOAD_DIR", DEFAULT_UPLOAD_DIR));
        let cors_allowed_origins = parse_origins()?;
        let rate_limit_per_minute = parse_rate_limit()?;
        let local_dev = parse_bool_env("LOCAL_DEV");

        let config = Self {
            jwt_secret,
            port,
            database_url,
            google_client_id,
            firebase_project_id,
            upload_dir,
            cors_allowed_origins,
            rate_limit_per_minute,
            local_dev,
        };

        config.validate()?;

        if config.local_dev {
            warn!(
                "LOCAL_DEV is enabled - rate limiting and security headers are disabled. \
                 Do not use in production!"
            );
        }

        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// The signing secret is mandatory and the rate limit must allow at least
    /// one request per window.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.trim().is_empty() {
            return Err(ConfigError::MissingEnvVar("JWT_SECRET".to_string()));
        }

        if self.rate_limit_per_minute == 0 {
            return Err(ConfigError::ValidationError(
                "RATE_LIMIT_PER_MINUTE must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Returns true when at least one federated identity provider is configured.
    pub fn has_identity_provider(&self) -> bool {
        self.google_client_id.is_some() || self.firebase_project_id.is_some()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("jwt_secret", &"<redacted>")
            .field("port", &self.port)
            .field("database_url", &self.database_url)
            .field("google_client_id", &self.google_client_id)
            .field("firebase_project_id", &self.firebase_project_id)
            .field("upload_dir", &self.upload_dir)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("local_dev", &self.local_dev)
            .finish()
    }
}

/// Parse a boolean environment variable.
///
/// Returns `true` if the variable is set to "true" (case-insensitive),
/// `false` otherwise.
fn parse_bool_env(name: &str) -> bool {
    env::var(name)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Reads a string variable, treating blank values as unset.
fn parse_optional_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_string_env(name: &str, default: &str) -> String {
    parse_optional_env(name).unwrap_or_else(|| default.to_string())
}

/// Parse the PORT environment variable.
///
/// Returns the default port if not set.
fn parse_port() -> Result<u16, ConfigError> {
    match env::var("PORT") {
        Ok(port_str) => Ok(port_str.trim().parse()?),
        Err(env::VarError::NotPresent) => Ok(DEFAULT_PORT),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidFormat {
            var: "PORT".to_string(),
            message: "contains invalid unicode".to_string(),
        }),
    }
}

/// Parse the RATE_LIMIT_PER_MINUTE environment variable.
fn parse_rate_limit() -> Result<u32, ConfigError> {
    match parse_optional_env("RATE_LIMIT_PER_MINUTE") {
        Some(value) => value.parse().map_err(|_| ConfigError::InvalidFormat {
            var: "RATE_LIMIT_PER_MINUTE".to_string(),
            message: format!("expected a positive integer, got '{value}'"),
        }),
        None => Ok(DEFAULT_RATE_LIMIT_PER_MINUTE),
    }
}

/// Parse the CORS_ALLOWED_ORIGINS environment variable.
///
/// Expected format: `https://a.example,https://b.example`. Every origin must
/// be usable as an HTTP header value.
fn parse_origins() -> Result<Vec<String>, ConfigError> {
    let origins_str = match parse_optional_env("CORS_ALLOWED_ORIGINS") {
        Some(s) => s,
        None => return Ok(DEFAULT_CORS_ORIGINS.iter().map(|o| o.to_string()).collect()),
    };

    let mut origins = Vec::new();

    for origin in origins_str.split(',') {
        let origin = origin.trim().trim_end_matches('/');
        if origin.is_empty() {
            continue;
        }

        if HeaderValue::from_str(origin).is_err() {
            return Err(ConfigError::InvalidFormat {
                var: "CORS_ALLOWED_ORIGINS".to_string(),
                message: format!("'{origin}' is not a valid origin"),
            });
        }

        origins.push(origin.to_string());
    }

    if origins.is_empty() {
        return Err(ConfigError::InvalidFormat {
            var: "CORS_ALLOWED_ORIGINS".to_string(),
            message: "at least one origin is required".to_string(),
        });
    }

    Ok(origins)
}

//! Error types for the Spotlight server.
//!
//! Every failure a handler can produce ends up as a [`ServerError`], which
//! owns the mapping from failure class to HTTP status and machine-readable
//! error code. Module-level errors ([`ConfigError`], [`StoreError`],
//! [`TokenError`]) convert into it with `?`.
//!
//! # Status mapping
//!
//! | Variant | Status | Code |
//! |---------|--------|------|
//! | `Validation` | 400 | `invalid_request` |
//! | `InvalidBody` | 400 | `invalid_body` |
//! | `Conflict` | 400 | `conflict` |
//! | `Auth` | 401 | caller supplied |
//! | `Forbidden` | 403 | `forbidden` |
//! | `NotFound` | 404 | `not_found` |
//! | `RateLimit` | 429 | `rate_limited` |
//! | `Internal`, `Config` | 500 | `internal_error` |
//!
//! Internal details are logged and never returned to the client.

use std::error::Error;
use std::fmt;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::error;

pub use crate::config::ConfigError;
use crate::auth::TokenError;
use crate::db::StoreError;
use crate::password::PasswordError;

/// Error code for a bearer token that failed any verification step.
pub const CODE_INVALID_TOKEN: &str = "invalid_token";

/// Error code for a request without an `Authorization` header.
pub const CODE_MISSING_AUTHORIZATION: &str = "missing_authorization";

/// Error code for an `Authorization` header that is not `Bearer <token>`.
pub const CODE_MALFORMED_AUTHORIZATION: &str = "malformed_authorization";

/// Error code for a failed password login.
pub const CODE_INVALID_CREDENTIALS: &str = "invalid_credentials";

/// JSON error response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Top-level error type for the Spotlight server.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error during server initialization.
    Config(ConfigError),

    /// Request failed field-level validation.
    Validation(String),

    /// Request body could not be parsed.
    InvalidBody(String),

    /// A unique field (email, username, mobile number) is already taken.
    Conflict(String),

    /// Authentication failure.
    ///
    /// `code` is the machine-readable reason shown to the client. It is
    /// deliberately coarse; the precise cause is logged where it happens.
    Auth {
        code: &'static str,
        message: String,
    },

    /// The caller is authenticated but not allowed to perform the operation.
    Forbidden(String),

    /// The requested resource does not exist.
    NotFound(String),

    /// Rate limit exceeded.
    RateLimit {
        /// Identifier for the rate-limited client (IP and path).
        source: String,
        /// Number of seconds until the window resets.
        retry_after: u64,
    },

    /// Unexpected internal server error.
    Internal(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(err) => write!(f, "configuration error: {err}"),
            Self::Validation(msg) => write!(f, "validation error: {msg}"),
            Self::InvalidBody(msg) => write!(f, "invalid request body: {msg}"),
            Self::Conflict(msg) => write!(f, "conflict: {msg}"),
            Self::Auth { message, .. } => write!(f, "authentication failed: {message}"),
            Self::Forbidden(msg) => write!(f, "forbidden: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::RateLimit {
                source,
                retry_after,
            } => {
                write!(
                    f,
                    "rate limit exceeded for {source}, retry after {retry_after} seconds"
                )
            }
            Self::Internal(msg) => write!(f, "internal server error: {msg}"),
        }
    }
}

impl Error for ServerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ConfigError> for ServerError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound("resource not found".to_string()),
            StoreError::Conflict(field) => Self::Conflict(format!("{field} already in use")),
            StoreError::Database(err) => Self::Internal(format!("database error: {err}")),
        }
    }
}

impl From<PasswordError> for ServerError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::CredentialMismatch => Self::invalid_credentials(),
            PasswordError::Hashing(msg) => Self::Internal(msg),
        }
    }
}

impl From<TokenError> for ServerError {
    fn from(_: TokenError) -> Self {
        Self::invalid_token()
    }
}

impl ServerError {
    /// Creates a new authentication error with the given client-visible code.
    ///
    /// # Example
    ///
    /// ```rust
    /// use spotlight_server::error::ServerError;
    ///
    /// let err = ServerError::auth("invalid_token", "token expired");
    /// assert!(matches!(err, ServerError::Auth { code: "invalid_token", .. }));
    /// ```
    pub fn auth(code: &'static str, message: impl Into<String>) -> Self {
        Self::Auth {
            code,
            message: message.into(),
        }
    }

    /// The 401 returned for every token-level failure.
    pub fn invalid_token() -> Self {
        Self::auth(CODE_INVALID_TOKEN, "invalid or expired token")
    }

    /// The 401 returned for a failed password login.
    pub fn invalid_credentials() -> Self {
        Self::auth(CODE_INVALID_CREDENTIALS, "invalid credentials")
    }

    /// Creates a new validation error.
    ///
    /// # Example
    ///
    /// ```rust
    /// use spotlight_server::error::ServerError;
    ///
    /// let err = ServerError::validation("password must be at least 6 characters");
    /// assert!(matches!(err, ServerError::Validation(_)));
    /// ```
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Creates a new rate limit error.
    ///
    /// # Example
    ///
    /// ```rust
    /// use spotlight_server::error::ServerError;
    ///
    /// let err = ServerError::rate_limit("192.168.1.1:/api/v1/events", 60);
    /// assert!(matches!(err, ServerError::RateLimit { .. }));
    /// ```
    pub fn rate_limit(source: impl Into<String>, retry_after: u64) -> Self {
        Self::RateLimit {
            source: source.into(),
            retry_after,
        }
    }

    /// Creates a new internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns `true` if this error indicates a client-side problem.
    pub fn is_client_error(&self) -> bool {
        !self.is_server_error()
    }

    /// Returns `true` if this error indicates a server-side problem.
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Internal(_) | Self::Config(_))
    }

    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidBody(_) | Self::Conflict(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Auth { .. } => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimit { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) | Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code for the response body.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "invalid_request",
            Self::InvalidBody(_) => "invalid_body",
            Self::Conflict(_) => "conflict",
            Self::Auth { code, .. } => *code,
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::RateLimit { .. } => "rate_limited",
            Self::Internal(_) | Self::Config(_) => "internal_error",
        }
    }

    /// Message shown to the client.
    fn public_message(&self) -> String {
        match self {
            Self::Validation(msg)
            | Self::InvalidBody(msg)
            | Self::Conflict(msg)
            | Self::Forbidden(msg)
            | Self::NotFound(msg) => msg.clone(),
            Self::Auth { message, .. } => message.clone(),
            Self::RateLimit { .. } => "rate limit exceeded".to_string(),
            Self::Internal(_) | Self::Config(_) => "internal server error".to_string(),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        if self.is_server_error() {
            error!(error = %self, "Request failed with internal error");
        }

        let status = self.status();
        let body = Json(ErrorResponse::new(self.public_message()).with_code(self.code()));

        match self {
            Self::RateLimit { retry_after, .. } => (
                status,
                [(header::RETRY_AFTER, retry_after.to_string())],
                body,
            )
                .into_response(),
            _ => (status, body).into_response(),
        }
    }
}

/// A specialized Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

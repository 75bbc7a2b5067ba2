//! HTTP routes for the Spotlight server.
//!
//! Everything except `GET /health` and the static `/uploads` tree lives under
//! `/api/v1`:
//!
//! - `/auth/*` - registration, password login, Google sign-in, mobile lookup
//! - `/users/*` - profiles and the influencer directory
//! - `/events/*` - event CRUD, attendance and bids
//! - `/applications/event/{event_id}` - bids as the host reviews them
//! - `/chats/*` - one-to-one chats, polled by the client
//! - `/upload` - image upload
//!
//! Everything under `/api/v1` except `/auth/*` sits behind [`require_auth`] and receive the
//! caller as a [`CurrentUser`](crate::identity::CurrentUser).
//!
//! # Example
//!
//! ```rust,no_run
//! use spotlight_server::config::Config;
//! use spotlight_server::routes::{create_router, AppState};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("failed to load config");
//!     let state = AppState::new(config).await.expect("failed to build state");
//!     let app = create_router(state);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await.unwrap();
//!     axum::serve(
//!         listener,
//!         app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
//!     )
//!     .await
//!     .unwrap();
//! }
//! ```

mod auth;
mod chats;
mod events;
mod upload;
mod users;

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request, State};
use axum::middleware;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::time::Instant;
use tower_http::services::ServeDir;
use tracing::debug;

use crate::auth::{Clock, SystemClock, TokenService};
use crate::config::Config;
use crate::db::{self, ChatRepository, EventRepository, SqlUserStore, UserStore};
use crate::error::ServerError;
use crate::identity::require_auth;
use crate::layers;
use crate::oauth::IdentityBridge;
use crate::password::PasswordService;
use crate::rate_limit::RateLimiter;

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for all route handlers.
///
/// Built once at startup; every field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<Config>,

    /// Credential store the auth core reads and writes users through.
    pub users: Arc<dyn UserStore>,

    pub events: EventRepository,

    pub chats: ChatRepository,

    /// Signs and verifies bearer tokens.
    pub tokens: Arc<TokenService>,

    /// Argon2id hasher.
    pub passwords: PasswordService,

    /// Google / Firebase identity token verification.
    pub identity: Arc<IdentityBridge>,

    /// Rate limiter for protecting against abuse.
    pub rate_limiter: RateLimiter,

    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Connects to the database and builds every service from `config`.
    ///
    /// # Errors
    ///
    /// Fails if the database cannot be opened or migrated, or if the signing
    /// secret or identity provider clients cannot be set up.
    pub async fn new(config: Config) -> Result<Self, ServerError> {
        let pool = db::connect(&config.database_url).await?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let tokens = TokenService::with_clock(&config.jwt_secret, Arc::clone(&clock))?;
        let passwords = PasswordService::new()?;
        let identity = IdentityBridge::from_config(&config, clock)
            .map_err(|err| ServerError::internal(err.to_string()))?;
        let rate_limiter = RateLimiter::per_minute(config.rate_limit_per_minute);

        Ok(Self::with_components(
            config,
            pool,
            tokens,
            passwords,
            identity,
            rate_limiter,
        ))
    }

    /// Creates application state from already-built parts.
    ///
    /// Useful for testing with an in-memory database, a manual clock or
    /// identity providers pointed at a mock server.
    #[must_use]
    pub fn with_components(
        config: Config,
        pool: SqlitePool,
        tokens: TokenService,
        passwords: PasswordService,
        identity: IdentityBridge,
        rate_limiter: RateLimiter,
    ) -> Self {
        Self {
            config: Arc::new(config),
            users: Arc::new(SqlUserStore::new(pool.clone())),
            events: EventRepository::new(pool.clone()),
            chats: ChatRepository::new(pool),
            tokens: Arc::new(tokens),
            passwords,
            identity: Arc::new(identity),
            rate_limiter,
            start_time: Instant::now(),
        }
    }

    /// Replaces the credential store.
    #[must_use]
    pub fn with_user_store(mut self, users: Arc<dyn UserStore>) -> Self {
        self.users = users;
        self
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("tokens", &self.tokens)
            .field("passwords", &self.passwords)
            .field("identity_configured", &self.identity.is_configured())
            .field("rate_limiter", &self.rate_limiter)
            .field("start_time", &self.start_time)
            .finish()
    }
}

// ============================================================================
// Router
// ============================================================================

/// Creates the application router with all routes and edge layers.
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .merge(users::routes())
        .merge(events::routes())
        .merge(chats::routes())
        .merge(upload::routes())
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let api = Router::new().merge(auth::routes()).merge(protected);

    let config = Arc::clone(&state.config);
    let rate_limiter = state.rate_limiter.clone();

    let router = Router::new()
        .route("/health", get(get_health))
        .nest("/api/v1", api)
        .nest_service("/uploads", ServeDir::new(&config.upload_dir))
        .with_state(state);

    layers::apply(router, &config, rate_limiter)
}

// ============================================================================
// JSON extractor
// ============================================================================

/// `Json` whose rejection is a [`ServerError::InvalidBody`] with our error
/// body instead of axum's plain-text one.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppJson<T>(pub T);

impl<S, T> FromRequest<S> for AppJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                debug!(status = %rejection.status(), "Rejected request body");
                Err(ServerError::InvalidBody(rejection.body_text()))
            }
        }
    }
}

/// Body for endpoints that only confirm an action.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

/// Rejects blank required strings, returning the trimmed value.
pub(crate) fn required(field: &str, value: &str) -> Result<String, ServerError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServerError::validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

// ============================================================================
// GET /health - Health Check
// ============================================================================

/// Response body for the health check endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Server status, always "ok" when responding.
    pub status: String,

    /// Seconds since the server started.
    pub uptime_seconds: u64,
}

/// GET /health - liveness and uptime. No authentication required.
async fn get_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

//! Bearer-token authentication for protected routes.
//!
//! [`require_auth`] runs before every protected handler:
//!
//! 1. the `Authorization` header must be present,
//! 2. it must read `Bearer <token>`,
//! 3. the token must verify (signature, algorithm, subject, expiry),
//! 4. the subject must still name a stored user.
//!
//! Steps 1 to 3 never touch the store. On success the loaded [`User`] is put in
//! the request extensions as [`CurrentUser`]; handlers take it as an extractor.
//!
//! Clients see 401 with `missing_authorization`, `malformed_authorization` or
//! `invalid_token`. Which token check failed is only logged.

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::Response;
use thiserror::Error;
use tracing::debug;

use crate::auth::{TokenError, TokenService};
use crate::db::{StoreError, UserStore};
use crate::error::{ServerError, CODE_MALFORMED_AUTHORIZATION, CODE_MISSING_AUTHORIZATION};
use crate::routes::AppState;
use crate::types::User;

/// Why a request was not authenticated.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing authorization header")]
    MissingHeader,

    #[error("authorization header is not a bearer token")]
    MalformedHeader,

    #[error("token rejected: {0}")]
    Token(#[from] TokenError),

    #[error("token subject has no account")]
    UserNotFound,
}

impl From<AuthError> for ServerError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingHeader => {
                ServerError::auth(CODE_MISSING_AUTHORIZATION, "authorization header required")
            }
            AuthError::MalformedHeader => ServerError::auth(
                CODE_MALFORMED_AUTHORIZATION,
                "authorization header must be 'Bearer <token>'",
            ),
            AuthError::Token(_) | AuthError::UserNotFound => ServerError::invalid_token(),
        }
    }
}

/// The authenticated user, as loaded from the store for this request.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl CurrentUser {
    pub fn id(&self) -> &str {
        &self.0.id
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| AuthError::MissingHeader.into())
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header.
///
/// The scheme is matched case-insensitively. Anything other than exactly a
/// scheme and one non-empty token is malformed.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingHeader)?
        .to_str()
        .map_err(|_| AuthError::MalformedHeader)?;

    let mut parts = value.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("bearer") => Ok(token),
        _ => Err(AuthError::MalformedHeader),
    }
}

/// Runs the full check and loads the user.
pub async fn authenticate(
    tokens: &TokenService,
    users: &dyn UserStore,
    headers: &HeaderMap,
) -> Result<User, ServerError> {
    let token = bearer_token(headers).map_err(reject)?;
    let claims = tokens
        .verify(token)
        .map_err(|err| reject(AuthError::Token(err)))?;

    match users.find_by_id(&claims.sub).await {
        Ok(user) => Ok(user),
        Err(StoreError::NotFound) => Err(reject(AuthError::UserNotFound)),
        Err(err) => Err(err.into()),
    }
}

fn reject(err: AuthError) -> ServerError {
    debug!(reason = %err, "Request not authenticated");
    err.into()
}

/// Middleware guarding protected routes. See the module docs.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ServerError> {
    let user = authenticate(&state.tokens, state.users.as_ref(), request.headers()).await?;
    debug!(user_id = %user.id, "Request authenticated");

    request.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(request).await)
}

//! Public authentication endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{required, AppJson, AppState};
use crate::db::StoreError;
use crate::error::ServerError;
use crate::types::{DrinkingStatus, EducationLevel, Gender, Role, User};

/// Minimum password length accepted at registration.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Minimum age accepted at registration.
pub const MIN_AGE: i32 = 18;

/// Attempts at finding a free generated username before giving up.
const USERNAME_ATTEMPTS: usize = 5;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/google-auth", post(google_auth))
        .route("/auth/check-mobile", post(check_mobile))
}

// ============================================================================
// POST /auth/register
// ============================================================================

/// Registration body. Holds a plaintext password, so it has no `Debug`.
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub age: Option<i32>,
    #[serde(default)]
    pub mobile_number: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub work: Option<String>,
    #[serde(default)]
    pub education: Option<String>,
    #[serde(default)]
    pub education_level: Option<EducationLevel>,
    #[serde(default)]
    pub drinking: Option<DrinkingStatus>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub media_gallery: Vec<String>,
    #[serde(default)]
    pub instagram_handle: Option<String>,
    #[serde(default)]
    pub follower_count: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: User,
}

async fn register(
    State(state): State<AppState>,
    AppJson(req): AppJson<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ServerError> {
    let name = required("name", &req.name)?;
    let email = normalize_email(&req.email)?;
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ServerError::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    let age = match req.age {
        Some(age) if age >= MIN_AGE => age,
        Some(_) => {
            return Err(ServerError::validation(format!(
                "age must be at least {MIN_AGE}"
            )))
        }
        None => return Err(ServerError::validation("age is required")),
    };
    let mobile_number = req
        .mobile_number
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string);

    let username = generate_username(&state, &email).await?;
    let digest = state.passwords.hash_blocking(req.password).await?;

    let mut user = User::new(
        Uuid::new_v4().to_string(),
        name,
        username,
        email,
        digest,
        req.role,
        state.tokens.now(),
    );
    user.age = Some(age);
    user.mobile_number = mobile_number;
    user.bio = req.bio;
    user.gender = req.gender;
    user.work = req.work;
    user.education = req.education;
    user.education_level = req.education_level;
    user.drinking = req.drinking;
    user.location = req.location;
    user.interests = req.interests;
    user.avatar_url = req.avatar_url;
    user.media_gallery = req.media_gallery;
    if user.role.is_influencer() {
        user.instagram_handle = req.instagram_handle;
        user.follower_count = req.follower_count.unwrap_or(0).max(0);
    }

    let user = match state.users.create(user).await {
        Ok(user) => user,
        Err(StoreError::Conflict(field)) => {
            debug!(field, "Registration rejected, field already in use");
            return Err(ServerError::conflict(format!("{field} already registered")));
        }
        Err(err) => return Err(err.into()),
    };

    info!(user_id = %user.id, role = ?user.role, "User registered");
    Ok((StatusCode::CREATED, Json(UserResponse { user })))
}

fn normalize_email(raw: &str) -> Result<String, ServerError> {
    let email = raw.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(ServerError::validation("a valid email is required")),
    }
}

/// Lowercased alphanumeric local part of `email` followed by four random
/// digits, retried until unused.
async fn generate_username(state: &AppState, email: &str) -> Result<String, ServerError> {
    let base: String = email
        .split('@')
        .next()
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect();
    let base = if base.is_empty() { "user".to_string() } else { base };

    for _ in 0..USERNAME_ATTEMPTS {
        let suffix: u16 = rand::rng().random_range(0..10_000);
        let candidate = format!("{base}{suffix:04}");
        if !state.users.username_exists(&candidate).await? {
            return Ok(candidate);
        }
    }
    warn!(base = %base, "Could not find a free username");
    Err(ServerError::conflict("could not allocate a username, try again"))
}

// ============================================================================
// POST /auth/login
// ============================================================================

/// Login body. One of `identifier`, `email` or `mobile_number` names the
/// account. No `Debug`: it holds the password.
#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub mobile_number: Option<String>,
    pub password: String,
}

impl LoginRequest {
    fn identifier(&self) -> Option<&str> {
        [&self.identifier, &self.email, &self.mobile_number]
            .into_iter()
            .flatten()
            .map(|value| value.trim())
            .find(|value| !value.is_empty())
    }
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub user: User,
}

async fn login(
    State(state): State<AppState>,
    AppJson(req): AppJson<LoginRequest>,
) -> Result<Json<TokenResponse>, ServerError> {
    let identifier = req
        .identifier()
        .ok_or_else(|| ServerError::validation("identifier is required"))?
        .to_string();

    let lookup = if identifier.contains('@') {
        state.users.find_by_email(&identifier.to_lowercase()).await
    } else {
        state.users.find_by_mobile(&identifier).await
    };
    let user = match lookup {
        Ok(user) => Some(user),
        Err(StoreError::NotFound) => None,
        Err(err) => return Err(err.into()),
    };

    let digest = user.as_ref().map(|user| user.password_hash.clone());
    if let Err(err) = state.passwords.verify_blocking(req.password, digest).await {
        debug!(known_account = user.is_some(), "Login rejected");
        return Err(err.into());
    }
    let Some(user) = user else {
        return Err(ServerError::invalid_credentials());
    };

    let token = state.tokens.issue(&user.id, user.role)?;
    info!(user_id = %user.id, "User logged in");
    Ok(Json(TokenResponse { token, user }))
}

// ============================================================================
// POST /auth/google-auth
// ============================================================================

/// No `Debug`: the identity token is a credential.
#[derive(Deserialize)]
pub struct GoogleAuthRequest {
    pub id_token: String,
}

async fn google_auth(
    State(state): State<AppState>,
    AppJson(req): AppJson<GoogleAuthRequest>,
) -> Result<Response, ServerError> {
    let id_token = required("id_token", &req.id_token)?;

    let identity = state.identity.verify(&id_token).await.map_err(|err| {
        info!(error = %err, "Identity token rejected");
        ServerError::invalid_token()
    })?;

    let user = match state.users.find_by_email(&identity.email).await {
        Ok(user) => user,
        Err(StoreError::NotFound) => {
            debug!(provider = %identity.provider, "Verified identity has no account");
            let body = json!({
                "error": "user not registered",
                "code": "not_registered",
                "email": identity.email,
                "action": "signup",
            });
            return Ok((StatusCode::NOT_FOUND, Json(body)).into_response());
        }
        Err(err) => return Err(err.into()),
    };

    let token = state.tokens.issue(&user.id, user.role)?;
    info!(
        user_id = %user.id,
        provider = %identity.provider,
        "User signed in with identity provider"
    );
    Ok(Json(TokenResponse { token, user }).into_response())
}

// ============================================================================
// POST /auth/check-mobile
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CheckMobileRequest {
    pub mobile_number: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckMobileResponse {
    pub exists: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

async fn check_mobile(
    State(state): State<AppState>,
    AppJson(req): AppJson<CheckMobileRequest>,
) -> Result<(StatusCode, Json<CheckMobileResponse>), ServerError> {
    let mobile_number = required("mobile_number", &req.mobile_number)?;

    match state.users.find_by_mobile(&mobile_number).await {
        Ok(user) => Ok((
            StatusCode::OK,
            Json(CheckMobileResponse {
                exists: true,
                user_id: Some(user.id),
            }),
        )),
        Err(StoreError::NotFound) => Ok((
            StatusCode::NOT_FOUND,
            Json(CheckMobileResponse {
                exists: false,
                user_id: None,
            }),
        )),
        Err(err) => Err(err.into()),
    }
}

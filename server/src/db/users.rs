//! Credential store.

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::SqlitePool;
use tracing::debug;

use super::{classify_read_error, classify_write_error, StoreError};
use crate::types::{Role, User};

/// Persistence contract the auth core depends on.
///
/// Lookups return [`StoreError::NotFound`] when nothing matches. Writes that
/// collide with a unique field return [`StoreError::Conflict`] naming it.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Case-insensitive email lookup.
    async fn find_by_email(&self, email: &str) -> Result<User, StoreError>;

    async fn find_by_mobile(&self, mobile_number: &str) -> Result<User, StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<User, StoreError>;

    /// Inserts a new user.
    async fn create(&self, user: User) -> Result<User, StoreError>;

    /// Overwrites the profile columns of an existing user.
    ///
    /// `events_hosted_count` is left alone; the event repository owns it.
    async fn save(&self, user: User) -> Result<User, StoreError>;

    async fn username_exists(&self, username: &str) -> Result<bool, StoreError>;

    async fn list_by_role(&self, role: Role) -> Result<Vec<User>, StoreError>;
}

/// [`UserStore`] over the SQLite pool.
#[derive(Debug, Clone)]
pub struct SqlUserStore {
    pool: SqlitePool,
}

impl SqlUserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, sql: &str, key: &str) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(sql)
            .bind(key)
            .fetch_one(&self.pool)
            .await
            .map_err(classify_read_error)
    }
}

#[async_trait]
impl UserStore for SqlUserStore {
    async fn find_by_email(&self, email: &str) -> Result<User, StoreError> {
        self.find_one("SELECT * FROM users WHERE email = ?", email.trim())
            .await
    }

    async fn find_by_mobile(&self, mobile_number: &str) -> Result<User, StoreError> {
        self.find_one(
            "SELECT * FROM users WHERE mobile_number = ?",
            mobile_number.trim(),
        )
        .await
    }

    async fn find_by_id(&self, id: &str) -> Result<User, StoreError> {
        self.find_one("SELECT * FROM users WHERE id = ?", id).await
    }

    async fn create(&self, user: User) -> Result<User, StoreError> {
        sqlx::query(
            "INSERT INTO users (
                id, name, username, email, password_hash, role, mobile_number,
                avatar_url, bio, media_gallery, profile_photos, interests, age,
                gender, location, height, work, education, education_level,
                drinking, cover_photo_url, instagram_handle, follower_count,
                wallet_balance, government_id_url, is_verified, verified_at,
                events_hosted_count, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                      ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role)
        .bind(&user.mobile_number)
        .bind(&user.avatar_url)
        .bind(&user.bio)
        .bind(Json(&user.media_gallery))
        .bind(Json(&user.profile_photos))
        .bind(Json(&user.interests))
        .bind(user.age)
        .bind(user.gender)
        .bind(&user.location)
        .bind(user.height)
        .bind(&user.work)
        .bind(&user.education)
        .bind(user.education_level)
        .bind(user.drinking)
        .bind(&user.cover_photo_url)
        .bind(&user.instagram_handle)
        .bind(user.follower_count)
        .bind(user.wallet_balance)
        .bind(&user.government_id_url)
        .bind(user.is_verified)
        .bind(user.verified_at)
        .bind(user.events_hosted_count)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(classify_write_error)?;

        debug!(user_id = %user.id, "User created");
        Ok(user)
    }

    async fn save(&self, user: User) -> Result<User, StoreError> {
        let result = sqlx::query(
            "UPDATE users SET
                name = ?, username = ?, email = ?, password_hash = ?, role = ?,
                mobile_number = ?, avatar_url = ?, bio = ?, media_gallery = ?,
                profile_photos = ?, interests = ?, age = ?, gender = ?,
                location = ?, height = ?, work = ?, education = ?,
                education_level = ?, drinking = ?, cover_photo_url = ?,
                instagram_handle = ?, follower_count = ?, wallet_balance = ?,
                government_id_url = ?, is_verified = ?, verified_at = ?,
                updated_at = ?
            WHERE id = ?",
        )
        .bind(&user.name)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role)
        .bind(&user.mobile_number)
        .bind(&user.avatar_url)
        .bind(&user.bio)
        .bind(Json(&user.media_gallery))
        .bind(Json(&user.profile_photos))
        .bind(Json(&user.interests))
        .bind(user.age)
        .bind(user.gender)
        .bind(&user.location)
        .bind(user.height)
        .bind(&user.work)
        .bind(&user.education)
        .bind(user.education_level)
        .bind(user.drinking)
        .bind(&user.cover_photo_url)
        .bind(&user.instagram_handle)
        .bind(user.follower_count)
        .bind(user.wallet_balance)
        .bind(&user.government_id_url)
        .bind(user.is_verified)
        .bind(user.verified_at)
        .bind(user.updated_at)
        .bind(&user.id)
        .execute(&self.pool)
        .await
        .map_err(classify_write_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(user)
    }

    async fn username_exists(&self, username: &str) -> Result<bool, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE username = ?")
            .bind(username)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    async fn list_by_role(&self, role: Role) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE role = ? ORDER BY follower_count DESC, created_at",
        )
        .bind(role)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }
}

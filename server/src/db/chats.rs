//! One-to-one chats and their messages.

use sqlx::SqlitePool;
use tracing::debug;

use super::{classify_read_error, classify_write_error, StoreError};
use crate::types::{Chat, Message};

/// Result of opening a chat between two users.
#[derive(Debug, Clone)]
pub enum ChatOpened {
    Created(Chat),
    /// The pair already had a chat; this is it.
    Existing(Chat),
}

#[derive(Debug, Clone)]
pub struct ChatRepository {
    pool: SqlitePool,
}

impl ChatRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Chats `user_id` takes part in, most recently active first.
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Chat>, StoreError> {
        let chats = sqlx::query_as::<_, Chat>(
            "SELECT * FROM chats WHERE user1_id = ? OR user2_id = ? ORDER BY updated_at DESC",
        )
        .bind(user_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(chats)
    }

    pub async fn find(&self, id: &str) -> Result<Chat, StoreError> {
        sqlx::query_as::<_, Chat>("SELECT * FROM chats WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(classify_read_error)
    }

    /// The chat between `a` and `b`, whichever of them opened it.
    pub async fn find_between(&self, a: &str, b: &str) -> Result<Option<Chat>, StoreError> {
        let chat = sqlx::query_as::<_, Chat>(
            "SELECT * FROM chats
             WHERE (user1_id = ? AND user2_id = ?) OR (user1_id = ? AND user2_id = ?)",
        )
        .bind(a)
        .bind(b)
        .bind(b)
        .bind(a)
        .fetch_optional(&self.pool)
        .await?;
        Ok(chat)
    }

    /// Inserts a chat. A second chat for the same pair, in either order, is
    /// [`StoreError::Conflict`].
    pub async fn create(&self, chat: Chat) -> Result<Chat, StoreError> {
        sqlx::query(
            "INSERT INTO chats (id, user1_id, user2_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&chat.id)
        .bind(&chat.user1_id)
        .bind(&chat.user2_id)
        .bind(chat.created_at)
        .bind(chat.updated_at)
        .execute(&self.pool)
        .await
        .map_err(classify_write_error)?;
        Ok(chat)
    }

    /// Returns the pair's chat, creating `chat` if they have none yet.
    ///
    /// Two users opening a chat with each other at the same time both end up
    /// with the single row the pair index lets through.
    pub async fn open(&self, chat: Chat) -> Result<ChatOpened, StoreError> {
        if let Some(existing) = self.find_between(&chat.user1_id, &chat.user2_id).await? {
            return Ok(ChatOpened::Existing(existing));
        }

        let (user1_id, user2_id) = (chat.user1_id.clone(), chat.user2_id.clone());
        match self.create(chat).await {
            Ok(chat) => Ok(ChatOpened::Created(chat)),
            Err(StoreError::Conflict(_)) => {
                debug!(user1_id = %user1_id, user2_id = %user2_id, "Lost race to open chat");
                self.find_between(&user1_id, &user2_id)
                    .await?
                    .map(ChatOpened::Existing)
                    .ok_or(StoreError::NotFound)
            }
            Err(err) => Err(err),
        }
    }

    /// Messages in a chat, oldest first.
    pub async fn messages(&self, chat_id: &str) -> Result<Vec<Message>, StoreError> {
        let messages = sqlx::query_as::<_, Message>(
            "SELECT * FROM messages WHERE chat_id = ? ORDER BY created_at, rowid",
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(messages)
    }

    /// Appends a message and bumps the chat's `updated_at`.
    pub async fn add_message(&self, message: Message) -> Result<Message, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO messages (id, chat_id, sender_id, content, is_read, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.id)
        .bind(&message.chat_id)
        .bind(&message.sender_id)
        .bind(&message.content)
        .bind(message.read)
        .bind(message.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE chats SET updated_at = ? WHERE id = ?")
            .bind(message.created_at)
            .bind(&message.chat_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(message)
    }

    /// Marks one message read. Returns false if it is not in `chat_id`.
    pub async fn mark_read(&self, chat_id: &str, message_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE messages SET is_read = 1 WHERE id = ? AND chat_id = ?")
            .bind(message_id)
            .bind(chat_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

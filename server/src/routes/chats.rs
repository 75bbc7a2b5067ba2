//! One-to-one chats. Clients poll these endpoints; nothing is pushed.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use super::{required, AppJson, AppState, MessageResponse};
use crate::db::ChatOpened;
use crate::error::ServerError;
use crate::identity::CurrentUser;
use crate::types::{Chat, ChatDetail, Message, PublicProfile};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/chats", get(list_chats).post(create_chat))
        .route("/chats/{id}", get(get_chat))
        .route("/chats/{id}/messages", post(send_message))
        .route("/chats/{id}/messages/{message_id}/read", put(mark_read))
}

/// Loads a chat the caller takes part in.
///
/// Chats the caller is not part of are reported as missing, not forbidden.
async fn participant_chat(
    state: &AppState,
    id: &str,
    user: &CurrentUser,
) -> Result<Chat, ServerError> {
    let chat = state.chats.find(id).await?;
    if !chat.has_participant(user.id()) {
        debug!(chat_id = %chat.id, user_id = %user.id(), "Caller is not a participant");
        return Err(ServerError::not_found("chat not found"));
    }
    Ok(chat)
}

async fn load_user(state: &AppState, id: &str) -> Result<Option<PublicProfile>, ServerError> {
    match state.users.find_by_id(id).await {
        Ok(user) => Ok(Some(user.into())),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err.into()),
    }
}

async fn detail(state: &AppState, chat: Chat) -> Result<ChatDetail, ServerError> {
    let user1 = load_user(state, &chat.user1_id).await?;
    let user2 = load_user(state, &chat.user2_id).await?;
    let messages = state.chats.messages(&chat.id).await?;
    Ok(ChatDetail {
        chat,
        user1,
        user2,
        messages,
    })
}

/// The caller's chats, most recently active first.
async fn list_chats(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<ChatDetail>>, ServerError> {
    let chats = state.chats.list_for_user(user.id()).await?;
    let mut details = Vec::with_capacity(chats.len());
    for chat in chats {
        details.push(detail(&state, chat).await?);
    }
    Ok(Json(details))
}

async fn get_chat(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<ChatDetail>, ServerError> {
    let chat = participant_chat(&state, &id, &user).await?;
    Ok(Json(detail(&state, chat).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateChatRequest {
    pub user2_id: String,
}

/// Opens a chat with another user, or returns the one that already exists.
async fn create_chat(
    State(state): State<AppState>,
    user: CurrentUser,
    AppJson(req): AppJson<CreateChatRequest>,
) -> Result<(StatusCode, Json<ChatDetail>), ServerError> {
    let other = required("user2_id", &req.user2_id)?;
    if other == user.id() {
        return Err(ServerError::validation("cannot start a chat with yourself"));
    }
    if load_user(&state, &other).await?.is_none() {
        return Err(ServerError::not_found("user not found"));
    }

    let now = state.tokens.now();
    let opened = state
        .chats
        .open(Chat {
            id: Uuid::new_v4().to_string(),
            user1_id: user.id().to_string(),
            user2_id: other,
            created_at: now,
            updated_at: now,
        })
        .await?;

    let (status, chat) = match opened {
        ChatOpened::Created(chat) => {
            info!(chat_id = %chat.id, "Chat created");
            (StatusCode::CREATED, chat)
        }
        ChatOpened::Existing(chat) => (StatusCode::OK, chat),
    };
    Ok((status, Json(detail(&state, chat).await?)))
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

async fn send_message(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    AppJson(req): AppJson<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ServerError> {
    let chat = participant_chat(&state, &id, &user).await?;
    if req.content.trim().is_empty() {
        return Err(ServerError::validation("content is required"));
    }

    let message = state
        .chats
        .add_message(Message {
            id: Uuid::new_v4().to_string(),
            chat_id: chat.id,
            sender_id: user.id().to_string(),
            content: req.content,
            read: false,
            created_at: state.tokens.now(),
        })
        .await?;

    debug!(chat_id = %message.chat_id, message_id = %message.id, "Message sent");
    Ok((StatusCode::CREATED, Json(message)))
}

async fn mark_read(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((id, message_id)): Path<(String, String)>,
) -> Result<Json<MessageResponse>, ServerError> {
    let chat = participant_chat(&state, &id, &user).await?;
    if !state.chats.mark_read(&chat.id, &message_id).await? {
        return Err(ServerError::not_found("message not found"));
    }
    Ok(MessageResponse::new("message marked as read"))
}

//! Message Reaction Handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::json_error;
use crate::api::AppState;
use crate::auth::AuthUser;
use crate::db::{self, ReactionCount};
use crate::events::{self, ServerEvent};
use crate::permissions::{
    require_channel_permission, ChannelContext, GuildPermissions, PermissionError,
};

/// Longest accepted emoji string (custom emoji IDs included).
const MAX_EMOJI_LENGTH: usize = 64;

#[derive(Debug, Deserialize)]
pub struct AddReactionRequest {
    pub emoji: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ReactionsError {
    #[error("Message not found")]
    MessageNotFound,
    #[error("Invalid emoji")]
    InvalidEmoji,
    #[error(transparent)]
    Permission(#[from] PermissionError),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for ReactionsError {
    fn into_response(self) -> Response {
        match self {
            Self::MessageNotFound => {
                json_error(StatusCode::NOT_FOUND, "not_found", "Message not found")
            }
            Self::InvalidEmoji => json_error(StatusCode::BAD_REQUEST, "invalid_emoji", "Invalid emoji"),
            Self::Permission(e) => e.into_response(),
            Self::Database(err) => {
                tracing::error!("Database error: {}", err);
                json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Database error",
                )
            }
        }
    }
}

fn validate_emoji(emoji: &str) -> Result<&str, ReactionsError> {
    let emoji = emoji.trim();
    if emoji.is_empty() || emoji.len() > MAX_EMOJI_LENGTH || emoji.chars().any(char::is_whitespace) {
        return Err(ReactionsError::InvalidEmoji);
    }
    Ok(emoji)
}

/// Ensure the message exists in the channel.
async fn require_message(
    state: &AppState,
    channel_id: Uuid,
    message_id: Uuid,
) -> Result<(), ReactionsError> {
    match db::find_message_by_id(&state.db, message_id).await? {
        Some(message) if message.channel_id == channel_id => Ok(()),
        _ => Err(ReactionsError::MessageNotFound),
    }
}

/// List reactions on a message.
/// GET /api/channels/{id}/messages/{message_id}/reactions
pub async fn list(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path((channel_id, message_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Vec<ReactionCount>>, ReactionsError> {
    require_channel_permission(
        &state.db,
        channel_id,
        auth_user.id,
        GuildPermissions::VIEW_CHANNEL,
    )
    .await?;

    require_message(&state, channel_id, message_id).await?;

    let reactions = db::list_reactions(&state.db, message_id, auth_user.id).await?;
    Ok(Json(reactions))
}

/// Add a reaction to a message.
/// PUT /api/channels/{id}/messages/{message_id}/reactions
pub async fn add(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path((channel_id, message_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<AddReactionRequest>,
) -> Result<StatusCode, ReactionsError> {
    let emoji = validate_emoji(&req.emoji)?;

    let ctx = ChannelContext::load(&state.db, channel_id, auth_user.id).await?;
    ctx.require_permission(GuildPermissions::ADD_REACTIONS)?;

    require_message(&state, channel_id, message_id).await?;

    if !db::add_reaction(&state.db, message_id, auth_user.id, emoji).await? {
        return Ok(StatusCode::NO_CONTENT);
    }

    events::publish(
        &state.redis,
        channel_id,
        ServerEvent::ReactionAdd {
            channel_id,
            message_id,
            user_id: auth_user.id,
            emoji: emoji.to_string(),
        },
    )
    .await;

    Ok(StatusCode::CREATED)
}

/// Remove the caller's reaction.
/// DELETE /api/channels/{id}/messages/{message_id}/reactions/{emoji}
pub async fn remove(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path((channel_id, message_id, emoji)): Path<(Uuid, Uuid, String)>,
) -> Result<StatusCode, ReactionsError> {
    let emoji = validate_emoji(&emoji)?;

    require_channel_permission(
        &state.db,
        channel_id,
        auth_user.id,
        GuildPermissions::VIEW_CHANNEL,
    )
    .await?;

    require_message(&state, channel_id, message_id).await?;

    if db::remove_reaction(&state.db, message_id, auth_user.id, emoji).await? {
        events::publish(
            &state.redis,
            channel_id,
            ServerEvent::ReactionRemove {
                channel_id,
                message_id,
                user_id: auth_user.id,
                emoji: emoji.to_string(),
            },
        )
        .await;
    }

    Ok(StatusCode::NO_CONTENT)
}

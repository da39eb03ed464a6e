//! Message Handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::json_error;
use super::send_policy::{PolicyError, PolicyViolation, SendRequest};
use crate::{
    api::AppState,
    auth::AuthUser,
    db::{self, NewMessage},
    events::{self, ServerEvent},
    permissions::{ChannelContext, GuildPermissions, PermissionError},
};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("Message not found")]
    NotFound,
    #[error("Reply target not found")]
    ReplyNotFound,
    #[error("Only the author can edit a message")]
    NotAuthor,
    #[error("Missing permission to mention @everyone or @here")]
    MentionEveryoneForbidden,
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Policy(#[from] PolicyViolation),
    #[error(transparent)]
    Permission(#[from] PermissionError),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<PolicyError> for MessageError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::Violation(v) => Self::Policy(v),
            PolicyError::Database(e) => Self::Database(e),
        }
    }
}

impl IntoResponse for MessageError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "Message not found"),
            Self::ReplyNotFound => json_error(
                StatusCode::BAD_REQUEST,
                "reply_not_found",
                "Reply target not found",
            ),
            Self::NotAuthor => json_error(
                StatusCode::FORBIDDEN,
                "not_author",
                "Only the author can edit a message",
            ),
            Self::MentionEveryoneForbidden => json_error(
                StatusCode::FORBIDDEN,
                "mention_everyone_forbidden",
                "Missing permission to mention @everyone or @here",
            ),
            Self::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
            Self::Policy(v) => v.into_response(),
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

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub encrypted: bool,
    pub nonce: Option<String>,
    pub reply_to: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
}

impl From<db::Message> for MessageResponse {
    fn from(msg: db::Message) -> Self {
        Self {
            id: msg.id,
            channel_id: msg.channel_id,
            user_id: msg.user_id,
            content: msg.content,
            encrypted: msg.encrypted,
            nonce: msg.nonce,
            reply_to: msg.reply_to,
            created_at: msg.created_at,
            edited_at: msg.edited_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListMessagesQuery {
    pub before: Option<Uuid>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

const fn default_limit() -> i64 {
    50
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateMessageRequest {
    #[validate(length(min = 1, message = "Content must not be empty"))]
    pub content: String,
    #[serde(default)]
    pub encrypted: bool,
    pub nonce: Option<String>,
    pub reply_to: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateMessageRequest {
    #[validate(length(min = 1, message = "Content must not be empty"))]
    pub content: String,
}

fn check_length(content: &str, max: usize) -> Result<(), MessageError> {
    if content.chars().count() > max {
        return Err(MessageError::Validation(format!(
            "Content must be at most {max} characters"
        )));
    }
    Ok(())
}

/// Whether plaintext content pings the whole channel.
fn mentions_everyone(content: &str) -> bool {
    content.contains("@everyone") || content.contains("@here")
}

fn check_mentions(ctx: &ChannelContext, content: &str, encrypted: bool) -> Result<(), MessageError> {
    if !encrypted
        && mentions_everyone(content)
        && !ctx.has_permission(GuildPermissions::MENTION_EVERYONE)
    {
        return Err(MessageError::MentionEveryoneForbidden);
    }
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// List messages in a channel.
/// GET /api/channels/{id}/messages
pub async fn list(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(channel_id): Path<Uuid>,
    Query(query): Query<ListMessagesQuery>,
) -> Result<Json<Vec<MessageResponse>>, MessageError> {
    let ctx = ChannelContext::load(&state.db, channel_id, auth_user.id).await?;
    ctx.require_permission(GuildPermissions::VIEW_CHANNEL)?;
    ctx.require_permission(GuildPermissions::READ_MESSAGE_HISTORY)?;

    let limit = query.limit.clamp(1, 100);

    let messages = db::list_messages(&state.db, channel_id, query.before, limit).await?;

    Ok(Json(messages.into_iter().map(Into::into).collect()))
}

/// Create a new message.
/// POST /api/channels/{id}/messages
#[tracing::instrument(skip(state, body))]
pub async fn create(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(channel_id): Path<Uuid>,
    Json(body): Json<CreateMessageRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), MessageError> {
    body.validate()
        .map_err(|e| MessageError::Validation(e.to_string()))?;
    check_length(&body.content, state.config.max_message_length)?;

    if body.encrypted && body.nonce.is_none() {
        return Err(MessageError::Validation(
            "Encrypted messages require a nonce".to_string(),
        ));
    }

    let ctx = ChannelContext::load(&state.db, channel_id, auth_user.id).await?;

    let request = SendRequest {
        content: &body.content,
        encrypted: body.encrypted,
    };
    state.send_policy.check(&state.db, &ctx, request).await?;

    let stored = async {
        check_mentions(&ctx, &body.content, body.encrypted)?;

        if let Some(reply_id) = body.reply_to {
            let target = db::find_message_by_id(&state.db, reply_id).await?;
            if target.is_none_or(|m| m.channel_id != channel_id) {
                return Err(MessageError::ReplyNotFound);
            }
        }

        let message = db::create_message(
            &state.db,
            &NewMessage {
                channel_id,
                user_id: auth_user.id,
                content: &body.content,
                encrypted: body.encrypted,
                nonce: body.nonce.as_deref(),
                reply_to: body.reply_to,
            },
        )
        .await?;
        Ok::<_, MessageError>(message)
    }
    .await;

    // A send that never reached the database must not count as DM spam
    let message = match stored {
        Ok(message) => message,
        Err(e) => {
            state.send_policy.release(&ctx, request);
            return Err(e);
        }
    };

    let response = MessageResponse::from(message);
    events::publish(
        &state.redis,
        channel_id,
        ServerEvent::MessageNew {
            channel_id,
            message: serde_json::to_value(&response).unwrap_or_default(),
        },
    )
    .await;

    Ok((StatusCode::CREATED, Json(response)))
}

/// Edit a message.
/// PATCH /api/messages/{id}
#[tracing::instrument(skip(state, body))]
pub async fn update(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateMessageRequest>,
) -> Result<Json<MessageResponse>, MessageError> {
    body.validate()
        .map_err(|e| MessageError::Validation(e.to_string()))?;
    check_length(&body.content, state.config.max_message_length)?;

    let message = db::find_message_by_id(&state.db, id)
        .await?
        .ok_or(MessageError::NotFound)?;

    if message.user_id != auth_user.id {
        return Err(MessageError::NotAuthor);
    }

    let ctx = ChannelContext::load(&state.db, message.channel_id, auth_user.id).await?;
    if ctx.archived {
        return Err(PolicyViolation::ChannelArchived.into());
    }
    if ctx.locked {
        return Err(PolicyViolation::ChannelLocked.into());
    }
    check_mentions(&ctx, &body.content, message.encrypted)?;

    let message = db::update_message(&state.db, id, auth_user.id, &body.content)
        .await?
        .ok_or(MessageError::NotFound)?;

    events::publish(
        &state.redis,
        message.channel_id,
        ServerEvent::MessageEdit {
            channel_id: message.channel_id,
            message_id: message.id,
            content: message.content.clone(),
            edited_at: message.edited_at,
        },
    )
    .await;

    Ok(Json(message.into()))
}

/// Delete a message (soft delete).
/// DELETE /api/messages/{id}
#[tracing::instrument(skip(state))]
pub async fn delete(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, MessageError> {
    let message = db::find_message_by_id(&state.db, id)
        .await?
        .ok_or(MessageError::NotFound)?;

    if message.user_id != auth_user.id {
        let ctx = ChannelContext::load(&state.db, message.channel_id, auth_user.id).await?;
        ctx.require_permission(GuildPermissions::MANAGE_MESSAGES)?;
    }

    if !db::delete_message(&state.db, id).await? {
        return Err(MessageError::NotFound);
    }

    events::publish(
        &state.redis,
        message.channel_id,
        ServerEvent::MessageDelete {
            channel_id: message.channel_id,
            message_id: id,
        },
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

//! Channel Pin Handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;

use super::json_error;
use crate::api::AppState;
use crate::auth::AuthUser;
use crate::db::{self, ChannelPin};
use crate::events::{self, ServerEvent};
use crate::permissions::{require_channel_permission, GuildPermissions, PermissionError};

/// Pins a single channel may hold.
pub const MAX_PINS_PER_CHANNEL: i64 = 50;

#[derive(Debug, thiserror::Error)]
pub enum PinError {
    #[error("Message not found")]
    MessageNotFound,
    #[error("Message is not pinned")]
    NotPinned,
    #[error("Maximum pins limit reached (50)")]
    LimitReached,
    #[error(transparent)]
    Permission(#[from] PermissionError),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for PinError {
    fn into_response(self) -> Response {
        match self {
            Self::MessageNotFound => {
                json_error(StatusCode::NOT_FOUND, "not_found", "Message not found")
            }
            Self::NotPinned => json_error(
                StatusCode::NOT_FOUND,
                "pin_not_found",
                "Message is not pinned",
            ),
            Self::LimitReached => json_error(
                StatusCode::BAD_REQUEST,
                "pin_limit_reached",
                "Maximum pins limit reached (50)",
            ),
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

/// GET /api/channels/{id}/pins
pub async fn list(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(channel_id): Path<Uuid>,
) -> Result<Json<Vec<ChannelPin>>, PinError> {
    require_channel_permission(
        &state.db,
        channel_id,
        auth_user.id,
        GuildPermissions::VIEW_CHANNEL,
    )
    .await?;

    Ok(Json(db::list_pins(&state.db, channel_id).await?))
}

/// PUT /api/channels/{id}/pins/{message_id}
#[tracing::instrument(skip(state))]
pub async fn pin(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path((channel_id, message_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ChannelPin>, PinError> {
    require_channel_permission(
        &state.db,
        channel_id,
        auth_user.id,
        GuildPermissions::MANAGE_MESSAGES,
    )
    .await?;

    match db::find_message_by_id(&state.db, message_id).await? {
        Some(message) if message.channel_id == channel_id => {}
        _ => return Err(PinError::MessageNotFound),
    }

    let pin = db::pin_message(
        &state.db,
        channel_id,
        message_id,
        auth_user.id,
        MAX_PINS_PER_CHANNEL,
    )
    .await?
    .ok_or(PinError::LimitReached)?;

    events::publish(
        &state.redis,
        channel_id,
        ServerEvent::MessagePinned {
            channel_id,
            message_id,
            pinned_by: pin.pinned_by,
        },
    )
    .await;

    Ok(Json(pin))
}

/// DELETE /api/channels/{id}/pins/{message_id}
#[tracing::instrument(skip(state))]
pub async fn unpin(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path((channel_id, message_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, PinError> {
    require_channel_permission(
        &state.db,
        channel_id,
        auth_user.id,
        GuildPermissions::MANAGE_MESSAGES,
    )
    .await?;

    if !db::unpin_message(&state.db, channel_id, message_id).await? {
        return Err(PinError::NotPinned);
    }

    events::publish(
        &state.redis,
        channel_id,
        ServerEvent::MessageUnpinned {
            channel_id,
            message_id,
        },
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

//! Channel Management Handlers

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::send_policy::{PolicyError, PolicyViolation};
use super::json_error;
use crate::api::AppState;
use crate::auth::AuthUser;
use crate::db::{self, ChannelKind, ChannelPatch, NewChannel};
use crate::events::{self, ServerEvent};
use crate::permissions::{has_guild_permission, ChannelContext, GuildPermissions, PermissionError};

/// Longest slowmode interval a channel may carry (6 hours).
pub const MAX_SLOWMODE_SECONDS: i32 = 21_600;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel not found")]
    NotFound,
    #[error("{0}")]
    Validation(String),
    #[error("Threads cannot be created in this channel")]
    InvalidParent,
    #[error("Posts in this channel require a title")]
    TitleRequired,
    #[error("Gallery posts require an attachment")]
    AttachmentRequired,
    #[error(transparent)]
    Policy(#[from] PolicyViolation),
    #[error(transparent)]
    Permission(#[from] PermissionError),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<PolicyError> for ChannelError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::Violation(v) => Self::Policy(v),
            PolicyError::Database(e) => Self::Database(e),
        }
    }
}

impl IntoResponse for ChannelError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "Channel not found"),
            Self::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
            Self::InvalidParent => json_error(
                StatusCode::BAD_REQUEST,
                "invalid_parent",
                "Threads cannot be created in this channel",
            ),
            Self::TitleRequired => json_error(
                StatusCode::BAD_REQUEST,
                "title_required",
                "Posts in this channel require a title",
            ),
            Self::AttachmentRequired => json_error(
                StatusCode::BAD_REQUEST,
                "attachment_required",
                "Gallery posts require an attachment",
            ),
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
pub struct ChannelResponse {
    pub id: Uuid,
    pub guild_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub kind: ChannelKind,
    pub topic: Option<String>,
    pub position: i32,
    pub locked: bool,
    pub archived: bool,
    pub read_only: bool,
    pub read_only_role_ids: Vec<Uuid>,
    pub encrypted: bool,
    pub slowmode_seconds: i32,
    pub last_message_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<db::Channel> for ChannelResponse {
    fn from(ch: db::Channel) -> Self {
        Self {
            id: ch.id,
            guild_id: ch.guild_id,
            parent_id: ch.parent_id,
            name: ch.name,
            kind: ch.kind,
            topic: ch.topic,
            position: ch.position,
            locked: ch.locked,
            archived: ch.archived,
            read_only: ch.read_only,
            read_only_role_ids: ch.read_only_role_ids,
            encrypted: ch.encrypted,
            slowmode_seconds: ch.slowmode_seconds,
            last_message_at: ch.last_message_at,
            created_at: ch.created_at,
        }
    }
}

const fn default_kind() -> ChannelKind {
    ChannelKind::Text
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateChannelRequest {
    pub guild_id: Uuid,
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: ChannelKind,
    #[validate(length(max = 1024, message = "Topic must be at most 1024 characters"))]
    pub topic: Option<String>,
    #[serde(default)]
    pub encrypted: bool,
    #[serde(default)]
    #[validate(range(min = 0, max = 21600, message = "Slowmode must be 0-21600 seconds"))]
    pub slowmode_seconds: i32,
}

fn validate_patch(patch: &ChannelPatch) -> Result<(), ChannelError> {
    if patch.is_empty() {
        return Err(ChannelError::Validation("No fields to update".into()));
    }
    if let Some(name) = &patch.name {
        let len = name.trim().chars().count();
        if len == 0 || len > 100 {
            return Err(ChannelError::Validation("Name must be 1-100 characters".into()));
        }
    }
    if patch.topic.as_ref().is_some_and(|t| t.chars().count() > 1024) {
        return Err(ChannelError::Validation(
            "Topic must be at most 1024 characters".into(),
        ));
    }
    if patch
        .slowmode_seconds
        .is_some_and(|s| !(0..=MAX_SLOWMODE_SECONDS).contains(&s))
    {
        return Err(ChannelError::Validation(
            "Slowmode must be 0-21600 seconds".into(),
        ));
    }
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a guild channel.
/// POST /api/channels
#[tracing::instrument(skip(state, body))]
pub async fn create(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(body): Json<CreateChannelRequest>,
) -> Result<(StatusCode, Json<ChannelResponse>), ChannelError> {
    body.validate()
        .map_err(|e| ChannelError::Validation(e.to_string()))?;

    if !matches!(
        body.kind,
        ChannelKind::Text | ChannelKind::Forum | ChannelKind::Gallery
    ) {
        return Err(ChannelError::Validation(
            "Only text, forum and gallery channels can be created here".into(),
        ));
    }

    if !has_guild_permission(
        &state.db,
        body.guild_id,
        auth_user.id,
        GuildPermissions::MANAGE_CHANNELS,
    )
    .await?
    {
        return Err(PermissionError::MissingPermission(GuildPermissions::MANAGE_CHANNELS).into());
    }

    let channel = db::create_channel(
        &state.db,
        &NewChannel {
            guild_id: Some(body.guild_id),
            parent_id: None,
            name: body.name.trim(),
            kind: body.kind,
            topic: body.topic.as_deref(),
            read_only: false,
            read_only_role_ids: &[],
            encrypted: body.encrypted,
            slowmode_seconds: body.slowmode_seconds,
        },
    )
    .await?;

    tracing::info!(channel_id = %channel.id, guild_id = %body.guild_id, "Channel created");

    Ok((StatusCode::CREATED, Json(channel.into())))
}

/// Get a channel.
/// GET /api/channels/{id}
pub async fn get(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ChannelResponse>, ChannelError> {
    let ctx = ChannelContext::load(&state.db, id, auth_user.id).await?;
    ctx.require_permission(GuildPermissions::VIEW_CHANNEL)?;

    let channel = db::find_channel_by_id(&state.db, id)
        .await?
        .ok_or(ChannelError::NotFound)?;

    Ok(Json(channel.into()))
}

/// Update channel settings.
/// PATCH /api/channels/{id}
#[tracing::instrument(skip(state, patch))]
pub async fn update(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(patch): Json<ChannelPatch>,
) -> Result<Json<ChannelResponse>, ChannelError> {
    validate_patch(&patch)?;

    let ctx = ChannelContext::load(&state.db, id, auth_user.id).await?;
    ctx.require_permission(GuildPermissions::MANAGE_CHANNELS)?;

    let channel = db::update_channel(&state.db, id, &patch)
        .await?
        .ok_or(ChannelError::NotFound)?;

    let response = ChannelResponse::from(channel);
    events::publish(
        &state.redis,
        id,
        ServerEvent::ChannelUpdate {
            channel_id: id,
            channel: serde_json::to_value(&response).unwrap_or_default(),
        },
    )
    .await;

    Ok(Json(response))
}

/// Delete a channel.
/// DELETE /api/channels/{id}
#[tracing::instrument(skip(state))]
pub async fn delete(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ChannelError> {
    let ctx = ChannelContext::load(&state.db, id, auth_user.id).await?;
    ctx.require_permission(GuildPermissions::MANAGE_CHANNELS)?;

    if !db::delete_channel(&state.db, id).await? {
        return Err(ChannelError::NotFound);
    }

    events::publish(&state.redis, id, ServerEvent::ChannelDelete { channel_id: id }).await;

    Ok(StatusCode::NO_CONTENT)
}

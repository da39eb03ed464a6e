//! Thread and Post Handlers
//!
//! Threads are child channels of a text channel. Forum and gallery channels
//! hold posts, which are threads that must carry a title; gallery posts must
//! also start with an attachment.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::channels::{ChannelError, ChannelResponse};
use super::messages::MessageResponse;
use super::send_policy::{can_bypass_read_only, PolicyViolation, SendRequest};
use crate::api::AppState;
use crate::auth::AuthUser;
use crate::db::{self, ChannelKind, NewChannel};
use crate::events::{self, ServerEvent};
use crate::permissions::{ChannelContext, GuildPermissions};

const MAX_TITLE_LENGTH: usize = 100;
const DEFAULT_THREAD_NAME: &str = "Thread";

#[derive(Debug, Deserialize, Validate)]
pub struct CreateThreadRequest {
    #[validate(length(min = 1, max = 100, message = "Title must be 1-100 characters"))]
    pub title: Option<String>,
    /// Opening message of the thread.
    #[validate(length(min = 1, message = "Content must not be empty"))]
    pub content: Option<String>,
    /// Whether the opening message carries uploaded attachments.
    #[serde(default)]
    pub has_attachments: bool,
}

#[derive(Debug, Serialize)]
pub struct ThreadResponse {
    pub thread: ChannelResponse,
    pub first_message: Option<MessageResponse>,
}

/// Check the request shape against the parent channel kind and pick the
/// thread name.
fn thread_name(parent: ChannelKind, body: &CreateThreadRequest) -> Result<String, ChannelError> {
    if !parent.accepts_threads() {
        return Err(ChannelError::InvalidParent);
    }

    let title = body
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty());

    if parent.requires_post_title() && title.is_none() {
        return Err(ChannelError::TitleRequired);
    }

    if parent == ChannelKind::Gallery && !body.has_attachments {
        return Err(ChannelError::AttachmentRequired);
    }

    let name = match title {
        Some(title) => title.to_string(),
        None => body
            .content
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(|c| c.chars().take(MAX_TITLE_LENGTH).collect())
            .unwrap_or_else(|| DEFAULT_THREAD_NAME.to_string()),
    };

    Ok(name)
}

/// A parent that no longer takes posts cannot take new threads either.
fn check_parent_open(ctx: &ChannelContext) -> Result<(), PolicyViolation> {
    if ctx.archived {
        return Err(PolicyViolation::ChannelArchived);
    }
    if ctx.locked {
        return Err(PolicyViolation::ChannelLocked);
    }
    if ctx.read_only && !can_bypass_read_only(ctx) {
        return Err(PolicyViolation::ChannelReadOnly);
    }
    Ok(())
}

/// Create a thread or post under a channel.
/// POST /api/channels/{id}/threads
#[tracing::instrument(skip(state, body))]
pub async fn create(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(parent_id): Path<Uuid>,
    Json(body): Json<CreateThreadRequest>,
) -> Result<(StatusCode, Json<ThreadResponse>), ChannelError> {
    body.validate()
        .map_err(|e| ChannelError::Validation(e.to_string()))?;

    let ctx = ChannelContext::load(&state.db, parent_id, auth_user.id).await?;
    ctx.require_permission(GuildPermissions::CREATE_THREADS)?;
    check_parent_open(&ctx)?;

    let parent = db::find_channel_by_id(&state.db, parent_id)
        .await?
        .ok_or(ChannelError::NotFound)?;

    let name = thread_name(parent.kind, &body)?;

    let content = body.content.as_deref().map(str::trim).filter(|c| !c.is_empty());
    if let Some(content) = content {
        if content.chars().count() > state.config.max_message_length {
            return Err(ChannelError::Validation(format!(
                "Content must be at most {} characters",
                state.config.max_message_length
            )));
        }
        // The opening message is a regular send into the parent's settings
        state
            .send_policy
            .check(
                &state.db,
                &ctx,
                SendRequest {
                    content,
                    encrypted: false,
                },
            )
            .await?;
    }

    let (thread, first_message) = db::create_thread(
        &state.db,
        &NewChannel {
            guild_id: parent.guild_id,
            parent_id: Some(parent.id),
            name: &name,
            kind: ChannelKind::Thread,
            topic: None,
            read_only: parent.read_only,
            read_only_role_ids: &parent.read_only_role_ids,
            encrypted: parent.encrypted,
            slowmode_seconds: parent.slowmode_seconds,
        },
        content.map(|c| (auth_user.id, c)),
    )
    .await?;

    tracing::info!(thread_id = %thread.id, %parent_id, "Thread created");

    let response = ThreadResponse {
        thread: thread.into(),
        first_message: first_message.map(Into::into),
    };

    events::publish(
        &state.redis,
        parent_id,
        ServerEvent::ThreadCreate {
            channel_id: parent_id,
            thread: serde_json::to_value(&response.thread).unwrap_or_default(),
        },
    )
    .await;

    Ok((StatusCode::CREATED, Json(response)))
}

//! Message send policy.
//!
//! Ordered checks run on a pre-loaded [`ChannelContext`] before a message is
//! inserted. The first failing check decides the rejection.

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};

use super::spam::DmSpamTracker;
use crate::permissions::{ChannelContext, GuildPermissions, PermissionStore};

// ============================================================================
// Error Types
// ============================================================================

/// Reason a message send was refused. Each variant has a stable wire code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyViolation {
    #[error("Missing SEND_MESSAGES permission")]
    MissingPermission,
    #[error("Channel is archived")]
    ChannelArchived,
    #[error("Channel is locked")]
    ChannelLocked,
    #[error("Channel is read-only")]
    ChannelReadOnly,
    #[error("This channel requires encrypted messages")]
    EncryptionRequired,
    #[error("This channel does not accept encrypted messages")]
    ChannelNotEncrypted,
    #[error("Slowmode is active, retry in {retry_after} seconds")]
    Slowmode { retry_after: u32 },
    #[error("You are timed out until {until}")]
    TimedOut { until: DateTime<Utc> },
    #[error("Too many identical direct messages")]
    DmSpamDetected,
}

impl PolicyViolation {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MissingPermission => "missing_permission",
            Self::ChannelArchived => "channel_archived",
            Self::ChannelLocked => "channel_locked",
            Self::ChannelReadOnly => "channel_read_only",
            Self::EncryptionRequired => "encryption_required",
            Self::ChannelNotEncrypted => "channel_not_encrypted",
            Self::Slowmode { .. } => "slowmode",
            Self::TimedOut { .. } => "timed_out",
            Self::DmSpamDetected => "dm_spam_detected",
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::EncryptionRequired | Self::ChannelNotEncrypted => StatusCode::BAD_REQUEST,
            Self::Slowmode { .. } | Self::DmSpamDetected => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::FORBIDDEN,
        }
    }
}

impl IntoResponse for PolicyViolation {
    fn into_response(self) -> Response {
        let mut body = serde_json::json!({
            "error": self.code(),
            "message": self.to_string(),
        });

        let retry_after = match &self {
            Self::Slowmode { retry_after } => {
                body["retry_after"] = (*retry_after).into();
                Some(*retry_after)
            }
            _ => None,
        };

        let mut response = (self.status(), Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

/// Failure while evaluating the policy.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error(transparent)]
    Violation(#[from] PolicyViolation),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

// ============================================================================
// Policy
// ============================================================================

/// The parts of an outgoing message the policy looks at.
#[derive(Debug, Clone, Copy)]
pub struct SendRequest<'a> {
    pub content: &'a str,
    pub encrypted: bool,
}

/// Decides whether a caller may post to a channel right now.
#[derive(Clone)]
pub struct SendPolicy {
    spam: Arc<DmSpamTracker>,
}

impl SendPolicy {
    #[must_use]
    pub const fn new(spam: Arc<DmSpamTracker>) -> Self {
        Self { spam }
    }

    /// Run every send check against `ctx`.
    ///
    /// Performs at most one store query (the caller's last message time, only
    /// when slowmode applies). Permissions are never re-fetched.
    #[tracing::instrument(skip_all, fields(channel_id = %ctx.channel_id, user_id = %ctx.user_id))]
    pub async fn check<S: PermissionStore>(
        &self,
        store: &S,
        ctx: &ChannelContext,
        request: SendRequest<'_>,
    ) -> Result<(), PolicyError> {
        let result = self.check_at(store, ctx, request, Utc::now()).await;
        if let Err(PolicyError::Violation(violation)) = &result {
            tracing::debug!(code = violation.code(), "Message send rejected");
        }
        result
    }

    async fn check_at<S: PermissionStore>(
        &self,
        store: &S,
        ctx: &ChannelContext,
        request: SendRequest<'_>,
        now: DateTime<Utc>,
    ) -> Result<(), PolicyError> {
        if !ctx.has_permission(GuildPermissions::SEND_MESSAGES) {
            return Err(PolicyViolation::MissingPermission.into());
        }

        if ctx.archived {
            return Err(PolicyViolation::ChannelArchived.into());
        }

        if ctx.locked {
            return Err(PolicyViolation::ChannelLocked.into());
        }

        if ctx.read_only && !can_bypass_read_only(ctx) {
            return Err(PolicyViolation::ChannelReadOnly.into());
        }

        match (ctx.encrypted, request.encrypted) {
            (true, false) => return Err(PolicyViolation::EncryptionRequired.into()),
            (false, true) => return Err(PolicyViolation::ChannelNotEncrypted.into()),
            _ => {}
        }

        if ctx.slowmode_seconds > 0 && !is_slowmode_exempt(ctx) {
            if let Some(last) = store.last_message_at(ctx.channel_id, ctx.user_id).await? {
                if let Some(retry_after) = slowmode_remaining(ctx.slowmode_seconds, last, now) {
                    return Err(PolicyViolation::Slowmode { retry_after }.into());
                }
            }
        }

        if let Some(until) = ctx.timeout_until {
            if until > now {
                return Err(PolicyViolation::TimedOut { until }.into());
            }
        }

        if ctx.is_dm()
            && self
                .spam
                .check_and_record(ctx.user_id, request.content, ctx.channel_id)
        {
            tracing::warn!(
                sender_id = %ctx.user_id,
                channel_id = %ctx.channel_id,
                "DM spam threshold reached"
            );
            return Err(PolicyViolation::DmSpamDetected.into());
        }

        Ok(())
    }

    /// Roll back what a successful [`check`](Self::check) recorded, for a
    /// send that failed before it was stored.
    pub fn release(&self, ctx: &ChannelContext, request: SendRequest<'_>) {
        if ctx.is_dm() {
            self.spam.forget(ctx.user_id, request.content, ctx.channel_id);
        }
    }
}

/// Owners, instance admins, administrators and holders of a listed role may
/// post in read-only channels.
pub(crate) fn can_bypass_read_only(ctx: &ChannelContext) -> bool {
    ctx.is_owner()
        || ctx.is_instance_admin()
        || ctx
            .computed_permissions
            .contains(GuildPermissions::ADMINISTRATOR)
        || ctx.holds_read_only_role()
}

fn is_slowmode_exempt(ctx: &ChannelContext) -> bool {
    ctx.has_permission(GuildPermissions::MANAGE_MESSAGES)
        || ctx.has_permission(GuildPermissions::MANAGE_CHANNELS)
}

/// Whole seconds left before the caller may post again, in
/// `1..=slowmode_seconds`, or `None` when the interval has elapsed.
fn slowmode_remaining(slowmode_seconds: i32, last: DateTime<Utc>, now: DateTime<Utc>) -> Option<u32> {
    let interval_ms = i64::from(slowmode_seconds) * 1000;
    let elapsed_ms = (now - last).num_milliseconds();
    let remaining_ms = interval_ms - elapsed_ms;
    if remaining_ms <= 0 {
        return None;
    }

    let secs = (remaining_ms + 999) / 1000;
    Some(secs.clamp(1, i64::from(slowmode_seconds)) as u32)
}

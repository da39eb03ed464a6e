//! Database Models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Channel kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "channel_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Text,
    Forum,
    Gallery,
    Thread,
    Dm,
    Group,
}

impl ChannelKind {
    /// Whether threads or posts may be created under this kind.
    #[must_use]
    pub const fn accepts_threads(self) -> bool {
        matches!(self, Self::Text | Self::Forum | Self::Gallery)
    }

    /// Forum and gallery posts must carry a title.
    #[must_use]
    pub const fn requires_post_title(self) -> bool {
        matches!(self, Self::Forum | Self::Gallery)
    }
}

/// Channel model.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Channel {
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
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for a new channel row.
#[derive(Debug, Clone)]
pub struct NewChannel<'a> {
    pub guild_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
    pub name: &'a str,
    pub kind: ChannelKind,
    pub topic: Option<&'a str>,
    pub read_only: bool,
    pub read_only_role_ids: &'a [Uuid],
    pub encrypted: bool,
    pub slowmode_seconds: i32,
}

/// Partial channel update. `None` leaves the column unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelPatch {
    pub name: Option<String>,
    pub topic: Option<String>,
    pub locked: Option<bool>,
    pub archived: Option<bool>,
    pub read_only: Option<bool>,
    pub read_only_role_ids: Option<Vec<Uuid>>,
    pub slowmode_seconds: Option<i32>,
    pub encrypted: Option<bool>,
}

impl ChannelPatch {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.topic.is_none()
            && self.locked.is_none()
            && self.archived.is_none()
            && self.read_only.is_none()
            && self.read_only_role_ids.is_none()
            && self.slowmode_seconds.is_none()
            && self.encrypted.is_none()
    }
}

/// Message model.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub encrypted: bool,
    pub nonce: Option<String>,
    pub reply_to: Option<Uuid>,
    pub edited_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Fields for a new message row.
#[derive(Debug, Clone, Copy)]
pub struct NewMessage<'a> {
    pub channel_id: Uuid,
    pub user_id: Uuid,
    pub content: &'a str,
    pub encrypted: bool,
    pub nonce: Option<&'a str>,
    pub reply_to: Option<Uuid>,
}

/// Aggregated reaction on a message.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ReactionCount {
    pub emoji: String,
    pub count: i64,
    /// Whether the requesting user is among the reactors.
    pub me: bool,
}

/// Pinned message entry.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ChannelPin {
    pub channel_id: Uuid,
    pub message_id: Uuid,
    pub pinned_by: Uuid,
    pub pinned_at: DateTime<Utc>,
}

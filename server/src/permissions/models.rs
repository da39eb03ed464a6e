//! Database models for the permission system.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use super::guild::{GuildPermissions, UserFlags};

/// Guild role with allow/deny bitfields.
///
/// Higher `position` means higher priority.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct GuildRole {
    pub id: Uuid,
    pub guild_id: Uuid,
    pub name: String,
    pub position: i32,
    #[sqlx(try_from = "i64")]
    pub allow: GuildPermissions,
    #[sqlx(try_from = "i64")]
    pub deny: GuildPermissions,
}

/// Everything the channel context needs from the first, joined fetch.
///
/// Guild columns are zeroed for DM/group channels; membership columns are
/// zeroed when the user is not a member.
#[derive(Debug, Clone, FromRow)]
pub struct ChannelSnapshot {
    pub channel_id: Uuid,
    pub guild_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
    pub locked: bool,
    pub archived: bool,
    pub read_only: bool,
    pub read_only_role_ids: Vec<Uuid>,
    pub encrypted: bool,
    pub slowmode_seconds: i32,
    pub guild_owner_id: Option<Uuid>,
    #[sqlx(try_from = "i64")]
    pub default_permissions: GuildPermissions,
    pub user_exists: bool,
    #[sqlx(try_from = "i64")]
    pub user_flags: UserFlags,
    pub is_member: bool,
    pub timeout_until: Option<DateTime<Utc>>,
    pub is_participant: bool,
}

/// Guild-anchored permission inputs for a user.
#[derive(Debug, Clone, FromRow)]
pub struct GuildSnapshot {
    pub guild_id: Uuid,
    pub owner_id: Uuid,
    #[sqlx(try_from = "i64")]
    pub default_permissions: GuildPermissions,
    #[sqlx(try_from = "i64")]
    pub user_flags: UserFlags,
    pub is_member: bool,
}

/// Minimal channel lookup used by the authorization gate.
#[derive(Debug, Clone, FromRow)]
pub struct ChannelAccess {
    pub guild_id: Option<Uuid>,
    pub is_participant: bool,
    #[sqlx(try_from = "i64")]
    pub user_flags: UserFlags,
}

impl From<i64> for UserFlags {
    fn from(value: i64) -> Self {
        Self::from_db(value)
    }
}

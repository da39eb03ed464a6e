//! Database queries for the permission system.
//!
//! Implements [`PermissionStore`] for `PgPool`. The channel snapshot is a
//! single joined query so the message hot path needs at most one more round
//! trip (roles) to authorize.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::models::{ChannelAccess, ChannelSnapshot, GuildRole, GuildSnapshot};
use super::store::PermissionStore;

impl PermissionStore for PgPool {
    async fn channel_snapshot(
        &self,
        channel_id: Uuid,
        user_id: Uuid,
    ) -> sqlx::Result<Option<ChannelSnapshot>> {
        sqlx::query_as::<_, ChannelSnapshot>(
            r"
            SELECT
                c.id AS channel_id,
                c.guild_id,
                c.parent_id,
                c.locked,
                c.archived,
                c.read_only,
                COALESCE(c.read_only_role_ids, '{}') AS read_only_role_ids,
                c.encrypted,
                c.slowmode_seconds,
                g.owner_id AS guild_owner_id,
                COALESCE(g.default_permissions, 0) AS default_permissions,
                (u.id IS NOT NULL) AS user_exists,
                COALESCE(u.flags, 0) AS user_flags,
                (gm.user_id IS NOT NULL) AS is_member,
                gm.timeout_until,
                EXISTS(
                    SELECT 1 FROM channel_members cm
                    WHERE cm.channel_id = c.id AND cm.user_id = $2
                ) AS is_participant
            FROM channels c
            LEFT JOIN guilds g ON g.id = c.guild_id
            LEFT JOIN users u ON u.id = $2
            LEFT JOIN guild_members gm ON gm.guild_id = c.guild_id AND gm.user_id = $2
            WHERE c.id = $1
            ",
        )
        .bind(channel_id)
        .bind(user_id)
        .fetch_optional(self)
        .await
    }

    async fn member_roles(&self, guild_id: Uuid, user_id: Uuid) -> sqlx::Result<Vec<GuildRole>> {
        sqlx::query_as::<_, GuildRole>(
            r"
            SELECT r.id, r.guild_id, r.name, r.position,
                   r.allow_permissions AS allow,
                   r.deny_permissions AS deny
            FROM guild_roles r
            INNER JOIN guild_member_roles gmr ON gmr.role_id = r.id
            WHERE gmr.guild_id = $1
              AND gmr.user_id = $2
            ORDER BY r.position DESC
            ",
        )
        .bind(guild_id)
        .bind(user_id)
        .fetch_all(self)
        .await
    }

    async fn guild_snapshot(
        &self,
        guild_id: Uuid,
        user_id: Uuid,
    ) -> sqlx::Result<Option<GuildSnapshot>> {
        sqlx::query_as::<_, GuildSnapshot>(
            r"
            SELECT
                g.id AS guild_id,
                g.owner_id,
                g.default_permissions,
                COALESCE(u.flags, 0) AS user_flags,
                EXISTS(
                    SELECT 1 FROM guild_members gm
                    WHERE gm.guild_id = g.id AND gm.user_id = $2
                ) AS is_member
            FROM guilds g
            LEFT JOIN users u ON u.id = $2
            WHERE g.id = $1
            ",
        )
        .bind(guild_id)
        .bind(user_id)
        .fetch_optional(self)
        .await
    }

    async fn channel_access(
        &self,
        channel_id: Uuid,
        user_id: Uuid,
    ) -> sqlx::Result<Option<ChannelAccess>> {
        sqlx::query_as::<_, ChannelAccess>(
            r"
            SELECT
                c.guild_id,
                EXISTS(
                    SELECT 1 FROM channel_members cm
                    WHERE cm.channel_id = c.id AND cm.user_id = $2
                ) AS is_participant,
                COALESCE(u.flags, 0) AS user_flags
            FROM channels c
            LEFT JOIN users u ON u.id = $2
            WHERE c.id = $1
            ",
        )
        .bind(channel_id)
        .bind(user_id)
        .fetch_optional(self)
        .await
    }

    async fn last_message_at(
        &self,
        channel_id: Uuid,
        user_id: Uuid,
    ) -> sqlx::Result<Option<DateTime<Utc>>> {
        // Deleted messages still count so deleting cannot skip slowmode
        sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            r"
            SELECT MAX(created_at)
            FROM messages
            WHERE channel_id = $1
              AND user_id = $2
            ",
        )
        .bind(channel_id)
        .bind(user_id)
        .fetch_one(self)
        .await
    }
}

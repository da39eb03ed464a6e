//! Per-request channel context.
//!
//! Loads a channel's moderation state together with the requesting user's
//! resolved permissions in at most two store fetches: one joined snapshot and,
//! for ordinary guild members only, one ordered role fetch.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::guild::{GuildPermissions, UserFlags};
use super::resolver::{merge_roles, PermissionError};
use super::store::PermissionStore;

/// Moderation state of a channel plus the caller's view of it.
///
/// Built fresh for every request and never cached.
#[derive(Debug, Clone)]
pub struct ChannelContext {
    pub channel_id: Uuid,
    /// `None` for DM and group channels.
    pub guild_id: Option<Uuid>,
    /// Parent channel for threads, forum posts and gallery posts.
    pub parent_id: Option<Uuid>,
    pub locked: bool,
    pub archived: bool,
    pub read_only: bool,
    /// Roles allowed to post while the channel is read-only.
    pub read_only_role_ids: Vec<Uuid>,
    pub encrypted: bool,
    pub slowmode_seconds: i32,

    pub guild_owner_id: Option<Uuid>,
    pub default_permissions: GuildPermissions,

    pub user_id: Uuid,
    pub user_flags: UserFlags,
    /// Communication is suspended until this instant.
    pub timeout_until: Option<DateTime<Utc>>,
    /// Role IDs held in the channel's guild. Empty when roles were not needed.
    pub role_ids: Vec<Uuid>,

    /// Resolved permissions, or the all-bits sentinel.
    pub computed_permissions: GuildPermissions,
}

impl ChannelContext {
    /// Load the context for `user_id` acting on `channel_id`.
    ///
    /// Returns `PermissionError::NotFound` when the channel does not exist.
    /// Only the first fetch is fatal; a failed role fetch is logged and the
    /// member is resolved with no roles.
    #[tracing::instrument(skip(store))]
    pub async fn load<S: PermissionStore>(
        store: &S,
        channel_id: Uuid,
        user_id: Uuid,
    ) -> Result<Self, PermissionError> {
        let snapshot = store
            .channel_snapshot(channel_id, user_id)
            .await?
            .ok_or(PermissionError::NotFound)?;

        let mut ctx = Self {
            channel_id: snapshot.channel_id,
            guild_id: snapshot.guild_id,
            parent_id: snapshot.parent_id,
            locked: snapshot.locked,
            archived: snapshot.archived,
            read_only: snapshot.read_only,
            read_only_role_ids: snapshot.read_only_role_ids,
            encrypted: snapshot.encrypted,
            slowmode_seconds: snapshot.slowmode_seconds,
            guild_owner_id: snapshot.guild_owner_id,
            default_permissions: snapshot.default_permissions,
            user_id,
            user_flags: snapshot.user_flags,
            timeout_until: snapshot.timeout_until,
            role_ids: Vec::new(),
            computed_permissions: GuildPermissions::empty(),
        };

        if !snapshot.user_exists {
            return Ok(ctx);
        }

        if ctx.is_owner() || ctx.is_instance_admin() {
            ctx.computed_permissions = GuildPermissions::ALL_BITS;
            return Ok(ctx);
        }

        let Some(guild_id) = ctx.guild_id else {
            // DMs have no granular model: participants may do everything
            if snapshot.is_participant {
                ctx.computed_permissions = GuildPermissions::ALL_BITS;
            }
            return Ok(ctx);
        };

        if !snapshot.is_member {
            return Ok(ctx);
        }

        let roles = match store.member_roles(guild_id, user_id).await {
            Ok(roles) => roles,
            Err(e) => {
                tracing::warn!(
                    %guild_id,
                    %user_id,
                    error = %e,
                    "Role fetch failed, resolving with default permissions only"
                );
                Vec::new()
            }
        };

        ctx.role_ids = roles.iter().map(|r| r.id).collect();
        ctx.computed_permissions = merge_roles(ctx.default_permissions, &roles);

        Ok(ctx)
    }

    /// Check if the caller has the specified permission.
    #[must_use]
    pub const fn has_permission(&self, permission: GuildPermissions) -> bool {
        self.computed_permissions.has(permission)
    }

    /// Require that the caller has the specified permission.
    pub const fn require_permission(
        &self,
        permission: GuildPermissions,
    ) -> Result<(), PermissionError> {
        if self.has_permission(permission) {
            Ok(())
        } else {
            Err(PermissionError::MissingPermission(permission))
        }
    }

    /// Whether the channel is a DM or group conversation.
    #[must_use]
    pub const fn is_dm(&self) -> bool {
        self.guild_id.is_none()
    }

    /// Whether the caller owns the channel's guild.
    #[must_use]
    pub fn is_owner(&self) -> bool {
        self.guild_owner_id == Some(self.user_id)
    }

    /// Whether the caller is an instance administrator.
    #[must_use]
    pub const fn is_instance_admin(&self) -> bool {
        self.user_flags.is_admin()
    }

    /// Whether the caller holds one of the roles allowed to post in a
    /// read-only channel.
    #[must_use]
    pub fn holds_read_only_role(&self) -> bool {
        self.guild_id.is_some()
            && self
                .role_ids
                .iter()
                .any(|id| self.read_only_role_ids.contains(id))
    }
}

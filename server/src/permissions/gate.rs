//! Boolean permission checks for low-frequency endpoints.
//!
//! These resolve permissions without the pre-batched channel snapshot. The
//! message hot path uses [`ChannelContext`](super::ChannelContext) instead.

use uuid::Uuid;

use super::guild::GuildPermissions;
use super::resolver::{resolve_permissions, PermissionError};
use super::store::PermissionStore;

/// Compute a user's permissions in a guild.
///
/// A missing guild or a non-member resolves to no permissions. A failed
/// role fetch is logged and the member keeps the guild defaults.
#[tracing::instrument(skip(store))]
pub async fn compute_guild_permissions<S: PermissionStore>(
    store: &S,
    guild_id: Uuid,
    user_id: Uuid,
) -> Result<GuildPermissions, PermissionError> {
    let Some(guild) = store.guild_snapshot(guild_id, user_id).await? else {
        return Ok(GuildPermissions::empty());
    };

    if guild.owner_id == user_id || guild.user_flags.is_admin() {
        return Ok(GuildPermissions::ALL_BITS);
    }

    if !guild.is_member {
        return Ok(GuildPermissions::empty());
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

    Ok(resolve_permissions(
        user_id,
        guild.owner_id,
        guild.user_flags,
        guild.default_permissions,
        &roles,
    ))
}

/// Does `user_id` hold `permission` in the guild?
///
/// Denial is `Ok(false)`, never an error.
pub async fn has_guild_permission<S: PermissionStore>(
    store: &S,
    guild_id: Uuid,
    user_id: Uuid,
    permission: GuildPermissions,
) -> Result<bool, PermissionError> {
    let perms = compute_guild_permissions(store, guild_id, user_id).await?;
    Ok(perms.has(permission))
}

/// Does `user_id` hold `permission` on the channel?
///
/// DM and group participants are authorized for everything. Returns
/// `Err(PermissionError::NotFound)` when the channel does not exist.
#[tracing::instrument(skip(store))]
pub async fn has_channel_permission<S: PermissionStore>(
    store: &S,
    channel_id: Uuid,
    user_id: Uuid,
    permission: GuildPermissions,
) -> Result<bool, PermissionError> {
    let access = store
        .channel_access(channel_id, user_id)
        .await?
        .ok_or(PermissionError::NotFound)?;

    match access.guild_id {
        Some(guild_id) => has_guild_permission(store, guild_id, user_id, permission).await,
        None => Ok(access.is_participant || access.user_flags.is_admin()),
    }
}

/// Like [`has_channel_permission`], but a denial becomes
/// `PermissionError::MissingPermission`.
pub async fn require_channel_permission<S: PermissionStore>(
    store: &S,
    channel_id: Uuid,
    user_id: Uuid,
    permission: GuildPermissions,
) -> Result<(), PermissionError> {
    if has_channel_permission(store, channel_id, user_id, permission).await? {
        Ok(())
    } else {
        Err(PermissionError::MissingPermission(permission))
    }
}

//! Storage seam for permission resolution.
//!
//! [`PermissionStore`] lists the lookups the resolver, channel context and
//! authorization gate perform. `PgPool` implements it in `queries.rs`; tests
//! use the in-memory [`memory::MemoryStore`].

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::models::{ChannelAccess, ChannelSnapshot, GuildRole, GuildSnapshot};

/// Read-side storage used to authorize a request.
///
/// `Ok(None)` always means "does not exist"; `Err` means the store could not
/// answer.
pub trait PermissionStore: Sync {
    /// Channel flags, guild ownership, user flags, membership and DM
    /// participation for `(channel_id, user_id)` in one fetch.
    fn channel_snapshot(
        &self,
        channel_id: Uuid,
        user_id: Uuid,
    ) -> impl Future<Output = sqlx::Result<Option<ChannelSnapshot>>> + Send;

    /// Roles held by a member, ordered by position descending.
    fn member_roles(
        &self,
        guild_id: Uuid,
        user_id: Uuid,
    ) -> impl Future<Output = sqlx::Result<Vec<GuildRole>>> + Send;

    /// Guild ownership, default permissions and the user's relationship to it.
    fn guild_snapshot(
        &self,
        guild_id: Uuid,
        user_id: Uuid,
    ) -> impl Future<Output = sqlx::Result<Option<GuildSnapshot>>> + Send;

    /// Which guild a channel belongs to, and whether the user participates in it.
    fn channel_access(
        &self,
        channel_id: Uuid,
        user_id: Uuid,
    ) -> impl Future<Output = sqlx::Result<Option<ChannelAccess>>> + Send;

    /// Creation time of the user's most recent message in the channel.
    fn last_message_at(
        &self,
        channel_id: Uuid,
        user_id: Uuid,
    ) -> impl Future<Output = sqlx::Result<Option<DateTime<Utc>>>> + Send;
}

//! Permission system types and utilities.
//!
//! Guild permissions are a 64-bit allow/deny model resolved per request:
//! - [`ChannelContext`]: batched snapshot for the message hot path
//! - [`gate`]: boolean checks for everything else

pub mod context;
pub mod gate;
pub mod guild;
pub mod models;
pub mod queries;
pub mod resolver;
pub mod store;

pub use context::ChannelContext;
pub use gate::{
    compute_guild_permissions, has_channel_permission, has_guild_permission,
    require_channel_permission,
};
pub use guild::{GuildPermissions, UserFlags};
pub use models::*;
pub use resolver::{merge_roles, resolve_permissions, PermissionError};
pub use store::PermissionStore;

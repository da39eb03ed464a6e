//! Permission resolution logic.
//!
//! Computes effective permissions for a user in a guild from the owner and
//! instance-admin shortcuts plus ordered role allow/deny merging.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;

use super::guild::{GuildPermissions, UserFlags};
use super::models::GuildRole;

/// Compute guild permissions for a user.
///
/// Resolution order:
/// 1. Guild owner has all permissions
/// 2. Instance admins have all permissions
/// 3. Start with the guild's default permissions
/// 4. Fold each role's allow then deny, highest position first
/// 5. `ADMINISTRATOR` in the result expands to all permissions
pub fn resolve_permissions(
    user_id: Uuid,
    guild_owner_id: Uuid,
    user_flags: UserFlags,
    default_permissions: GuildPermissions,
    user_roles: &[GuildRole],
) -> GuildPermissions {
    // Owners cannot be locked out
    if guild_owner_id == user_id {
        return GuildPermissions::ALL_BITS;
    }

    if user_flags.is_admin() {
        return GuildPermissions::ALL_BITS;
    }

    merge_roles(default_permissions, user_roles)
}

/// Apply role allow/deny bitfields on top of a baseline.
///
/// Roles are processed by position descending, so for a bit touched by more
/// than one role the lowest-positioned role is processed last and wins.
/// Ties keep input order.
pub fn merge_roles(baseline: GuildPermissions, user_roles: &[GuildRole]) -> GuildPermissions {
    let mut sorted_roles: Vec<_> = user_roles.iter().collect();
    sorted_roles.sort_by(|a, b| b.position.cmp(&a.position));

    let mut perms = baseline;
    for role in sorted_roles {
        perms = (perms | role.allow) & !role.deny;
    }

    if perms.contains(GuildPermissions::ADMINISTRATOR) {
        return GuildPermissions::ALL_BITS;
    }

    perms
}

/// Permission check errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PermissionError {
    /// User lacks required permission.
    #[error("Missing permission: {0:?}")]
    MissingPermission(GuildPermissions),

    /// Database error occurred.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Channel not found.
    #[error("Channel not found")]
    NotFound,
}

impl From<sqlx::Error> for PermissionError {
    fn from(err: sqlx::Error) -> Self {
        Self::DatabaseError(err.to_string())
    }
}

impl IntoResponse for PermissionError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            Self::MissingPermission(_) => (
                StatusCode::FORBIDDEN,
                "missing_permission",
                "Missing required permission",
            ),
            Self::NotFound => (StatusCode::NOT_FOUND, "not_found", "Channel not found"),
            Self::DatabaseError(err) => {
                tracing::error!("Permission lookup failed: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error",
                )
            }
        };
        (
            status,
            Json(serde_json::json!({ "error": code, "message": message })),
        )
            .into_response()
    }
}

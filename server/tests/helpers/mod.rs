//! Reusable test helpers for HTTP integration tests.
//!
//! Provides `TestApp` for sending requests through the full axum router, plus
//! fixtures for users, guilds, roles, channels and messages.
//!
//! Every `TestApp` owns a fresh pool and Redis client so connections never
//! outlive the `#[tokio::test]` runtime that created them. Migrations run on
//! each pool; sqlx serializes them with an advisory lock.
//!
//! ## Cleanup Guards
//!
//! Use [`CleanupGuard`] for RAII-based cleanup that runs even if a test panics.
#![allow(dead_code)]

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{self, Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use parley_server::api::{create_router, AppState};
use parley_server::auth::jwt;
use parley_server::config::Config;
use parley_server::db;
use parley_server::permissions::{GuildPermissions, UserFlags};
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;

// ============================================================================
// Cleanup Guard
// ============================================================================

/// Async cleanup action type.
type CleanupAction = Box<dyn FnOnce(PgPool) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

/// RAII guard that runs cleanup actions on drop, even if the test panics.
pub struct CleanupGuard {
    pool: PgPool,
    actions: Vec<CleanupAction>,
}

impl CleanupGuard {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            actions: Vec::new(),
        }
    }

    /// Register a generic async cleanup action.
    pub fn add<F, Fut>(&mut self, action: F)
    where
        F: FnOnce(PgPool) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.actions
            .push(Box::new(move |pool| Box::pin(action(pool))));
    }

    /// Delete a user. Owned guilds, their channels and all messages cascade.
    pub fn delete_user(&mut self, user_id: Uuid) {
        self.add(move |pool| async move {
            let _ = sqlx::query("DELETE FROM users WHERE id = $1")
                .bind(user_id)
                .execute(&pool)
                .await;
        });
    }

    /// Delete a channel that no guild owns (DMs and groups).
    pub fn delete_channel(&mut self, channel_id: Uuid) {
        self.add(move |pool| async move {
            let _ = sqlx::query("DELETE FROM channels WHERE id = $1")
                .bind(channel_id)
                .execute(&pool)
                .await;
        });
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        let actions = std::mem::take(&mut self.actions);
        if actions.is_empty() {
            return;
        }

        let pool = self.pool.clone();
        let handle = tokio::runtime::Handle::current();

        std::thread::spawn(move || {
            handle.block_on(async move {
                for action in actions {
                    action(pool.clone()).await;
                }
            });
        })
        .join()
        .expect("Cleanup thread panicked");
    }
}

// ============================================================================
// Test App
// ============================================================================

/// A test application wrapping the full axum router.
pub struct TestApp {
    pub router: Router,
    pub pool: PgPool,
    pub config: Arc<Config>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(Config::default_for_test()).await
    }

    /// Create a test app with a custom config (for limit testing).
    pub async fn with_config(config: Config) -> Self {
        let pool = db::create_pool(&config.database_url)
            .await
            .expect("Failed to connect to test DB");
        db::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let redis = db::create_redis_client(&config.redis_url)
            .await
            .expect("Failed to connect to test Redis");

        let state = AppState::new(pool.clone(), redis, config.clone());
        let router = create_router(state);

        Self {
            router,
            pool,
            config: Arc::new(config),
        }
    }

    /// Build an HTTP request with the given method and URI.
    pub fn request(method: Method, uri: &str) -> http::request::Builder {
        Request::builder().method(method).uri(uri)
    }

    /// Send a request through the router via `tower::ServiceExt::oneshot`.
    pub async fn oneshot(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot request failed")
    }

    /// Send an authenticated JSON request.
    pub async fn send_json(
        &self,
        method: Method,
        uri: &str,
        token: &str,
        body: &serde_json::Value,
    ) -> Response<Body> {
        let req = Self::request(method, uri)
            .header("Authorization", format!("Bearer {token}"))
            .header("Content-Type", "application/json")
            .body(Body::from(serde_json::to_string(body).unwrap()))
            .unwrap();
        self.oneshot(req).await
    }

    /// Send an authenticated request without a body.
    pub async fn send(&self, method: Method, uri: &str, token: &str) -> Response<Body> {
        let req = Self::request(method, uri)
            .header("Authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        self.oneshot(req).await
    }

    pub fn cleanup_guard(&self) -> CleanupGuard {
        CleanupGuard::new(self.pool.clone())
    }
}

// ============================================================================
// User & Auth helpers
// ============================================================================

/// Create a test user and return `(user_id, username)`.
pub async fn create_test_user(pool: &PgPool) -> (Uuid, String) {
    let test_id = Uuid::new_v4().to_string()[..8].to_string();
    let username = format!("httptest_{test_id}");

    let (user_id,): (Uuid,) =
        sqlx::query_as("INSERT INTO users (username) VALUES ($1) RETURNING id")
            .bind(&username)
            .fetch_one(pool)
            .await
            .expect("Failed to create test user");

    (user_id, username)
}

/// Mark a user as an instance administrator.
pub async fn make_admin(pool: &PgPool, user_id: Uuid) {
    sqlx::query("UPDATE users SET flags = flags | $2 WHERE id = $1")
        .bind(user_id)
        .bind(UserFlags::ADMIN.bits() as i64)
        .execute(pool)
        .await
        .expect("Failed to grant admin");
}

/// Generate an access token for the given user.
pub fn generate_access_token(config: &Config, user_id: Uuid) -> String {
    jwt::generate_access_token(user_id, &config.jwt_secret, 900)
        .expect("Failed to generate access token")
}

/// Collect a response body and parse it as JSON.
pub async fn body_to_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to collect response body")
        .to_bytes();
    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        let preview = String::from_utf8_lossy(&bytes);
        panic!("Failed to parse response as JSON: {e}\nBody: {preview}")
    })
}

// ============================================================================
// Data helpers (guilds, roles, channels, messages)
// ============================================================================

/// Create a guild owned by `owner_id` with the given default permissions.
pub async fn create_guild(pool: &PgPool, owner_id: Uuid, defaults: GuildPermissions) -> Uuid {
    let (guild_id,): (Uuid,) = sqlx::query_as(
        "INSERT INTO guilds (name, owner_id, default_permissions) VALUES ('TestGuild', $1, $2) RETURNING id",
    )
    .bind(owner_id)
    .bind(defaults.to_db())
    .fetch_one(pool)
    .await
    .expect("Failed to create guild");

    add_guild_member(pool, guild_id, owner_id).await;
    guild_id
}

/// Add a user as a guild member.
pub async fn add_guild_member(pool: &PgPool, guild_id: Uuid, user_id: Uuid) {
    sqlx::query("INSERT INTO guild_members (guild_id, user_id) VALUES ($1, $2)")
        .bind(guild_id)
        .bind(user_id)
        .execute(pool)
        .await
        .expect("Failed to add guild member");
}

/// Time a member out until `minutes` from now.
pub async fn time_out_member(pool: &PgPool, guild_id: Uuid, user_id: Uuid, minutes: i32) {
    sqlx::query(
        "UPDATE guild_members SET timeout_until = NOW() + make_interval(mins => $3) WHERE guild_id = $1 AND user_id = $2",
    )
    .bind(guild_id)
    .bind(user_id)
    .bind(minutes)
    .execute(pool)
    .await
    .expect("Failed to time out member");
}

/// Create a role and return its ID.
pub async fn create_role(
    pool: &PgPool,
    guild_id: Uuid,
    position: i32,
    allow: GuildPermissions,
    deny: GuildPermissions,
) -> Uuid {
    let (role_id,): (Uuid,) = sqlx::query_as(
        r"
        INSERT INTO guild_roles (guild_id, name, position, allow_permissions, deny_permissions)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        ",
    )
    .bind(guild_id)
    .bind(format!("role-{position}"))
    .bind(position)
    .bind(allow.to_db())
    .bind(deny.to_db())
    .fetch_one(pool)
    .await
    .expect("Failed to create role");
    role_id
}

/// Give a member a role.
pub async fn assign_role(pool: &PgPool, guild_id: Uuid, user_id: Uuid, role_id: Uuid) {
    sqlx::query("INSERT INTO guild_member_roles (guild_id, user_id, role_id) VALUES ($1, $2, $3)")
        .bind(guild_id)
        .bind(user_id)
        .bind(role_id)
        .execute(pool)
        .await
        .expect("Failed to assign role");
}

/// Create a text channel in a guild and return its ID.
pub async fn create_channel(pool: &PgPool, guild_id: Uuid, name: &str) -> Uuid {
    create_channel_of_kind(pool, guild_id, name, "text").await
}

/// Create a guild channel of the given kind (`text`, `forum`, `gallery`).
pub async fn create_channel_of_kind(pool: &PgPool, guild_id: Uuid, name: &str, kind: &str) -> Uuid {
    let (channel_id,): (Uuid,) = sqlx::query_as(
        "INSERT INTO channels (guild_id, name, kind) VALUES ($1, $2, $3::channel_kind) RETURNING id",
    )
    .bind(guild_id)
    .bind(name)
    .bind(kind)
    .fetch_one(pool)
    .await
    .expect("Failed to create channel");
    channel_id
}

/// Run a raw `UPDATE channels SET <assignments> WHERE id = $1`.
pub async fn set_channel(pool: &PgPool, channel_id: Uuid, assignments: &str) {
    sqlx::query(&format!("UPDATE channels SET {assignments} WHERE id = $1"))
        .bind(channel_id)
        .execute(pool)
        .await
        .expect("Failed to update channel");
}

/// Allow a role to post while the channel is read-only.
pub async fn make_read_only(pool: &PgPool, channel_id: Uuid, allowed_roles: &[Uuid]) {
    sqlx::query("UPDATE channels SET read_only = TRUE, read_only_role_ids = $2 WHERE id = $1")
        .bind(channel_id)
        .bind(allowed_roles)
        .execute(pool)
        .await
        .expect("Failed to make channel read-only");
}

/// Create a DM channel between two users and return the channel ID.
pub async fn create_dm_channel(pool: &PgPool, user_a: Uuid, user_b: Uuid) -> Uuid {
    let (channel_id,): (Uuid,) =
        sqlx::query_as("INSERT INTO channels (name, kind) VALUES ('DM', 'dm') RETURNING id")
            .fetch_one(pool)
            .await
            .expect("Failed to create DM channel");

    sqlx::query("INSERT INTO channel_members (channel_id, user_id) VALUES ($1, $2), ($1, $3)")
        .bind(channel_id)
        .bind(user_a)
        .bind(user_b)
        .execute(pool)
        .await
        .expect("Failed to add DM participants");

    channel_id
}

/// Insert a message and return its ID.
pub async fn insert_message(pool: &PgPool, channel_id: Uuid, user_id: Uuid, content: &str) -> Uuid {
    let (msg_id,): (Uuid,) = sqlx::query_as(
        "INSERT INTO messages (channel_id, user_id, content) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(channel_id)
    .bind(user_id)
    .bind(content)
    .fetch_one(pool)
    .await
    .expect("Failed to insert message");
    msg_id
}

/// Pin a message directly, bypassing the API.
pub async fn insert_pin(pool: &PgPool, channel_id: Uuid, message_id: Uuid, pinned_by: Uuid) {
    sqlx::query("INSERT INTO channel_pins (channel_id, message_id, pinned_by) VALUES ($1, $2, $3)")
        .bind(channel_id)
        .bind(message_id)
        .bind(pinned_by)
        .execute(pool)
        .await
        .expect("Failed to insert pin");
}

/// Number of live messages in a channel.
pub async fn count_messages(pool: &PgPool, channel_id: Uuid) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE channel_id = $1 AND deleted_at IS NULL")
        .bind(channel_id)
        .fetch_one(pool)
        .await
        .expect("Failed to count messages")
}

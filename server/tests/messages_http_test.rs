//! HTTP Integration Tests for Message Sending
//!
//! Drives `POST /api/channels/{id}/messages` through the full router against
//! a real database: the send checks, mention and reply checks, the
//! transactional insert and the DM spam tracker.
//!
//! Run with: `cargo test --test messages_http_test -- --nocapture`

mod helpers;

use axum::http::{header, Method};
use helpers::{body_to_json, create_test_user, generate_access_token, TestApp};
use parley_server::permissions::GuildPermissions;
use serial_test::serial;
use uuid::Uuid;

fn messages_uri(channel_id: Uuid) -> String {
    format!("/api/channels/{channel_id}/messages")
}

/// Guild owned by a fresh user with one plain member and a text channel.
/// Returns `(owner_id, member_id, guild_id, channel_id)`.
async fn guild_with_member(app: &TestApp) -> (Uuid, Uuid, Uuid, Uuid) {
    let (owner_id, _) = create_test_user(&app.pool).await;
    let (member_id, _) = create_test_user(&app.pool).await;
    let guild_id =
        helpers::create_guild(&app.pool, owner_id, GuildPermissions::EVERYONE_DEFAULT).await;
    helpers::add_guild_member(&app.pool, guild_id, member_id).await;
    let channel_id = helpers::create_channel(&app.pool, guild_id, "general").await;
    (owner_id, member_id, guild_id, channel_id)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_send_stores_message_and_bumps_activity() {
    let app = TestApp::new().await;
    let (owner_id, member_id, _, channel_id) = guild_with_member(&app).await;

    let mut guard = app.cleanup_guard();
    guard.delete_user(member_id);
    guard.delete_user(owner_id);

    let token = generate_access_token(&app.config, member_id);
    let body = serde_json::json!({ "content": "hello there" });
    let resp = app
        .send_json(Method::POST, &messages_uri(channel_id), &token, &body)
        .await;
    assert_eq!(resp.status(), 201);

    let json = body_to_json(resp).await;
    assert_eq!(json["content"], "hello there");
    assert_eq!(json["user_id"], member_id.to_string());
    assert_eq!(json["channel_id"], channel_id.to_string());
    let message_id: Uuid = json["id"].as_str().unwrap().parse().unwrap();

    // Insert and activity bump commit together
    let bumped: bool = sqlx::query_scalar(
        "SELECT last_message_at = (SELECT created_at FROM messages WHERE id = $2) FROM channels WHERE id = $1",
    )
    .bind(channel_id)
    .bind(message_id)
    .fetch_one(&app.pool)
    .await
    .unwrap();
    assert!(bumped, "last_message_at should match the new message");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_send_refused_without_send_messages() {
    let app = TestApp::new().await;
    let (owner_id, member_id, guild_id, channel_id) = guild_with_member(&app).await;
    let muted = helpers::create_role(
        &app.pool,
        guild_id,
        1,
        GuildPermissions::empty(),
        GuildPermissions::SEND_MESSAGES,
    )
    .await;
    helpers::assign_role(&app.pool, guild_id, member_id, muted).await;

    let mut guard = app.cleanup_guard();
    guard.delete_user(member_id);
    guard.delete_user(owner_id);

    let token = generate_access_token(&app.config, member_id);
    let body = serde_json::json!({ "content": "hello" });
    let resp = app
        .send_json(Method::POST, &messages_uri(channel_id), &token, &body)
        .await;
    assert_eq!(resp.status(), 403);
    assert_eq!(body_to_json(resp).await["error"], "missing_permission");
    assert_eq!(helpers::count_messages(&app.pool, channel_id).await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_locked_channel_refuses_everyone() {
    let app = TestApp::new().await;
    let (owner_id, member_id, _, channel_id) = guild_with_member(&app).await;
    helpers::set_channel(&app.pool, channel_id, "locked = TRUE").await;

    let mut guard = app.cleanup_guard();
    guard.delete_user(member_id);
    guard.delete_user(owner_id);

    let body = serde_json::json!({ "content": "hello" });
    for user_id in [member_id, owner_id] {
        let token = generate_access_token(&app.config, user_id);
        let resp = app
            .send_json(Method::POST, &messages_uri(channel_id), &token, &body)
            .await;
        assert_eq!(resp.status(), 403);
        assert_eq!(body_to_json(resp).await["error"], "channel_locked");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_read_only_channel_admits_listed_roles() {
    let app = TestApp::new().await;
    let (owner_id, member_id, guild_id, channel_id) = guild_with_member(&app).await;
    let (speaker_id, _) = create_test_user(&app.pool).await;
    helpers::add_guild_member(&app.pool, guild_id, speaker_id).await;

    let speakers = helpers::create_role(
        &app.pool,
        guild_id,
        1,
        GuildPermissions::empty(),
        GuildPermissions::empty(),
    )
    .await;
    helpers::assign_role(&app.pool, guild_id, speaker_id, speakers).await;
    helpers::make_read_only(&app.pool, channel_id, &[speakers]).await;

    let mut guard = app.cleanup_guard();
    guard.delete_user(speaker_id);
    guard.delete_user(member_id);
    guard.delete_user(owner_id);

    let body = serde_json::json!({ "content": "announcement" });

    let token = generate_access_token(&app.config, member_id);
    let resp = app
        .send_json(Method::POST, &messages_uri(channel_id), &token, &body)
        .await;
    assert_eq!(resp.status(), 403);
    assert_eq!(body_to_json(resp).await["error"], "channel_read_only");

    let token = generate_access_token(&app.config, speaker_id);
    let resp = app
        .send_json(Method::POST, &messages_uri(channel_id), &token, &body)
        .await;
    assert_eq!(resp.status(), 201, "Listed role should bypass read-only");

    let token = generate_access_token(&app.config, owner_id);
    let resp = app
        .send_json(Method::POST, &messages_uri(channel_id), &token, &body)
        .await;
    assert_eq!(resp.status(), 201, "Owner should bypass read-only");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_encryption_must_match_channel() {
    let app = TestApp::new().await;
    let (owner_id, member_id, guild_id, plain_id) = guild_with_member(&app).await;
    let secret_id = helpers::create_channel(&app.pool, guild_id, "secret").await;
    helpers::set_channel(&app.pool, secret_id, "encrypted = TRUE").await;

    let mut guard = app.cleanup_guard();
    guard.delete_user(member_id);
    guard.delete_user(owner_id);

    let token = generate_access_token(&app.config, member_id);
    let plaintext = serde_json::json!({ "content": "hello" });
    let ciphertext = serde_json::json!({ "content": "q8Zx", "encrypted": true, "nonce": "n1" });

    let resp = app
        .send_json(Method::POST, &messages_uri(secret_id), &token, &plaintext)
        .await;
    assert_eq!(resp.status(), 400);
    assert_eq!(body_to_json(resp).await["error"], "encryption_required");

    let resp = app
        .send_json(Method::POST, &messages_uri(plain_id), &token, &ciphertext)
        .await;
    assert_eq!(resp.status(), 400);
    assert_eq!(body_to_json(resp).await["error"], "channel_not_encrypted");

    let resp = app
        .send_json(Method::POST, &messages_uri(secret_id), &token, &ciphertext)
        .await;
    assert_eq!(resp.status(), 201);
    assert_eq!(body_to_json(resp).await["encrypted"], true);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_slowmode_sets_retry_after() {
    let app = TestApp::new().await;
    let (owner_id, member_id, _, channel_id) = guild_with_member(&app).await;
    helpers::set_channel(&app.pool, channel_id, "slowmode_seconds = 60").await;

    let mut guard = app.cleanup_guard();
    guard.delete_user(member_id);
    guard.delete_user(owner_id);

    let token = generate_access_token(&app.config, member_id);
    let body = serde_json::json!({ "content": "first" });
    let resp = app
        .send_json(Method::POST, &messages_uri(channel_id), &token, &body)
        .await;
    assert_eq!(resp.status(), 201);

    let body = serde_json::json!({ "content": "second" });
    let resp = app
        .send_json(Method::POST, &messages_uri(channel_id), &token, &body)
        .await;
    assert_eq!(resp.status(), 429);

    let retry_header: u64 = resp
        .headers()
        .get(header::RETRY_AFTER)
        .expect("Retry-After header missing")
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_header));

    let json = body_to_json(resp).await;
    assert_eq!(json["error"], "slowmode");
    assert_eq!(json["retry_after"], retry_header);

    // Channel managers are exempt
    let token = generate_access_token(&app.config, owner_id);
    for content in ["one", "two"] {
        let body = serde_json::json!({ "content": content });
        let resp = app
            .send_json(Method::POST, &messages_uri(channel_id), &token, &body)
            .await;
        assert_eq!(resp.status(), 201);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_timed_out_member_cannot_send() {
    let app = TestApp::new().await;
    let (owner_id, member_id, guild_id, channel_id) = guild_with_member(&app).await;
    helpers::time_out_member(&app.pool, guild_id, member_id, 10).await;

    let mut guard = app.cleanup_guard();
    guard.delete_user(member_id);
    guard.delete_user(owner_id);

    let token = generate_access_token(&app.config, member_id);
    let body = serde_json::json!({ "content": "let me talk" });
    let resp = app
        .send_json(Method::POST, &messages_uri(channel_id), &token, &body)
        .await;
    assert_eq!(resp.status(), 403);
    assert_eq!(body_to_json(resp).await["error"], "timed_out");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_mention_everyone_checked_before_insert() {
    let app = TestApp::new().await;
    let (owner_id, member_id, _, channel_id) = guild_with_member(&app).await;

    let mut guard = app.cleanup_guard();
    guard.delete_user(member_id);
    guard.delete_user(owner_id);

    let token = generate_access_token(&app.config, member_id);
    let body = serde_json::json!({ "content": "@everyone free pizza" });
    let resp = app
        .send_json(Method::POST, &messages_uri(channel_id), &token, &body)
        .await;
    assert_eq!(resp.status(), 403);
    assert_eq!(body_to_json(resp).await["error"], "mention_everyone_forbidden");
    assert_eq!(helpers::count_messages(&app.pool, channel_id).await, 0);

    let token = generate_access_token(&app.config, owner_id);
    let resp = app
        .send_json(Method::POST, &messages_uri(channel_id), &token, &body)
        .await;
    assert_eq!(resp.status(), 201);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_reply_must_target_same_channel() {
    let app = TestApp::new().await;
    let (owner_id, member_id, guild_id, channel_id) = guild_with_member(&app).await;
    let other_id = helpers::create_channel(&app.pool, guild_id, "other").await;
    let elsewhere = helpers::insert_message(&app.pool, other_id, owner_id, "elsewhere").await;
    let here = helpers::insert_message(&app.pool, channel_id, owner_id, "here").await;

    let mut guard = app.cleanup_guard();
    guard.delete_user(member_id);
    guard.delete_user(owner_id);

    let token = generate_access_token(&app.config, member_id);

    let body = serde_json::json!({ "content": "replying", "reply_to": elsewhere });
    let resp = app
        .send_json(Method::POST, &messages_uri(channel_id), &token, &body)
        .await;
    assert_eq!(resp.status(), 400);
    assert_eq!(body_to_json(resp).await["error"], "reply_not_found");

    let body = serde_json::json!({ "content": "replying", "reply_to": Uuid::new_v4() });
    let resp = app
        .send_json(Method::POST, &messages_uri(channel_id), &token, &body)
        .await;
    assert_eq!(resp.status(), 400);
    assert_eq!(helpers::count_messages(&app.pool, channel_id).await, 1);

    let body = serde_json::json!({ "content": "replying", "reply_to": here });
    let resp = app
        .send_json(Method::POST, &messages_uri(channel_id), &token, &body)
        .await;
    assert_eq!(resp.status(), 201);
    assert_eq!(body_to_json(resp).await["reply_to"], here.to_string());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_dm_spam_counts_only_stored_sends() {
    let app = TestApp::new().await;
    let (sender_id, _) = create_test_user(&app.pool).await;

    let mut guard = app.cleanup_guard();
    let mut dms = Vec::new();
    for _ in 0..5 {
        let (recipient_id, _) = create_test_user(&app.pool).await;
        let dm_id = helpers::create_dm_channel(&app.pool, sender_id, recipient_id).await;
        guard.delete_channel(dm_id);
        guard.delete_user(recipient_id);
        dms.push(dm_id);
    }
    guard.delete_user(sender_id);

    let token = generate_access_token(&app.config, sender_id);

    // Sends refused after the spam check never reach the tracker
    let broken = serde_json::json!({ "content": "Buy now!", "reply_to": Uuid::new_v4() });
    for dm_id in &dms[..4] {
        let resp = app
            .send_json(Method::POST, &messages_uri(*dm_id), &token, &broken)
            .await;
        assert_eq!(resp.status(), 400);
    }

    let body = serde_json::json!({ "content": "Buy now!" });
    let resp = app
        .send_json(Method::POST, &messages_uri(dms[4]), &token, &body)
        .await;
    assert_eq!(resp.status(), 201, "Failed sends must not count as recipients");

    for dm_id in &dms[..3] {
        let resp = app
            .send_json(Method::POST, &messages_uri(*dm_id), &token, &body)
            .await;
        assert_eq!(resp.status(), 201);
    }

    // Case and surrounding whitespace do not make content distinct
    let body = serde_json::json!({ "content": "  buy NOW!  " });
    let resp = app
        .send_json(Method::POST, &messages_uri(dms[3]), &token, &body)
        .await;
    assert_eq!(resp.status(), 429);
    assert_eq!(body_to_json(resp).await["error"], "dm_spam_detected");
    assert_eq!(helpers::count_messages(&app.pool, dms[3]).await, 0);

    // Repeating to an already counted recipient stays allowed
    let resp = app
        .send_json(Method::POST, &messages_uri(dms[0]), &token, &body)
        .await;
    assert_eq!(resp.status(), 201);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_send_requires_auth() {
    let app = TestApp::new().await;

    let req = TestApp::request(Method::POST, &messages_uri(Uuid::new_v4()))
        .header("Content-Type", "application/json")
        .body(axum::body::Body::from(r#"{"content":"hi"}"#))
        .unwrap();
    let resp = app.oneshot(req).await;
    assert_eq!(resp.status(), 401);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_send_to_missing_channel() {
    let app = TestApp::new().await;
    let (user_id, _) = create_test_user(&app.pool).await;

    let mut guard = app.cleanup_guard();
    guard.delete_user(user_id);

    let token = generate_access_token(&app.config, user_id);
    let body = serde_json::json!({ "content": "anyone?" });
    let resp = app
        .send_json(Method::POST, &messages_uri(Uuid::new_v4()), &token, &body)
        .await;
    assert_eq!(resp.status(), 404);
    assert_eq!(body_to_json(resp).await["error"], "not_found");
}

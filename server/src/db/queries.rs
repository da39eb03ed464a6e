//! Database Queries
//!
//! Runtime-checked queries against the chat tables.

use sqlx::PgPool;
use uuid::Uuid;

use super::models::{Channel, ChannelPatch, ChannelPin, Message, NewChannel, NewMessage, ReactionCount};

// ============================================================================
// Channel Queries
// ============================================================================

/// Find channel by ID.
pub async fn find_channel_by_id(pool: &PgPool, id: Uuid) -> sqlx::Result<Option<Channel>> {
    sqlx::query_as::<_, Channel>("SELECT * FROM channels WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Create a channel at the end of its sibling list.
pub async fn create_channel(pool: &PgPool, channel: &NewChannel<'_>) -> sqlx::Result<Channel> {
    insert_channel(pool, channel).await
}

async fn insert_channel<'e, E>(executor: E, channel: &NewChannel<'_>) -> sqlx::Result<Channel>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query_as::<_, Channel>(
        r"
        INSERT INTO channels (
            guild_id, parent_id, name, kind, topic,
            read_only, read_only_role_ids, encrypted, slowmode_seconds, position
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, (
            SELECT COALESCE(MAX(position), 0) + 1 FROM channels
            WHERE guild_id IS NOT DISTINCT FROM $1
              AND parent_id IS NOT DISTINCT FROM $2
        ))
        RETURNING *
        ",
    )
    .bind(channel.guild_id)
    .bind(channel.parent_id)
    .bind(channel.name)
    .bind(channel.kind)
    .bind(channel.topic)
    .bind(channel.read_only)
    .bind(channel.read_only_role_ids)
    .bind(channel.encrypted)
    .bind(channel.slowmode_seconds)
    .fetch_one(executor)
    .await
}

/// Apply a partial update. Absent fields keep their stored value.
pub async fn update_channel(
    pool: &PgPool,
    id: Uuid,
    patch: &ChannelPatch,
) -> sqlx::Result<Option<Channel>> {
    sqlx::query_as::<_, Channel>(
        r"
        UPDATE channels
        SET name = COALESCE($2, name),
            topic = COALESCE($3, topic),
            locked = COALESCE($4, locked),
            archived = COALESCE($5, archived),
            read_only = COALESCE($6, read_only),
            read_only_role_ids = COALESCE($7, read_only_role_ids),
            slowmode_seconds = COALESCE($8, slowmode_seconds),
            encrypted = COALESCE($9, encrypted),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        ",
    )
    .bind(id)
    .bind(patch.name.as_deref())
    .bind(patch.topic.as_deref())
    .bind(patch.locked)
    .bind(patch.archived)
    .bind(patch.read_only)
    .bind(patch.read_only_role_ids.as_deref())
    .bind(patch.slowmode_seconds)
    .bind(patch.encrypted)
    .fetch_optional(pool)
    .await
}

/// Delete a channel.
pub async fn delete_channel(pool: &PgPool, id: Uuid) -> sqlx::Result<bool> {
    let result = sqlx::query("DELETE FROM channels WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Create a thread or post under a parent channel, optionally with its first
/// message, in one transaction.
pub async fn create_thread(
    pool: &PgPool,
    thread: &NewChannel<'_>,
    first_message: Option<(Uuid, &str)>,
) -> sqlx::Result<(Channel, Option<Message>)> {
    let mut tx = pool.begin().await?;

    let mut channel = insert_channel(&mut *tx, thread).await?;

    let message = match first_message {
        Some((user_id, content)) => {
            let message = insert_message(
                &mut tx,
                &NewMessage {
                    channel_id: channel.id,
                    user_id,
                    content,
                    encrypted: thread.encrypted,
                    nonce: None,
                    reply_to: None,
                },
            )
            .await?;
            channel.last_message_at = Some(message.created_at);
            Some(message)
        }
        None => None,
    };

    tx.commit().await?;
    Ok((channel, message))
}

// ============================================================================
// Message Queries
// ============================================================================

/// List messages in a channel, newest first.
pub async fn list_messages(
    pool: &PgPool,
    channel_id: Uuid,
    before: Option<Uuid>,
    limit: i64,
) -> sqlx::Result<Vec<Message>> {
    if let Some(before_id) = before {
        // (created_at, id) keeps the cursor stable across equal timestamps
        sqlx::query_as::<_, Message>(
            r"
            SELECT m.* FROM messages m
            WHERE m.channel_id = $1
              AND m.deleted_at IS NULL
              AND (m.created_at, m.id) < (
                SELECT created_at, id FROM messages WHERE id = $2
              )
            ORDER BY m.created_at DESC, m.id DESC
            LIMIT $3
            ",
        )
        .bind(channel_id)
        .bind(before_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    } else {
        sqlx::query_as::<_, Message>(
            r"
            SELECT * FROM messages
            WHERE channel_id = $1
              AND deleted_at IS NULL
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            ",
        )
        .bind(channel_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }
}

/// Find a live (not deleted) message by ID.
pub async fn find_message_by_id(pool: &PgPool, id: Uuid) -> sqlx::Result<Option<Message>> {
    sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE id = $1 AND deleted_at IS NULL")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Insert a message and bump the channel's activity timestamp atomically.
pub async fn create_message(pool: &PgPool, message: &NewMessage<'_>) -> sqlx::Result<Message> {
    let mut tx = pool.begin().await?;
    let message = insert_message(&mut tx, message).await?;
    tx.commit().await?;
    Ok(message)
}

async fn insert_message(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    message: &NewMessage<'_>,
) -> sqlx::Result<Message> {
    let row = sqlx::query_as::<_, Message>(
        r"
        INSERT INTO messages (channel_id, user_id, content, encrypted, nonce, reply_to)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        ",
    )
    .bind(message.channel_id)
    .bind(message.user_id)
    .bind(message.content)
    .bind(message.encrypted)
    .bind(message.nonce)
    .bind(message.reply_to)
    .fetch_one(&mut **tx)
    .await?;

    sqlx::query(
        r"
        UPDATE channels
        SET last_message_at = GREATEST(COALESCE(last_message_at, $2), $2)
        WHERE id = $1
        ",
    )
    .bind(row.channel_id)
    .bind(row.created_at)
    .execute(&mut **tx)
    .await?;

    Ok(row)
}

/// Edit a message. Only the author's own live messages match.
pub async fn update_message(
    pool: &PgPool,
    id: Uuid,
    user_id: Uuid,
    content: &str,
) -> sqlx::Result<Option<Message>> {
    sqlx::query_as::<_, Message>(
        r"
        UPDATE messages
        SET content = $3, edited_at = NOW()
        WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL
        RETURNING *
        ",
    )
    .bind(id)
    .bind(user_id)
    .bind(content)
    .fetch_optional(pool)
    .await
}

/// Soft-delete a message. The row stays so slowmode still sees it.
pub async fn delete_message(pool: &PgPool, id: Uuid) -> sqlx::Result<bool> {
    let result = sqlx::query(
        r"
        UPDATE messages
        SET deleted_at = NOW(), content = ''
        WHERE id = $1 AND deleted_at IS NULL
        ",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

// ============================================================================
// Reaction Queries
// ============================================================================

/// Add a reaction. Returns `false` if the user had already reacted.
pub async fn add_reaction(
    pool: &PgPool,
    message_id: Uuid,
    user_id: Uuid,
    emoji: &str,
) -> sqlx::Result<bool> {
    let result = sqlx::query(
        r"
        INSERT INTO message_reactions (message_id, user_id, emoji)
        VALUES ($1, $2, $3)
        ON CONFLICT (message_id, user_id, emoji) DO NOTHING
        ",
    )
    .bind(message_id)
    .bind(user_id)
    .bind(emoji)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Remove the user's own reaction.
pub async fn remove_reaction(
    pool: &PgPool,
    message_id: Uuid,
    user_id: Uuid,
    emoji: &str,
) -> sqlx::Result<bool> {
    let result = sqlx::query(
        "DELETE FROM message_reactions WHERE message_id = $1 AND user_id = $2 AND emoji = $3",
    )
    .bind(message_id)
    .bind(user_id)
    .bind(emoji)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Reaction counts for a message, as seen by `viewer_id`.
pub async fn list_reactions(
    pool: &PgPool,
    message_id: Uuid,
    viewer_id: Uuid,
) -> sqlx::Result<Vec<ReactionCount>> {
    sqlx::query_as::<_, ReactionCount>(
        r"
        SELECT emoji,
               COUNT(*) AS count,
               BOOL_OR(user_id = $2) AS me
        FROM message_reactions
        WHERE message_id = $1
        GROUP BY emoji
        ORDER BY MIN(created_at)
        ",
    )
    .bind(message_id)
    .bind(viewer_id)
    .fetch_all(pool)
    .await
}

// ============================================================================
// Pin Queries
// ============================================================================

/// List pins in a channel, most recent first.
pub async fn list_pins(pool: &PgPool, channel_id: Uuid) -> sqlx::Result<Vec<ChannelPin>> {
    sqlx::query_as::<_, ChannelPin>(
        r"
        SELECT p.channel_id, p.message_id, p.pinned_by, p.pinned_at
        FROM channel_pins p
        INNER JOIN messages m ON m.id = p.message_id
        WHERE p.channel_id = $1 AND m.deleted_at IS NULL
        ORDER BY p.pinned_at DESC
        ",
    )
    .bind(channel_id)
    .fetch_all(pool)
    .await
}

/// Pin a message unless the channel already holds `limit` pins.
///
/// Returns `Ok(None)` when the limit is reached. Pinning an already pinned
/// message returns the existing pin.
pub async fn pin_message(
    pool: &PgPool,
    channel_id: Uuid,
    message_id: Uuid,
    pinned_by: Uuid,
    limit: i64,
) -> sqlx::Result<Option<ChannelPin>> {
    let mut tx = pool.begin().await?;

    // Serialize concurrent pins on the same channel
    sqlx::query("SELECT id FROM channels WHERE id = $1 FOR UPDATE")
        .bind(channel_id)
        .execute(&mut *tx)
        .await?;

    let existing = sqlx::query_as::<_, ChannelPin>(
        "SELECT channel_id, message_id, pinned_by, pinned_at FROM channel_pins WHERE channel_id = $1 AND message_id = $2",
    )
    .bind(channel_id)
    .bind(message_id)
    .fetch_optional(&mut *tx)
    .await?;
    if existing.is_some() {
        tx.commit().await?;
        return Ok(existing);
    }

    // Pins on deleted messages are hidden from listings and do not count
    let count: i64 = sqlx::query_scalar(
        r"
        SELECT COUNT(*)
        FROM channel_pins p
        INNER JOIN messages m ON m.id = p.message_id
        WHERE p.channel_id = $1 AND m.deleted_at IS NULL
        ",
    )
    .bind(channel_id)
    .fetch_one(&mut *tx)
    .await?;
    if count >= limit {
        return Ok(None);
    }

    let pin = sqlx::query_as::<_, ChannelPin>(
        r"
        INSERT INTO channel_pins (channel_id, message_id, pinned_by)
        VALUES ($1, $2, $3)
        RETURNING channel_id, message_id, pinned_by, pinned_at
        ",
    )
    .bind(channel_id)
    .bind(message_id)
    .bind(pinned_by)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(Some(pin))
}

/// Unpin a message.
pub async fn unpin_message(pool: &PgPool, channel_id: Uuid, message_id: Uuid) -> sqlx::Result<bool> {
    let result = sqlx::query("DELETE FROM channel_pins WHERE channel_id = $1 AND message_id = $2")
        .bind(channel_id)
        .bind(message_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

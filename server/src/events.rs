//! Channel Event Bus
//!
//! Server events are published as JSON on Redis pub/sub. Gateway processes
//! subscribe to `channel:{id}` and fan out to connected clients.

use chrono::{DateTime, Utc};
use fred::clients::Client;
use fred::error::{Error as RedisError, ErrorKind as RedisErrorKind};
use fred::interfaces::PubsubInterface;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events published to channel subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// New message in channel
    MessageNew {
        channel_id: Uuid,
        message: serde_json::Value,
    },
    /// Message edited
    MessageEdit {
        channel_id: Uuid,
        message_id: Uuid,
        content: String,
        edited_at: Option<DateTime<Utc>>,
    },
    /// Message deleted
    MessageDelete { channel_id: Uuid, message_id: Uuid },
    ReactionAdd {
        channel_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
        emoji: String,
    },
    ReactionRemove {
        channel_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
        emoji: String,
    },
    /// Channel settings changed
    ChannelUpdate {
        channel_id: Uuid,
        channel: serde_json::Value,
    },
    ChannelDelete { channel_id: Uuid },
    /// Thread or post created under a parent channel
    ThreadCreate {
        channel_id: Uuid,
        thread: serde_json::Value,
    },
    MessagePinned {
        channel_id: Uuid,
        message_id: Uuid,
        pinned_by: Uuid,
    },
    MessageUnpinned { channel_id: Uuid, message_id: Uuid },
}

/// Redis pub/sub topic names.
pub mod topics {
    use uuid::Uuid;

    pub fn channel_events(channel_id: Uuid) -> String {
        format!("channel:{channel_id}")
    }
}

/// Broadcast a server event to a channel via Redis.
pub async fn broadcast_to_channel(
    redis: &Client,
    channel_id: Uuid,
    event: &ServerEvent,
) -> Result<(), RedisError> {
    let payload = serde_json::to_string(event)
        .map_err(|e| RedisError::new(RedisErrorKind::Parse, format!("JSON error: {e}")))?;

    redis
        .publish::<(), _, _>(topics::channel_events(channel_id), payload)
        .await?;

    Ok(())
}

/// Publish and log failures. Delivery is best effort; the write already
/// committed.
pub async fn publish(redis: &Client, channel_id: Uuid, event: ServerEvent) {
    if let Err(e) = broadcast_to_channel(redis, channel_id, &event).await {
        tracing::warn!(%channel_id, error = %e, "Failed to publish channel event");
    }
}

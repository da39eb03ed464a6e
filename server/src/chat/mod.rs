//! Chat Service
//!
//! Handles channels, threads, messages, reactions and pins. Every handler
//! authorizes through [`ChannelContext`](crate::permissions::ChannelContext)
//! or the permission gate.

mod channels;
mod messages;
mod pins;
mod reactions;
pub mod send_policy;
pub mod spam;
mod threads;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
    Json, Router,
};

use crate::api::AppState;

pub use send_policy::{PolicyViolation, SendPolicy, SendRequest};
pub use spam::DmSpamTracker;

/// Create channels router, mounted at `/api/channels`.
pub fn channels_router() -> Router<AppState> {
    Router::new()
        .route("/", post(channels::create))
        .route(
            "/{id}",
            get(channels::get)
                .patch(channels::update)
                .delete(channels::delete),
        )
        .route("/{id}/threads", post(threads::create))
        .route(
            "/{id}/messages",
            get(messages::list).post(messages::create),
        )
        .route(
            "/{id}/messages/{message_id}/reactions",
            get(reactions::list).put(reactions::add),
        )
        .route(
            "/{id}/messages/{message_id}/reactions/{emoji}",
            axum::routing::delete(reactions::remove),
        )
        .route("/{id}/pins", get(pins::list))
        .route(
            "/{id}/pins/{message_id}",
            put(pins::pin).delete(pins::unpin),
        )
}

/// Create messages router, mounted at `/api/messages`.
pub fn messages_router() -> Router<AppState> {
    Router::new().route("/{id}", patch(messages::update).delete(messages::delete))
}

/// JSON error body shared by the chat handlers.
pub(crate) fn json_error(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": code, "message": message.into() })),
    )
        .into_response()
}

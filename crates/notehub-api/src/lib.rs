//! REST adapter over [`notehub_chat::ChatService`]. Handlers only translate
//! between HTTP and the chat core; every rule lives in the core.

pub mod error;
pub mod messages;
pub mod middleware;
pub mod reactions;
pub mod rooms;
pub mod state;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post, put},
};

pub use error::ApiError;
pub use state::AppState;

/// All chat routes, behind bearer authentication.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/rooms", get(rooms::list_rooms))
        .route("/rooms/direct", post(rooms::create_direct_chat))
        .route("/rooms/group", post(rooms::create_group_chat))
        .route("/rooms/{room_id}", get(rooms::get_room).delete(rooms::delete_room))
        .route("/rooms/{room_id}/theme", put(rooms::update_theme))
        .route("/rooms/{room_id}/unread", get(rooms::unread_count))
        .route("/rooms/{room_id}/read", post(rooms::mark_read))
        .route(
            "/rooms/{room_id}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .route("/rooms/{room_id}/messages/search", get(messages::search_messages))
        .route("/rooms/{room_id}/pins", get(messages::pinned_messages))
        .route("/rooms/{room_id}/messages/{message_id}", delete(messages::delete_message))
        .route(
            "/rooms/{room_id}/messages/{message_id}/reactions",
            post(reactions::add_reaction),
        )
        .route(
            "/rooms/{room_id}/messages/{message_id}/reactions/{emoji}",
            delete(reactions::remove_reaction),
        )
        .route(
            "/rooms/{room_id}/messages/{message_id}/pin",
            post(reactions::pin_message).delete(reactions::unpin_message),
        )
        .route("/messages/{message_id}/read", post(reactions::mark_message_read))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ))
        .with_state(state)
}

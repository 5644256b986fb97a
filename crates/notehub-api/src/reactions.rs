use axum::{
    Extension, Json,
    extract::{Path, State},
};
use notehub_chat::Actor;
use notehub_types::api::{ChangedResponse, ReactionRequest};
use notehub_types::models::{ChatMessage, Identity};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

// -- Reactions --

pub async fn add_reaction(
    State(state): State<AppState>,
    Path((room_id, message_id)): Path<(Uuid, Uuid)>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<ReactionRequest>,
) -> Result<Json<ChangedResponse>, ApiError> {
    let changed = state
        .chat
        .messages()
        .add_reaction(&Actor::rest(identity), room_id, message_id, &req.emoji)
        .await?;
    Ok(Json(ChangedResponse { changed }))
}

pub async fn remove_reaction(
    State(state): State<AppState>,
    Path((room_id, message_id, emoji)): Path<(Uuid, Uuid, String)>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<ChangedResponse>, ApiError> {
    let changed = state
        .chat
        .messages()
        .remove_reaction(&Actor::rest(identity), room_id, message_id, &emoji)
        .await?;
    Ok(Json(ChangedResponse { changed }))
}

// -- Pins --

pub async fn pin_message(
    State(state): State<AppState>,
    Path((room_id, message_id)): Path<(Uuid, Uuid)>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<ChatMessage>, ApiError> {
    let message = state
        .chat
        .messages()
        .pin_message(&Actor::rest(identity), room_id, message_id)
        .await?;
    Ok(Json(message))
}

pub async fn unpin_message(
    State(state): State<AppState>,
    Path((room_id, message_id)): Path<(Uuid, Uuid)>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<ChatMessage>, ApiError> {
    let message = state
        .chat
        .messages()
        .unpin_message(&Actor::rest(identity), room_id, message_id)
        .await?;
    Ok(Json(message))
}

// -- Read receipts --

pub async fn mark_message_read(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<ChangedResponse>, ApiError> {
    let changed = state
        .chat
        .messages()
        .mark_message_read(&Actor::rest(identity), message_id)
        .await?;
    Ok(Json(ChangedResponse { changed }))
}

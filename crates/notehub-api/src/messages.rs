use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use notehub_chat::Actor;
use notehub_types::api::{MessageQuery, SearchQuery, SendMessageRequest};
use notehub_types::models::{ChatMessage, Identity};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn get_messages(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    let messages = state
        .chat
        .messages()
        .get_messages(room_id, identity.user_id, query.limit, query.offset)
        .await?;
    Ok(Json(messages))
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = state
        .chat
        .messages()
        .send(&Actor::rest(identity), room_id, &req.body, req.photo_url)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn search_messages(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Query(query): Query<SearchQuery>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    let messages = state
        .chat
        .messages()
        .search_messages(room_id, identity.user_id, &query.q, query.limit)
        .await?;
    Ok(Json(messages))
}

pub async fn pinned_messages(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    let messages = state.chat.messages().pinned_messages(room_id, identity.user_id).await?;
    Ok(Json(messages))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Path((room_id, message_id)): Path<(Uuid, Uuid)>,
    Extension(identity): Extension<Identity>,
) -> Result<StatusCode, ApiError> {
    state
        .chat
        .messages()
        .delete_message(&Actor::rest(identity), room_id, message_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use notehub_chat::Actor;
use notehub_types::api::{
    CreateDirectChatRequest, CreateGroupChatRequest, UnreadCountResponse, UpdateThemeRequest,
};
use notehub_types::models::{ChatRoom, Identity, RoomDetail, RoomSummary};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn list_rooms(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<RoomSummary>>, ApiError> {
    let rooms = state.chat.directory().list_rooms_for_user(identity.user_id).await?;
    Ok(Json(rooms))
}

pub async fn create_direct_chat(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateDirectChatRequest>,
) -> Result<Json<ChatRoom>, ApiError> {
    let room = state
        .chat
        .directory()
        .get_or_create_direct_chat(&identity, req.user_id)
        .await?;
    Ok(Json(room))
}

pub async fn create_group_chat(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateGroupChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let room = state
        .chat
        .directory()
        .create_group_chat(&identity, &req.name, &req.participant_ids)
        .await?;
    Ok((StatusCode::CREATED, Json(room)))
}

pub async fn get_room(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<RoomDetail>, ApiError> {
    let room = state.chat.directory().get_room(room_id, identity.user_id).await?;
    Ok(Json(room))
}

pub async fn delete_room(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<StatusCode, ApiError> {
    state.chat.messages().delete_room(&Actor::rest(identity), room_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_theme(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<UpdateThemeRequest>,
) -> Result<Json<ChatRoom>, ApiError> {
    let room = state
        .chat
        .directory()
        .update_theme(&Actor::rest(identity), room_id, req.theme)
        .await?;
    Ok(Json(room))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<UnreadCountResponse>, ApiError> {
    let unread_count = state.chat.directory().get_unread_count(room_id, identity.user_id).await?;
    Ok(Json(UnreadCountResponse { room_id, unread_count }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<StatusCode, ApiError> {
    state.chat.directory().mark_read(room_id, identity.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

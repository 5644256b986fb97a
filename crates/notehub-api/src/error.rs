use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use notehub_chat::ChatError;
use notehub_gateway::AuthError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication required")]
    Unauthenticated,

    #[error(transparent)]
    Chat(#[from] ChatError),
}

impl From<AuthError> for ApiError {
    fn from(_: AuthError) -> Self {
        Self::Unauthenticated
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthenticated => {
                (StatusCode::UNAUTHORIZED, "authentication required".to_string())
            }
            // One body for every authorization failure, whether or not the
            // room exists.
            ApiError::Chat(ChatError::NotAuthorized) => {
                (StatusCode::FORBIDDEN, "not authorized".to_string())
            }
            ApiError::Chat(e @ ChatError::NotFound(_)) => (StatusCode::NOT_FOUND, e.to_string()),
            ApiError::Chat(ChatError::Validation(msg)) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Chat(e) => {
                error!("Request failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_string())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};
use axum_extra::typed_header::TypedHeaderRejection;
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

/// Verify the bearer token and attach the caller's
/// [`Identity`](notehub_types::models::Identity) to the request.
pub async fn require_auth(
    State(state): State<AppState>,
    bearer: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let TypedHeader(Authorization(bearer)) = bearer.map_err(|_| ApiError::Unauthenticated)?;
    let identity = state.verifier.verify(bearer.token())?;

    // Keep usernames current for other participants' views.
    if let Err(e) = state.chat.directory().remember_identity(&identity).await {
        warn!("Failed to record identity {}: {}", identity.user_id, e);
    }

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

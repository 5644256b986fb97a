mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use axum_extra::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};
use axum_extra::typed_header::TypedHeaderRejection;
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use notehub_api::AppState;
use notehub_chat::ChatService;
use notehub_db::Database;
use notehub_gateway::{BroadcastRouter, IdentityVerifier, JwtVerifier, PresenceHub, connection};

use crate::config::Config;

#[derive(Clone)]
struct GatewayState {
    hub: PresenceHub,
    router: BroadcastRouter,
    chat: ChatService,
    verifier: Arc<dyn IdentityVerifier>,
}

/// Browsers can't set headers on a WebSocket handshake, so the token may
/// also come as `?token=`.
#[derive(Debug, Deserialize)]
struct GatewayQuery {
    token: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "notehub=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    info!("Starting in {:?} mode", config.environment);

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);

    // Live side first: the chat core notifies through the router
    let hub = PresenceHub::new();
    let router = BroadcastRouter::new(hub.clone());
    let chat = ChatService::new(db, config.chat_secret, Arc::new(router.clone()));
    let verifier: Arc<dyn IdentityVerifier> = Arc::new(JwtVerifier::new(&config.jwt_secret));

    let gateway_state = GatewayState {
        hub,
        router,
        chat: chat.clone(),
        verifier: verifier.clone(),
    };

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(gateway_state);

    let app = Router::new()
        .merge(notehub_api::router(AppState::new(chat, verifier)))
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Notehub chat server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Authenticate before upgrading: a bad credential gets a plain 401 and
/// nothing is registered with the hub.
async fn ws_upgrade(
    State(state): State<GatewayState>,
    Query(query): Query<GatewayQuery>,
    bearer: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    ws: WebSocketUpgrade,
) -> Response {
    let token = match (&bearer, query.token.as_deref()) {
        (Ok(TypedHeader(Authorization(bearer))), _) => bearer.token().to_string(),
        (Err(_), Some(token)) if !token.is_empty() => token.to_string(),
        _ => return StatusCode::UNAUTHORIZED.into_response(),
    };

    let identity = match state.verifier.verify(&token) {
        Ok(identity) => identity,
        Err(e) => {
            warn!("Gateway handshake rejected: {}", e);
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };

    if let Err(e) = state.chat.directory().remember_identity(&identity).await {
        warn!("Failed to record identity {}: {}", identity.user_id, e);
    }

    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.hub, state.router, state.chat, identity)
    })
    .into_response()
}

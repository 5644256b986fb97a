use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use notehub_chat::ChatService;
use notehub_types::events::{ClientCommand, ServerEvent};
use notehub_types::models::Identity;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::hub::PresenceHub;
use crate::router::BroadcastRouter;
use crate::session::Session;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Drive a WebSocket whose bearer credential was verified at the HTTP
/// upgrade. Returns when either side closes or the heartbeat times out.
pub async fn handle_connection(
    socket: WebSocket,
    hub: PresenceHub,
    router: BroadcastRouter,
    chat: ChatService,
    identity: Identity,
) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let mut session = Session::new(hub, router, chat);
    let connection_id = match session.attach(identity.clone(), tx) {
        Ok(id) => id,
        Err(e) => {
            warn!("{} ({}) could not attach: {}", identity.username, identity.user_id, e);
            return;
        }
    };
    info!("{} ({}) connected to gateway as {}", identity.username, identity.user_id, connection_id);

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;

    // Forward queued events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Failed to serialize {} event: {}", event.name(), e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!(
                                "Heartbeat timeout (missed {} pongs), dropping connection",
                                missed_heartbeats
                            );
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client. The session lives in this task, so aborting
    // it runs the session's teardown.
    let username = identity.username.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    let command = match serde_json::from_str::<ClientCommand>(&text) {
                        Ok(command) => command,
                        Err(e) => {
                            let raw: String = text.chars().take(200).collect();
                            warn!("{} bad command: {} -- raw: {}", username, e, raw);
                            session.reply(ServerEvent::Error {
                                message: "malformed command".into(),
                            });
                            continue;
                        }
                    };

                    if let Err(e) = session.handle(command).await {
                        warn!("{} command rejected: {}", username, e);
                        session.reply(ServerEvent::Error {
                            message: e.client_message(),
                        });
                    }
                }
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
        session.disconnect();
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("{} ({}) disconnected from gateway", identity.username, identity.user_id);
}

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::auth::AuthUser;
use crate::config;
use crate::db::{self, RoomMessageRow};
use crate::models::{ChatEntry, ClientEvent, CursorEntry, MemberEntry, PresenceEntry, ServerEvent};
use crate::rtc::signal::SignalEnvelope;
use crate::services::{auth_service, profile_service};
use crate::ws::hub::{snapshot_of, RoomHub};
use crate::AppState;

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// WebSocket entry point of a room's live channel.
///
/// Browser WebSocket clients cannot set headers, so the token travels as
/// a query parameter and is validated before the upgrade.
pub async fn room_ws(
    Path(room_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    // 1. Validate the token
    let token = match params.get("token") {
        Some(token) => token.clone(),
        None => return StatusCode::UNAUTHORIZED.into_response(),
    };
    let config = config::get_config();
    let secret = match &config.auth_jwt_secret {
        Some(secret) => secret,
        None => {
            error!("Auth JWT secret not configured");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let token_data = match auth_service::validate_jwt(&token, secret) {
        Ok(token_data) => token_data,
        Err(e) => {
            warn!("WebSocket JWT validation failed: {}", e);
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };
    let user = match AuthUser::from_claims(&token_data.claims) {
        Ok(user) => user,
        Err(e) => {
            warn!("WebSocket token rejected: {}", e);
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };

    // 2. The room must exist, be active, and the caller must be a member
    let db = match db::get_db() {
        Some(db) => db,
        None => return StatusCode::SERVICE_UNAVAILABLE.into_response(),
    };
    let room = match db.get_room(&room_id).await {
        Ok(Some(room)) if room.is_active => room,
        Ok(_) => return StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            error!("Failed to load room {}: {}", room_id, e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let is_member = room.created_by == user.uid
        || matches!(db.get_member(&room_id, &user.uid).await, Ok(Some(_)));
    if !is_member {
        return StatusCode::FORBIDDEN.into_response();
    }

    // 3. Upgrade
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, room_id, user, hub))
}

/// Handle one room connection
async fn handle_socket(socket: WebSocket, room_id: String, user: AuthUser, hub: Arc<RoomHub>) {
    let conn_id = Uuid::new_v4();
    let identity = user.uid.clone();
    let display_name = match user.display_name.clone() {
        Some(name) => name,
        None => profile_service::get_or_fetch_display_name(&identity).await,
    };

    info!(
        "Room {} connection established: {} ({})",
        room_id, identity, conn_id
    );

    let channel = hub.join(&room_id).await;
    channel.register_conn(conn_id, &identity).await;

    // Subscribe before sending the snapshot so no change between the
    // snapshot read and the first forwarded event is lost.
    let mut rx = channel.subscribe();

    let (sender, mut receiver) = socket.split();
    let sender1 = Arc::new(tokio::sync::Mutex::new(sender));
    let sender2 = sender1.clone();

    // Presence record exists from the moment of connection; the audio
    // flag only flips through heartbeats.
    channel
        .upsert_presence(PresenceEntry {
            user_id: identity.clone(),
            display_name: display_name.clone(),
            audio_active: false,
            last_active: now_ms(),
        })
        .await;

    // Initial snapshot: room document, members, presence, cursors, chat
    // backlog, then any signaling messages still waiting for this identity.
    if let Err(e) = send_snapshot(&sender1, &channel, &room_id, &identity).await {
        warn!("Failed to send snapshot to {}: {}", identity, e);
    }

    // Forward broadcast events to this client. Signaling messages are
    // addressed; everything else fans out to the whole room.
    let forward_identity = identity.clone();
    let mut send_task = tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            if let ServerEvent::Signal(ref envelope) = event {
                if envelope.to != forward_identity {
                    continue;
                }
            }
            let Ok(text) = serde_json::to_string(&event) else {
                continue;
            };
            if sender2.lock().await.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // Process inbound events until the client goes away
    let recv_channel = channel.clone();
    let recv_identity = identity.clone();
    let recv_display_name = display_name.clone();
    let recv_room_id = room_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(Message::Text(text))) = receiver.next().await {
            let event: ClientEvent = match serde_json::from_str(&text) {
                Ok(event) => event,
                Err(e) => {
                    warn!("Unparseable event in room {}: {}", recv_room_id, e);
                    continue;
                }
            };

            if let Err(message) = handle_client_event(
                &recv_channel,
                &recv_room_id,
                &recv_identity,
                &recv_display_name,
                event,
            )
            .await
            {
                recv_channel.send(ServerEvent::Error { message });
            }
        }
    });

    // Wait for either task to finish (and finish the other)
    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    // Teardown: drop the connection, then the identity's ephemeral
    // records once its last connection is gone. Mailboxes survive for
    // re-delivery on reconnect.
    let cleanup = channel.unregister_conn(conn_id).await;
    if let Some(identity) = cleanup.identity_left {
        channel.remove_cursor(&identity).await;
        channel.remove_presence(&identity).await;
    }
    if cleanup.channel_empty {
        hub.close_channel(&room_id).await;
    }

    info!("Room {} connection terminated: {}", room_id, identity);
}

type WsSender = Arc<tokio::sync::Mutex<futures_util::stream::SplitSink<WebSocket, Message>>>;

async fn send_event(sender: &WsSender, event: &ServerEvent) -> Result<(), String> {
    let text = serde_json::to_string(event).map_err(|e| e.to_string())?;
    sender
        .lock()
        .await
        .send(Message::Text(text))
        .await
        .map_err(|e| e.to_string())
}

async fn send_snapshot(
    sender: &WsSender,
    channel: &Arc<crate::ws::hub::RoomChannel>,
    room_id: &str,
    identity: &str,
) -> Result<(), String> {
    let db = db::get_db().ok_or("Database not initialized")?;

    let room = db
        .get_room(room_id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or("Room not found")?;
    send_event(sender, &ServerEvent::Room(snapshot_of(&room))).await?;

    let members = db
        .list_members(room_id)
        .await
        .map_err(|e| e.to_string())?
        .into_iter()
        .map(|m| MemberEntry {
            user_id: m.user_id,
            role: m.role,
            joined_at: m.joined_at,
        })
        .collect::<Vec<_>>();
    send_event(sender, &ServerEvent::Members { members }).await?;

    let users = channel.roster().await;
    send_event(sender, &ServerEvent::Presence { users }).await?;

    for cursor in channel.cursors().await {
        if cursor.user_id != identity {
            send_event(sender, &ServerEvent::Cursor(cursor)).await?;
        }
    }

    let backlog = db
        .list_recent_messages(room_id, 100)
        .await
        .map_err(|e| e.to_string())?;
    for message in backlog {
        send_event(
            sender,
            &ServerEvent::Chat(ChatEntry {
                id: message.id,
                sender: message.sender,
                display_name: message.display_name,
                content: message.content,
                timestamp: message.created_date,
            }),
        )
        .await?;
    }

    // Unacked signaling messages are re-delivered on every connect;
    // consumers are idempotent against the repeat.
    for envelope in channel.pending_signals(identity).await {
        send_event(sender, &ServerEvent::Signal(envelope)).await?;
    }

    Ok(())
}

async fn handle_client_event(
    channel: &Arc<crate::ws::hub::RoomChannel>,
    room_id: &str,
    identity: &str,
    display_name: &str,
    event: ClientEvent,
) -> Result<(), String> {
    match event {
        ClientEvent::Edit { content } => {
            let db = db::get_db().ok_or("Database not initialized")?;
            db.update_room_content(room_id, &content)
                .await
                .map_err(|e| format!("Failed to sync content: {}", e))?;
            channel.mark_dirty(identity).await;

            // Read back and broadcast the document as written: last
            // write wins, own-write echo included.
            match db.get_room(room_id).await {
                Ok(Some(row)) => channel.send(ServerEvent::Room(snapshot_of(&row))),
                Ok(None) => warn!("Room {} vanished during edit", room_id),
                Err(e) => return Err(format!("Failed to reload room: {}", e)),
            }
            Ok(())
        }
        ClientEvent::Cursor { line, column } => {
            channel
                .upsert_cursor(CursorEntry {
                    user_id: identity.to_string(),
                    display_name: display_name.to_string(),
                    line,
                    column,
                    last_updated: now_ms(),
                })
                .await;
            Ok(())
        }
        ClientEvent::Heartbeat { audio_active } => {
            channel
                .upsert_presence(PresenceEntry {
                    user_id: identity.to_string(),
                    display_name: display_name.to_string(),
                    audio_active,
                    last_active: now_ms(),
                })
                .await;
            Ok(())
        }
        ClientEvent::Chat { content } => {
            let db = db::get_db().ok_or("Database not initialized")?;
            let row = RoomMessageRow {
                id: Uuid::new_v4(),
                room_id: room_id.to_string(),
                sender: identity.to_string(),
                display_name: display_name.to_string(),
                content,
                created_date: Utc::now(),
            };
            db.insert_room_message(&row)
                .await
                .map_err(|e| format!("Failed to send message: {}", e))?;
            channel.send(ServerEvent::Chat(ChatEntry {
                id: row.id,
                sender: row.sender,
                display_name: row.display_name,
                content: row.content,
                timestamp: row.created_date,
            }));
            Ok(())
        }
        ClientEvent::Signal { to, payload } => {
            let envelope = SignalEnvelope {
                id: Uuid::new_v4(),
                from: identity.to_string(),
                to,
                payload,
                timestamp: now_ms(),
            };
            channel.push_signal(envelope).await;
            Ok(())
        }
        ClientEvent::SignalAck { id } => {
            channel.ack_signal(identity, id).await;
            Ok(())
        }
    }
}

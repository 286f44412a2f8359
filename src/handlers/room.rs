use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::auth::{self, AuthUser};
use crate::config;
use crate::db::{self, RoomRow};
use crate::models::{
    error_response, AddMemberRequest, CreateRoomRequest, ErrorResponse, JoinRoomRequest,
    MemberEntry, RoomListResponse, RoomResponse, RoomSettingsRequest, VersionEntry,
    VersionListResponse,
};
use crate::services::paste_service;
use crate::AppState;

const MAX_CODE_ATTEMPTS: usize = 5;
const ROOM_LIST_ATTEMPTS: u32 = 3;

fn response_of(row: &RoomRow) -> RoomResponse {
    RoomResponse {
        room_id: row.room_id.clone(),
        room_name: row.room_name.clone(),
        language: row.language.clone(),
        is_private: row.is_private,
        is_active: row.is_active,
        created_by: row.created_by.clone(),
        created_date: row.created_date,
        ice_servers: config::get_config().stun_server_list(),
    }
}

async fn load_room(room_id: &str) -> Result<RoomRow, (StatusCode, Json<ErrorResponse>)> {
    let db = db::get_db()
        .ok_or_else(|| error_response(StatusCode::SERVICE_UNAVAILABLE, "Database not initialized"))?;

    let room = db.get_room(room_id).await.map_err(|e| {
        error!("Failed to load room {}: {}", room_id, e);
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load room")
    })?;

    match room {
        Some(room) if room.is_active => Ok(room),
        _ => Err(error_response(StatusCode::NOT_FOUND, "Room not found")),
    }
}

/// Create a collaboration room with a generated 6-character id
pub async fn create_room(
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<RoomResponse>), (StatusCode, Json<ErrorResponse>)> {
    let db = db::get_db()
        .ok_or_else(|| error_response(StatusCode::SERVICE_UNAVAILABLE, "Database not initialized"))?;

    if payload.room_name.trim().is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "Room name is required"));
    }
    if payload.is_private && payload.password.as_deref().unwrap_or("").is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Private rooms require a password",
        ));
    }

    let mut room_id = None;
    for _ in 0..MAX_CODE_ATTEMPTS {
        let candidate = paste_service::generate_share_code();
        let taken = db.room_id_taken(&candidate).await.map_err(|e| {
            error!("Failed to check room id: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create room")
        })?;
        if !taken {
            room_id = Some(candidate);
            break;
        }
    }
    let Some(room_id) = room_id else {
        return Err(error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to generate a unique room id",
        ));
    };

    let password_hash = match payload.password.as_deref().filter(|p| !p.is_empty()) {
        Some(password) if payload.is_private => Some(
            paste_service::hash_password(password)
                .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, e))?,
        ),
        _ => None,
    };

    let room = RoomRow {
        room_id,
        room_name: payload.room_name.clone(),
        language: payload.language,
        content: format!(
            "// Welcome to {}!\n// Start coding together...\n\n",
            payload.room_name
        ),
        is_private: payload.is_private,
        password_hash,
        is_active: true,
        created_by: user.uid.clone(),
        muted_users: Vec::new(),
        created_date: Utc::now(),
    };

    db.insert_room(&room).await.map_err(|e| {
        error!("Failed to create room: {}", e);
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create room")
    })?;

    Ok((StatusCode::CREATED, Json(response_of(&room))))
}

/// Active rooms where the caller is owner or member.
///
/// This load retries with linear backoff before giving up; it is the one
/// read the UI cannot recover from on its own.
pub async fn list_rooms(
    Extension(user): Extension<AuthUser>,
) -> Result<(StatusCode, Json<RoomListResponse>), (StatusCode, Json<ErrorResponse>)> {
    let db = db::get_db()
        .ok_or_else(|| error_response(StatusCode::SERVICE_UNAVAILABLE, "Database not initialized"))?;

    let mut last_error = None;
    for attempt in 1..=ROOM_LIST_ATTEMPTS {
        match db.list_rooms_for_user(&user.uid).await {
            Ok(rows) => {
                return Ok((
                    StatusCode::OK,
                    Json(RoomListResponse {
                        rooms: rows.iter().map(response_of).collect(),
                    }),
                ));
            }
            Err(e) => {
                warn!(
                    "Room list load failed for {} (attempt {}/{}): {}",
                    user.uid, attempt, ROOM_LIST_ATTEMPTS, e
                );
                last_error = Some(e);
                if attempt < ROOM_LIST_ATTEMPTS {
                    tokio::time::sleep(Duration::from_secs(attempt as u64)).await;
                }
            }
        }
    }

    error!(
        "Room list load failed for {} after {} attempts: {:?}",
        user.uid, ROOM_LIST_ATTEMPTS, last_error
    );
    Err(error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Failed to load rooms. Please try again.",
    ))
}

/// Room metadata
pub async fn get_room(
    Extension(_user): Extension<AuthUser>,
    Path(room_id): Path<String>,
) -> Result<(StatusCode, Json<RoomResponse>), (StatusCode, Json<ErrorResponse>)> {
    let room = load_room(&room_id).await?;
    Ok((StatusCode::OK, Json(response_of(&room))))
}

/// Join a room, verifying the password for private rooms
pub async fn join_room(
    Extension(user): Extension<AuthUser>,
    Path(room_id): Path<String>,
    Json(payload): Json<JoinRoomRequest>,
) -> Result<(StatusCode, Json<RoomResponse>), (StatusCode, Json<ErrorResponse>)> {
    let room = load_room(&room_id).await?;
    let db = db::get_db()
        .ok_or_else(|| error_response(StatusCode::SERVICE_UNAVAILABLE, "Database not initialized"))?;

    if room.is_private && room.created_by != user.uid {
        let supplied = payload.password.as_deref().unwrap_or("");
        let matches = room
            .password_hash
            .as_deref()
            .map(|hash| paste_service::verify_password(supplied, hash))
            .unwrap_or(false);
        if !matches {
            return Err(error_response(StatusCode::FORBIDDEN, "Incorrect password"));
        }
    }

    let role = if room.created_by == user.uid {
        "owner"
    } else {
        "member"
    };
    db.upsert_member(&room.room_id, &user.uid, role)
        .await
        .map_err(|e| {
            error!("Failed to join room {}: {}", room_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to join room")
        })?;

    info!("User {} joined room {}", user.uid, room_id);
    Ok((StatusCode::OK, Json(response_of(&room))))
}

/// Leave a room: membership row, presence and cursor all go
pub async fn leave_room(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(room_id): Path<String>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    let room = load_room(&room_id).await?;
    let db = db::get_db()
        .ok_or_else(|| error_response(StatusCode::SERVICE_UNAVAILABLE, "Database not initialized"))?;

    if room.created_by != user.uid {
        db.remove_member(&room.room_id, &user.uid).await.map_err(|e| {
            error!("Failed to leave room {}: {}", room_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to leave room")
        })?;
    }

    if let Some(channel) = state.hub.channel(&room_id).await {
        channel.remove_cursor(&user.uid).await;
        channel.remove_presence(&user.uid).await;
    }

    Ok(StatusCode::NO_CONTENT)
}

/// List the members of a room
pub async fn list_members(
    Extension(_user): Extension<AuthUser>,
    Path(room_id): Path<String>,
) -> Result<(StatusCode, Json<Vec<MemberEntry>>), (StatusCode, Json<ErrorResponse>)> {
    let room = load_room(&room_id).await?;
    let db = db::get_db()
        .ok_or_else(|| error_response(StatusCode::SERVICE_UNAVAILABLE, "Database not initialized"))?;

    let members = db.list_members(&room.room_id).await.map_err(|e| {
        error!("Failed to list members of {}: {}", room_id, e);
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to list members")
    })?;

    Ok((
        StatusCode::OK,
        Json(
            members
                .into_iter()
                .map(|m| MemberEntry {
                    user_id: m.user_id,
                    role: m.role,
                    joined_at: m.joined_at,
                })
                .collect(),
        ),
    ))
}

/// Owner-only: add a member by identity
pub async fn add_member(
    Extension(user): Extension<AuthUser>,
    Path(room_id): Path<String>,
    Json(payload): Json<AddMemberRequest>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    let room = load_room(&room_id).await?;
    auth::ensure_room_owner(&room, &user)?;

    if payload.user_id.trim().is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "User id is required"));
    }

    let db = db::get_db()
        .ok_or_else(|| error_response(StatusCode::SERVICE_UNAVAILABLE, "Database not initialized"))?;
    db.upsert_member(&room.room_id, &payload.user_id, "member")
        .await
        .map_err(|e| {
            error!("Failed to add member to {}: {}", room_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to add member")
        })?;

    Ok(StatusCode::NO_CONTENT)
}

/// Owner-only: remove a member. The owner cannot remove itself.
pub async fn remove_member(
    Extension(user): Extension<AuthUser>,
    Path((room_id, member_id)): Path<(String, String)>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    let room = load_room(&room_id).await?;
    auth::ensure_room_owner(&room, &user)?;

    if member_id == user.uid {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "The room owner cannot remove itself",
        ));
    }

    let db = db::get_db()
        .ok_or_else(|| error_response(StatusCode::SERVICE_UNAVAILABLE, "Database not initialized"))?;
    let removed = db.remove_member(&room.room_id, &member_id).await.map_err(|e| {
        error!("Failed to remove member from {}: {}", room_id, e);
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to remove member")
    })?;

    if !removed {
        return Err(error_response(StatusCode::NOT_FOUND, "Member not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Owner-only: update privacy settings
pub async fn update_settings(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(room_id): Path<String>,
    Json(payload): Json<RoomSettingsRequest>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    let room = load_room(&room_id).await?;
    auth::ensure_room_owner(&room, &user)?;

    let password_hash = if payload.is_private {
        match payload.password.as_deref().filter(|p| !p.is_empty()) {
            Some(password) => Some(
                paste_service::hash_password(password)
                    .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, e))?,
            ),
            // Keep the existing password when none is supplied
            None => room.password_hash.clone(),
        }
    } else {
        None
    };

    if payload.is_private && password_hash.is_none() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Private rooms require a password",
        ));
    }

    let db = db::get_db()
        .ok_or_else(|| error_response(StatusCode::SERVICE_UNAVAILABLE, "Database not initialized"))?;
    db.update_room_settings(&room.room_id, payload.is_private, password_hash.as_deref())
        .await
        .map_err(|e| {
            error!("Failed to update settings for {}: {}", room_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update room settings")
        })?;

    state.hub.broadcast_room(&room_id).await;
    Ok(StatusCode::NO_CONTENT)
}

/// Owner-only: soft-delete the room
pub async fn delete_room(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(room_id): Path<String>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    let room = load_room(&room_id).await?;
    auth::ensure_room_owner(&room, &user)?;

    let db = db::get_db()
        .ok_or_else(|| error_response(StatusCode::SERVICE_UNAVAILABLE, "Database not initialized"))?;
    db.deactivate_room(&room.room_id).await.map_err(|e| {
        error!("Failed to delete room {}: {}", room_id, e);
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete room")
    })?;

    state.hub.broadcast_room(&room_id).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_mute_list(
    state: &AppState,
    room: &RoomRow,
    muted_users: Vec<String>,
) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
    let db = db::get_db()
        .ok_or_else(|| error_response(StatusCode::SERVICE_UNAVAILABLE, "Database not initialized"))?;
    db.set_muted_users(&room.room_id, &muted_users)
        .await
        .map_err(|e| {
            error!("Failed to update mute list for {}: {}", room.room_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update mute list")
        })?;

    // Every subscriber sees the new list in the next room snapshot and
    // enforces its own side locally.
    state.hub.broadcast_room(&room.room_id).await;
    Ok(())
}

/// Owner-only: add one participant to the mute list
pub async fn mute_user(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((room_id, target)): Path<(String, String)>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    let room = load_room(&room_id).await?;
    auth::ensure_room_owner(&room, &user)?;

    let mut muted = room.muted_users.clone();
    if !muted.contains(&target) {
        muted.push(target.clone());
    }
    set_mute_list(&state, &room, muted).await?;

    info!("User {} muted in room {} by {}", target, room_id, user.uid);
    Ok(StatusCode::NO_CONTENT)
}

/// Owner-only: remove one participant from the mute list
pub async fn unmute_user(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((room_id, target)): Path<(String, String)>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    let room = load_room(&room_id).await?;
    auth::ensure_room_owner(&room, &user)?;

    let muted = room
        .muted_users
        .iter()
        .filter(|u| **u != target)
        .cloned()
        .collect();
    set_mute_list(&state, &room, muted).await?;

    info!("User {} unmuted in room {} by {}", target, room_id, user.uid);
    Ok(StatusCode::NO_CONTENT)
}

/// Owner-only: mute everyone currently present except the owner
pub async fn mute_all(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(room_id): Path<String>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    let room = load_room(&room_id).await?;
    auth::ensure_room_owner(&room, &user)?;

    let targets = match state.hub.channel(&room_id).await {
        Some(channel) => channel
            .presence_user_ids()
            .await
            .into_iter()
            .filter(|uid| *uid != user.uid)
            .collect(),
        None => Vec::new(),
    };
    set_mute_list(&state, &room, targets).await?;

    info!("All users muted in room {} by {}", room_id, user.uid);
    Ok(StatusCode::NO_CONTENT)
}

/// Owner-only: clear the mute list
pub async fn unmute_all(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(room_id): Path<String>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    let room = load_room(&room_id).await?;
    auth::ensure_room_owner(&room, &user)?;

    set_mute_list(&state, &room, Vec::new()).await?;

    info!("All users unmuted in room {} by {}", room_id, user.uid);
    Ok(StatusCode::NO_CONTENT)
}

/// Version history of a room, newest first
pub async fn list_versions(
    Extension(_user): Extension<AuthUser>,
    Path(room_id): Path<String>,
) -> Result<(StatusCode, Json<VersionListResponse>), (StatusCode, Json<ErrorResponse>)> {
    let room = load_room(&room_id).await?;
    let db = db::get_db()
        .ok_or_else(|| error_response(StatusCode::SERVICE_UNAVAILABLE, "Database not initialized"))?;

    let versions = db.list_room_versions(&room.room_id).await.map_err(|e| {
        error!("Failed to list versions of {}: {}", room_id, e);
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load version history")
    })?;

    Ok((
        StatusCode::OK,
        Json(VersionListResponse {
            versions: versions
                .into_iter()
                .map(|v| VersionEntry {
                    id: v.id,
                    content: v.content,
                    saved_by: v.saved_by,
                    created_date: v.created_date,
                })
                .collect(),
        }),
    ))
}

/// Owner-only: overwrite the room content with a saved snapshot
pub async fn restore_version(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((room_id, version_id)): Path<(String, Uuid)>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    let room = load_room(&room_id).await?;
    auth::ensure_room_owner(&room, &user)?;

    let db = db::get_db()
        .ok_or_else(|| error_response(StatusCode::SERVICE_UNAVAILABLE, "Database not initialized"))?;
    let version = db
        .get_room_version(&room.room_id, version_id)
        .await
        .map_err(|e| {
            error!("Failed to load version {}: {}", version_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to restore version")
        })?
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "Version not found"))?;

    // Restore is just another last-writer-wins overwrite
    db.update_room_content(&room.room_id, &version.content)
        .await
        .map_err(|e| {
            error!("Failed to restore version {}: {}", version_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to restore version")
        })?;

    state.hub.broadcast_room(&room_id).await;
    info!("Version {} restored in room {} by {}", version_id, room_id, user.uid);
    Ok(StatusCode::NO_CONTENT)
}

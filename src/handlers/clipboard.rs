use axum::{extract::Path, http::StatusCode, Extension, Json};
use chrono::Utc;
use tracing::{error, info};
use uuid::Uuid;

use crate::auth::auth::{self, AuthUser};
use crate::db::{self, ClipboardRow};
use crate::models::{
    error_response, ClipboardEntry, ClipboardListResponse, CreateClipboardRequest,
    CreateClipboardResponse, ErrorResponse,
};
use crate::services::paste_service;

const MAX_CODE_ATTEMPTS: usize = 5;

fn entry_of(row: ClipboardRow) -> ClipboardEntry {
    ClipboardEntry {
        id: row.id,
        clipboard_id: row.clipboard_id,
        content: row.content,
        device_name: row.device_name,
        created_by: row.created_by,
        created_date: row.created_date,
    }
}

/// Share a clipboard entry under a fresh 6-character code
pub async fn create_clipboard(
    Extension(user): Extension<Option<AuthUser>>,
    Json(payload): Json<CreateClipboardRequest>,
) -> Result<(StatusCode, Json<CreateClipboardResponse>), (StatusCode, Json<ErrorResponse>)> {
    let db = db::get_db()
        .ok_or_else(|| error_response(StatusCode::SERVICE_UNAVAILABLE, "Database not initialized"))?;

    if payload.content.trim().is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "Content is required"));
    }

    // Codes collide rarely; a handful of attempts is enough
    let mut code = None;
    for attempt in 1..=MAX_CODE_ATTEMPTS {
        let candidate = paste_service::generate_share_code();
        let taken = db.clipboard_code_taken(&candidate).await.map_err(|e| {
            error!("Failed to check clipboard code: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to share clipboard")
        })?;
        if !taken {
            code = Some(candidate);
            break;
        }
        info!("Clipboard code collision on attempt {}", attempt);
    }
    let Some(code) = code else {
        return Err(error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to generate unique clipboard ID after multiple attempts",
        ));
    };

    let entry = ClipboardRow {
        id: Uuid::new_v4(),
        clipboard_id: code,
        content: payload.content,
        device_name: payload.device_name,
        created_by: user
            .as_ref()
            .map(|u| u.uid.clone())
            .unwrap_or_else(|| "anonymous".to_string()),
        created_date: Utc::now(),
    };

    db.insert_clipboard(&entry).await.map_err(|e| {
        error!("Failed to create clipboard: {}", e);
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to share clipboard")
    })?;

    Ok((
        StatusCode::CREATED,
        Json(CreateClipboardResponse {
            id: entry.id,
            clipboard_id: entry.clipboard_id,
        }),
    ))
}

/// Retrieve a clipboard entry by its code (case-insensitive)
pub async fn get_clipboard(
    Path(code): Path<String>,
) -> Result<(StatusCode, Json<ClipboardEntry>), (StatusCode, Json<ErrorResponse>)> {
    let db = db::get_db()
        .ok_or_else(|| error_response(StatusCode::SERVICE_UNAVAILABLE, "Database not initialized"))?;

    if code.len() != paste_service::SHARE_CODE_LEN {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Enter a valid 6-character Clipboard ID",
        ));
    }

    let entry = db
        .get_clipboard_by_code(&code.to_uppercase())
        .await
        .map_err(|e| {
            error!("Failed to retrieve clipboard '{}': {}", code, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to retrieve clipboard")
        })?;

    match entry {
        Some(row) => Ok((StatusCode::OK, Json(entry_of(row)))),
        None => Err(error_response(
            StatusCode::NOT_FOUND,
            "Clipboard not found with that ID",
        )),
    }
}

/// The caller's recent clipboard history
pub async fn list_clipboards(
    Extension(user): Extension<Option<AuthUser>>,
) -> Result<(StatusCode, Json<ClipboardListResponse>), (StatusCode, Json<ErrorResponse>)> {
    let user = auth::ensure_user(&user)?.clone();
    let db = db::get_db()
        .ok_or_else(|| error_response(StatusCode::SERVICE_UNAVAILABLE, "Database not initialized"))?;

    let rows = db.list_clipboards_by_owner(&user.uid).await.map_err(|e| {
        error!("Failed to load clipboards for {}: {}", user.uid, e);
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load clipboard history")
    })?;

    Ok((
        StatusCode::OK,
        Json(ClipboardListResponse {
            clipboards: rows.into_iter().map(entry_of).collect(),
        }),
    ))
}

use axum::{http::StatusCode, Extension, Json};
use chrono::Utc;
use tracing::error;

use crate::auth::auth::AuthUser;
use crate::db;
use crate::models::{error_response, ErrorResponse, UpdateProfileRequest, UserProfile};
use crate::services::profile_service;

/// The caller's profile, falling back to the token identity when no
/// profile row exists yet
pub async fn get_profile(
    Extension(user): Extension<AuthUser>,
) -> Result<(StatusCode, Json<UserProfile>), (StatusCode, Json<ErrorResponse>)> {
    let db = db::get_db()
        .ok_or_else(|| error_response(StatusCode::SERVICE_UNAVAILABLE, "Database not initialized"))?;

    let profile = db.get_user(&user.uid).await.map_err(|e| {
        error!("Failed to load profile for {}: {}", user.uid, e);
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load profile")
    })?;

    let profile = match profile {
        Some(row) => UserProfile {
            user_id: row.user_id,
            display_name: row.display_name,
            updated_at: row.updated_at,
        },
        None => UserProfile {
            user_id: user.uid.clone(),
            display_name: user.label(),
            updated_at: Utc::now(),
        },
    };

    Ok((StatusCode::OK, Json(profile)))
}

/// Update the caller's display name
pub async fn update_profile(
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<(StatusCode, Json<UserProfile>), (StatusCode, Json<ErrorResponse>)> {
    let display_name = payload.display_name.trim();
    if display_name.is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "Display name is required"));
    }

    let db = db::get_db()
        .ok_or_else(|| error_response(StatusCode::SERVICE_UNAVAILABLE, "Database not initialized"))?;

    db.upsert_user(&user.uid, display_name).await.map_err(|e| {
        error!("Failed to update profile for {}: {}", user.uid, e);
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update profile")
    })?;

    profile_service::invalidate_display_name(&user.uid);

    Ok((
        StatusCode::OK,
        Json(UserProfile {
            user_id: user.uid.clone(),
            display_name: display_name.to_string(),
            updated_at: Utc::now(),
        }),
    ))
}

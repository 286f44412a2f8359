use axum::{
    extract::{Path, Query},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::auth::{self, AuthUser};
use crate::db::{self, PasteRow};
use crate::models::{
    error_response, CreatePasteRequest, CreatePasteResponse, DashboardResponse, DashboardStats,
    ErrorResponse, PasteSummary, PasteViewResponse, ViewPasteQuery,
};
use crate::services::paste_service;

/// Create a new paste.
///
/// Anonymous callers may create plain public pastes; custom URLs,
/// expiry and unlisted visibility require a signed-in identity.
pub async fn create_paste(
    Extension(user): Extension<Option<AuthUser>>,
    Json(payload): Json<CreatePasteRequest>,
) -> Result<(StatusCode, Json<CreatePasteResponse>), (StatusCode, Json<ErrorResponse>)> {
    let db = db::get_db()
        .ok_or_else(|| error_response(StatusCode::SERVICE_UNAVAILABLE, "Database not initialized"))?;

    if payload.content.trim().is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "Content is required"));
    }
    if payload.visibility != "public" && payload.visibility != "unlisted" {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            format!("Invalid visibility '{}'", payload.visibility),
        ));
    }

    let wants_authed_features = payload.custom_url.is_some()
        || payload.expires_at.is_some()
        || payload.visibility == "unlisted";
    if user.is_none() && wants_authed_features {
        return Err(error_response(
            StatusCode::UNAUTHORIZED,
            "You must be logged in to set a custom URL, expiration date, or unlisted visibility",
        ));
    }

    let custom_url = match &payload.custom_url {
        Some(custom_url) => {
            if !paste_service::validate_custom_url(custom_url) {
                return Err(error_response(
                    StatusCode::BAD_REQUEST,
                    "Custom URL can only contain letters, numbers, hyphens, or underscores",
                ));
            }
            let taken = db.custom_url_taken(custom_url).await.map_err(|e| {
                error!("Failed to check custom URL '{}': {}", custom_url, e);
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to check custom URL")
            })?;
            if taken {
                return Err(error_response(
                    StatusCode::CONFLICT,
                    "Custom URL is already taken",
                ));
            }
            Some(custom_url.clone())
        }
        None => None,
    };

    let expires_at = match &payload.expires_at {
        Some(spec) => Some(
            paste_service::parse_expiry(spec, Utc::now())
                .map_err(|e| error_response(StatusCode::BAD_REQUEST, e))?,
        ),
        None => None,
    };

    let password_hash = match payload.password.as_deref().filter(|p| !p.is_empty()) {
        Some(password) => Some(
            paste_service::hash_password(password)
                .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, e))?,
        ),
        None => None,
    };

    let paste = PasteRow {
        id: Uuid::new_v4(),
        title: payload
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "Untitled Paste".to_string()),
        content: payload.content,
        language: payload.language,
        visibility: payload.visibility,
        password_hash,
        custom_url,
        expires_at,
        created_by: user
            .as_ref()
            .map(|u| u.uid.clone())
            .unwrap_or_else(|| "anonymous".to_string()),
        views: 0,
        created_date: Utc::now(),
    };

    db.insert_paste(&paste).await.map_err(|e| {
        error!("Failed to create paste: {}", e);
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create paste")
    })?;

    let slug = paste
        .custom_url
        .clone()
        .unwrap_or_else(|| paste.id.to_string());
    Ok((
        StatusCode::CREATED,
        Json(CreatePasteResponse {
            id: paste.id,
            url: format!("/p/{}", slug),
            custom_url: paste.custom_url,
            expires_at: paste.expires_at,
        }),
    ))
}

/// View a paste by UUID or custom URL.
///
/// Protected pastes return a locked shell (safe metadata, no content)
/// until the correct password arrives.
pub async fn get_paste(
    Path(id_or_slug): Path<String>,
    Query(query): Query<ViewPasteQuery>,
) -> Result<(StatusCode, Json<PasteViewResponse>), (StatusCode, Json<ErrorResponse>)> {
    let db = db::get_db()
        .ok_or_else(|| error_response(StatusCode::SERVICE_UNAVAILABLE, "Database not initialized"))?;

    // Resolve by UUID first, falling back to the custom URL
    let paste = match Uuid::parse_str(&id_or_slug) {
        Ok(id) => db.get_paste_by_id(id).await,
        Err(_) => db.get_paste_by_custom_url(&id_or_slug).await,
    }
    .map_err(|e| {
        error!("Failed to load paste '{}': {}", id_or_slug, e);
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load paste")
    })?;

    let Some(paste) = paste else {
        return Err(error_response(StatusCode::NOT_FOUND, "Paste not found"));
    };

    // Expired pastes behave as if they never existed
    if let Some(expires_at) = paste.expires_at {
        if expires_at < Utc::now() {
            info!("Paste {} has expired", paste.id);
            return Err(error_response(StatusCode::NOT_FOUND, "Paste not found"));
        }
    }

    if let Some(hash) = &paste.password_hash {
        match query.password.as_deref() {
            None => {
                // Locked shell: metadata only
                return Ok((
                    StatusCode::OK,
                    Json(PasteViewResponse {
                        id: paste.id,
                        title: paste.title,
                        language: paste.language,
                        visibility: paste.visibility,
                        locked: true,
                        content: None,
                        views: paste.views,
                        created_by: paste.created_by,
                        created_date: paste.created_date,
                        expires_at: paste.expires_at,
                    }),
                ));
            }
            Some(password) => {
                if !paste_service::verify_password(password, hash) {
                    return Err(error_response(StatusCode::FORBIDDEN, "Incorrect password"));
                }
            }
        }
    }

    // View counting is best effort; a failed increment never blocks the read
    if let Err(e) = db.increment_paste_views(paste.id).await {
        warn!("Failed to increment views for paste {}: {}", paste.id, e);
    }

    Ok((
        StatusCode::OK,
        Json(PasteViewResponse {
            id: paste.id,
            title: paste.title,
            language: paste.language,
            visibility: paste.visibility,
            locked: false,
            content: Some(paste.content),
            views: paste.views + 1,
            created_by: paste.created_by,
            created_date: paste.created_date,
            expires_at: paste.expires_at,
        }),
    ))
}

/// The caller's pastes with aggregate stats
pub async fn dashboard(
    Extension(user): Extension<AuthUser>,
) -> Result<(StatusCode, Json<DashboardResponse>), (StatusCode, Json<ErrorResponse>)> {
    let db = db::get_db()
        .ok_or_else(|| error_response(StatusCode::SERVICE_UNAVAILABLE, "Database not initialized"))?;

    let rows = db.list_pastes_by_owner(&user.uid).await.map_err(|e| {
        error!("Failed to load pastes for {}: {}", user.uid, e);
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load pastes")
    })?;

    let stats = DashboardStats {
        total_pastes: rows.len() as i64,
        total_views: rows.iter().map(|p| p.views).sum(),
        public_pastes: rows.iter().filter(|p| p.visibility == "public").count() as i64,
        protected_pastes: rows.iter().filter(|p| p.password_hash.is_some()).count() as i64,
    };

    let pastes = rows
        .into_iter()
        .map(|p| PasteSummary {
            id: p.id,
            title: p.title,
            language: p.language,
            visibility: p.visibility,
            protected: p.password_hash.is_some(),
            custom_url: p.custom_url,
            views: p.views,
            created_date: p.created_date,
            expires_at: p.expires_at,
        })
        .collect();

    Ok((
        StatusCode::OK,
        Json(DashboardResponse { stats, pastes }),
    ))
}

/// Delete a paste the caller owns
pub async fn delete_paste(
    Extension(user): Extension<Option<AuthUser>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    let user = auth::ensure_user(&user)?.clone();
    let db = db::get_db()
        .ok_or_else(|| error_response(StatusCode::SERVICE_UNAVAILABLE, "Database not initialized"))?;

    let deleted = db.delete_paste(id, &user.uid).await.map_err(|e| {
        error!("Failed to delete paste {}: {}", id, e);
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete paste")
    })?;

    if !deleted {
        return Err(error_response(StatusCode::NOT_FOUND, "Paste not found"));
    }

    info!("Paste {} deleted by {}", id, user.uid);
    Ok(StatusCode::NO_CONTENT)
}
